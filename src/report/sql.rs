pub const MAPPING_SUGGESTIONS: &str = "mapping_suggestions";
pub const REFERENCE_TERMS: &str = "reference_terms";
pub const GOLD_MAPPINGS: &str = "gold_mappings";

/// Suggestions at or above this confidence count toward the confident metric.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Project and dataset that the three input relations live under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relations {
    project: String,
    dataset: String,
}

impl Relations {
    pub fn new(project: &str, dataset: &str) -> Self {
        Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Backtick-quoted `project.dataset.relation`. Identifiers are not escaped.
    pub fn qualified(&self, relation: &str) -> String {
        format!("`{}.{}.{}`", self.project, self.dataset, relation)
    }
}

pub fn missing_reference_sql(relations: &Relations) -> String {
    format!(
        "
        SELECT s.source_id AS source_id, s.target_id AS target_id
        FROM {suggestions} s
        LEFT JOIN {references} r
        ON s.target_id = r.reference_id
        WHERE r.reference_id IS NULL
        ",
        suggestions = relations.qualified(MAPPING_SUGGESTIONS),
        references = relations.qualified(REFERENCE_TERMS),
    )
}

// The confident metric averages over every joined row, not only confident ones.
pub fn accuracy_sql(relations: &Relations) -> String {
    format!(
        "
        SELECT
          COUNT(*) AS n,
          AVG(CASE WHEN s.target_id = g.target_id THEN 1 ELSE 0 END) AS accuracy_top1,
          AVG(CASE WHEN s.confidence >= {threshold} AND s.target_id = g.target_id THEN 1 ELSE 0 END)
            AS accuracy_top1_conf_ge_0p7
        FROM {suggestions} s
        JOIN {gold} g USING (source_id)
        ",
        threshold = CONFIDENCE_THRESHOLD,
        suggestions = relations.qualified(MAPPING_SUGGESTIONS),
        gold = relations.qualified(GOLD_MAPPINGS),
    )
}
