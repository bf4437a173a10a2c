use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "validate-mappings",
    version,
    about = "Sanity checks for ontology mapping suggestions stored in BigQuery"
)]
pub struct Cli {
    /// Warehouse project that owns the dataset.
    #[arg(long)]
    pub project: String,

    /// Dataset holding mapping_suggestions, reference_terms and gold_mappings.
    #[arg(long, default_value = "map")]
    pub dataset: String,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn dataset_defaults_to_map() {
        let cli = Cli::try_parse_from(["validate-mappings", "--project", "proj"])
            .expect("project alone should parse");
        assert_eq!(cli.project, "proj");
        assert_eq!(cli.dataset, "map");
    }

    #[test]
    fn project_is_required() {
        let err = Cli::try_parse_from(["validate-mappings", "--dataset", "staging"])
            .expect_err("missing project should be rejected");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn dataset_can_be_overridden() {
        let cli = Cli::try_parse_from([
            "validate-mappings",
            "--project",
            "proj",
            "--dataset",
            "staging",
        ])
        .expect("both flags should parse");
        assert_eq!(cli.dataset, "staging");
    }
}
