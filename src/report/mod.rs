use std::io::Write;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::warehouse::{Row, Warehouse};

mod sql;

pub use self::sql::Relations;
use self::sql::{accuracy_sql, missing_reference_sql};

const MISSING_REFERENCE_HEADER: &str = "== Missing reference IDs in reference_terms ==";
const ACCURACY_HEADER: &str = "== Accuracy (if gold_mappings exists) ==";
const PLAIN_IDENTIFIER_PATTERN: &str = r"^[A-Za-z0-9_.:-]+$";

/// The single aggregate row produced by the accuracy query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccuracySummary {
    pub n: i64,
    pub accuracy_top1: Option<f64>,
    pub accuracy_top1_conf_ge_0p7: Option<f64>,
}

pub fn run<W>(warehouse: &W, relations: &Relations, out: &mut impl Write) -> Result<()>
where
    W: Warehouse + ?Sized,
{
    info!(
        project = %relations.project(),
        dataset = %relations.dataset(),
        "starting mapping validation"
    );
    flag_unescaped_identifiers(relations)?;

    let missing = missing_references(warehouse, relations, out)?;

    writeln!(out)?;
    let summary = accuracy(warehouse, relations, out)?;

    match summary {
        Some(summary) => info!(
            missing_references = missing,
            n = summary.n,
            accuracy_top1 = ?summary.accuracy_top1,
            accuracy_top1_conf_ge_0p7 = ?summary.accuracy_top1_conf_ge_0p7,
            "mapping validation finished"
        ),
        None => info!(missing_references = missing, "mapping validation finished"),
    }

    Ok(())
}

/// Prints every suggestion whose target is absent from the reference terms.
/// Returns the number of rows printed.
pub fn missing_references<W>(
    warehouse: &W,
    relations: &Relations,
    out: &mut impl Write,
) -> Result<usize>
where
    W: Warehouse + ?Sized,
{
    writeln!(out, "{MISSING_REFERENCE_HEADER}")?;

    let rows = warehouse
        .query(&missing_reference_sql(relations))
        .context("missing-reference query failed")?;
    for row in &rows {
        print_row(out, row)?;
    }

    info!(rows = rows.len(), "missing-reference check complete");
    Ok(rows.len())
}

/// Prints the top-1 accuracy row. Fails if the gold relation is absent.
pub fn accuracy<W>(
    warehouse: &W,
    relations: &Relations,
    out: &mut impl Write,
) -> Result<Option<AccuracySummary>>
where
    W: Warehouse + ?Sized,
{
    writeln!(out, "{ACCURACY_HEADER}")?;

    let rows = warehouse
        .query(&accuracy_sql(relations))
        .context("accuracy query failed")?;

    let mut summary = None;
    for row in &rows {
        print_row(out, row)?;
        match serde_json::from_value::<AccuracySummary>(Value::Object(row.clone())) {
            Ok(parsed) => summary = Some(parsed),
            Err(err) => warn!(error = %err, "accuracy row has an unexpected shape"),
        }
    }

    Ok(summary)
}

fn print_row(out: &mut impl Write, row: &Row) -> Result<()> {
    let line = serde_json::to_string(row).context("failed to render result row")?;
    writeln!(out, "{line}")?;
    Ok(())
}

/// Warns about identifiers that would be spliced into SQL unescaped.
/// Returns the number of flagged values; the queries still run as given.
fn flag_unescaped_identifiers(relations: &Relations) -> Result<usize> {
    let pattern = Regex::new(PLAIN_IDENTIFIER_PATTERN)
        .context("failed to compile identifier pattern regex")?;

    let mut flagged = 0;
    for (flag, value) in [
        ("project", relations.project()),
        ("dataset", relations.dataset()),
    ] {
        if !pattern.is_match(value) {
            warn!(
                flag,
                value = %value,
                "identifier contains characters that are interpolated into SQL unescaped"
            );
            flagged += 1;
        }
    }

    Ok(flagged)
}
