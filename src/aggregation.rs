use log::{debug, warn};
use polars::prelude::*;

use crate::config::{IndicatorSelection, Statistic};
use crate::error::IpiError;
use crate::table::{CurrentValue, IndicatorTable, PanelRow};

fn statistic_expr(value: Expr, statistic: Statistic) -> Expr {
    match statistic {
        Statistic::Mean => value.mean(),
        Statistic::Min => value.min(),
        Statistic::Max => value.max(),
        // sample standard deviation, as the block summaries are computed
        Statistic::Std => value.std(1),
    }
}

/// Summarize a block-level table into one value per parent section.
///
/// Only rows of `year` take part. Sections come out in the order they first
/// appear in the table. A section whose statistic is undefined (all values
/// null, or a single block for `Std`) is left out.
pub fn aggregate_by_section(
    table: &IndicatorTable,
    selection: &IndicatorSelection,
    year: i64,
    statistic: Statistic,
) -> Result<Vec<CurrentValue>, IpiError> {
    let mapping = table.mapping();
    let section = mapping
        .section
        .as_deref()
        .ok_or_else(|| IpiError::MissingColumn("section".into()))?;
    let column = table.resolve(selection)?;

    let out = table
        .frame()
        .clone()
        .lazy()
        .filter(col(mapping.year.as_str()).cast(DataType::Int64).eq(lit(year)))
        .group_by_stable([col(section).cast(DataType::String)])
        .agg([statistic_expr(
            col(column.as_str()).cast(DataType::Float64),
            statistic,
        )
        .alias(column.as_str())])
        .collect()?;

    if out.height() == 0 {
        return Err(IpiError::EmptyResult { column, year });
    }

    let ids = out.column(section)?.str()?;
    let values = out.column(column.as_str())?.f64()?;

    let mut result = Vec::with_capacity(out.height());
    for i in 0..out.height() {
        match (ids.get(i), values.get(i)) {
            (Some(id), Some(value)) => result.push(CurrentValue {
                entity_id: id.to_string(),
                value,
            }),
            (Some(id), None) => warn!(
                "no {} of '{column}' for section '{id}' in {year}",
                statistic.suffix()
            ),
            (None, _) => warn!("rows without a section ignored for '{column}' in {year}"),
        }
    }

    debug!(
        "{} of '{column}' by section for {year}: {} sections",
        statistic.suffix(),
        result.len()
    );
    Ok(result)
}

/// `statistic` of each section's blocks for every year of the table.
///
/// Rows are keyed by section (`entity_id` and `section_id` both hold it), in
/// order of first appearance. A null statistic is kept as a null value.
pub fn section_series(
    table: &IndicatorTable,
    selection: &IndicatorSelection,
    statistic: Statistic,
) -> Result<Vec<PanelRow>, IpiError> {
    let mapping = table.mapping();
    let section = mapping
        .section
        .as_deref()
        .ok_or_else(|| IpiError::MissingColumn("section".into()))?;
    let column = table.resolve(selection)?;
    let year = mapping.year.as_str();

    let out = table
        .frame()
        .clone()
        .lazy()
        .group_by_stable([
            col(year).cast(DataType::Int64),
            col(section).cast(DataType::String),
        ])
        .agg([statistic_expr(
            col(column.as_str()).cast(DataType::Float64),
            statistic,
        )
        .alias(column.as_str())])
        .collect()?;

    let years = out.column(year)?.i64()?;
    let ids = out.column(section)?.str()?;
    let values = out.column(column.as_str())?.f64()?;

    let mut rows = Vec::with_capacity(out.height());
    for ((y, id), value) in years.into_iter().zip(ids).zip(values) {
        let (Some(y), Some(id)) = (y, id) else {
            warn!("rows without a year or section ignored for '{column}'");
            continue;
        };
        rows.push(PanelRow {
            year: y,
            entity_id: id.to_string(),
            section_id: Some(id.to_string()),
            value,
        });
    }

    debug!(
        "{} of '{column}' by section and year: {} rows",
        statistic.suffix(),
        rows.len()
    );
    Ok(rows)
}
