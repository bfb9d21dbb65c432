use std::collections::HashMap;

use log::debug;
use polars::prelude::*;

use crate::aggregation::section_series;
use crate::config::{IndicatorSelection, Statistic};
use crate::error::IpiError;
use crate::schema::history;
use crate::table::{CurrentValue, IndicatorTable, PanelRow};

/// Current value of an entity plus its indicator values, oldest year first.
///
/// `years` and `history` are aligned. Years without a value are absent, so
/// the sequence can be shorter than the number of years in the table.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub entity_id: String,
    pub current_value: f64,
    pub years: Vec<i64>,
    pub history: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryTable {
    pub entity_column: String,
    pub column: String,
    pub rows: Vec<HistoryRow>,
}

/// Round to the two decimals shown by the ranked table, half to even as
/// the display layer does.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Join each entity's time series with its current value.
///
/// Only entities present in both `table` and `current` are kept, in the
/// order of `current`. Values are rounded here and nowhere earlier.
pub fn build_history(
    table: &IndicatorTable,
    selection: &IndicatorSelection,
    current: &[CurrentValue],
) -> Result<HistoryTable, IpiError> {
    let column = table.resolve(selection)?;
    let rows = table.panel(selection)?;
    join_history(&table.mapping().entity, column, rows, current)
}

/// History of section summaries on a block-level table.
///
/// Each section's series holds `statistic` of its blocks for every year, so
/// the output matches current values produced by `aggregate_by_section`
/// with the same statistic. Rows are keyed by the section column.
pub fn build_section_history(
    table: &IndicatorTable,
    selection: &IndicatorSelection,
    statistic: Statistic,
    current: &[CurrentValue],
) -> Result<HistoryTable, IpiError> {
    let column = table.resolve(selection)?;
    let rows = section_series(table, selection, statistic)?;
    let section = table
        .mapping()
        .section
        .clone()
        .ok_or_else(|| IpiError::MissingColumn("section".into()))?;
    join_history(&section, column, rows, current)
}

fn join_history(
    entity_column: &str,
    column: String,
    panel: Vec<PanelRow>,
    current: &[CurrentValue],
) -> Result<HistoryTable, IpiError> {
    let mut series: HashMap<String, Vec<(i64, f64)>> = HashMap::new();
    for row in panel {
        let points = series.entry(row.entity_id).or_default();
        if let Some(value) = row.value {
            points.push((row.year, value));
        }
    }
    for points in series.values_mut() {
        points.sort_by_key(|(year, _)| *year);
    }

    let rows: Vec<HistoryRow> = current
        .iter()
        .filter_map(|cv| {
            let points = series.get(&cv.entity_id)?;
            Some(HistoryRow {
                entity_id: cv.entity_id.clone(),
                current_value: round2(cv.value),
                years: points.iter().map(|(year, _)| *year).collect(),
                history: points.iter().map(|(_, value)| round2(*value)).collect(),
            })
        })
        .collect();

    if rows.is_empty() {
        return Err(IpiError::NoOverlap);
    }

    debug!(
        "history of '{column}': {} of {} current entities matched",
        rows.len(),
        current.len()
    );

    Ok(HistoryTable {
        entity_column: entity_column.to_string(),
        column,
        rows,
    })
}

impl HistoryTable {
    /// Frame with the entity column, `current_value` and a `List(Float64)`
    /// `history` column.
    pub fn to_frame(&self) -> Result<DataFrame, IpiError> {
        let ids: Vec<&str> = self.rows.iter().map(|r| r.entity_id.as_str()).collect();
        let current: Vec<f64> = self.rows.iter().map(|r| r.current_value).collect();
        let trends: Vec<Series> = self
            .rows
            .iter()
            .map(|r| Series::new("".into(), &r.history))
            .collect();

        let df = DataFrame::new(vec![
            Series::new(self.entity_column.as_str().into(), ids).into(),
            Series::new(history::CURRENT_VALUE.into(), current).into(),
            Series::new(history::HISTORY.into(), trends).into(),
        ])?;
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::aggregate_by_section;
    use crate::config::ColumnMapping;

    fn table() -> IndicatorTable {
        let df = df!(
            "year" => [2019i64, 2018, 2020, 2018, 2020, 2019],
            "section name" => ["A", "A", "A", "B", "B", "C"],
            "crop water productivity" => [1.23456, 1.0, 1.5, 2.004, 2.5, 9.0],
        )
        .unwrap();
        IndicatorTable::new(df, ColumnMapping::sections()).unwrap()
    }

    fn current(pairs: &[(&str, f64)]) -> Vec<CurrentValue> {
        pairs
            .iter()
            .map(|(id, value)| CurrentValue {
                entity_id: id.to_string(),
                value: *value,
            })
            .collect()
    }

    fn sel() -> IndicatorSelection {
        IndicatorSelection::new("crop water productivity")
    }

    #[test]
    fn history_is_ordered_by_year_and_rounded() {
        let out = build_history(&table(), &sel(), &current(&[("A", 1.499)])).unwrap();
        let row = &out.rows[0];
        assert_eq!(row.years, vec![2018, 2019, 2020]);
        assert_eq!(row.history, vec![1.0, 1.23, 1.5]);
        assert_eq!(row.current_value, 1.5);
    }

    #[test]
    fn gaps_are_not_filled() {
        let out = build_history(&table(), &sel(), &current(&[("B", 2.5)])).unwrap();
        assert_eq!(out.rows[0].years, vec![2018, 2020]);
        assert_eq!(out.rows[0].history, vec![2.0, 2.5]);
    }

    #[test]
    fn inner_join_keeps_current_order() {
        let cur = current(&[("C", 9.0), ("Z", 1.0), ("A", 1.5)]);
        let out = build_history(&table(), &sel(), &cur).unwrap();
        let ids: Vec<&str> = out.rows.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A"]);
        for row in &out.rows {
            for v in &row.history {
                assert_eq!(round2(*v), *v);
            }
        }
    }

    #[test]
    fn disjoint_entities_fail() {
        let err = build_history(&table(), &sel(), &current(&[("X", 1.0)])).unwrap_err();
        assert!(matches!(err, IpiError::NoOverlap));
    }

    #[test]
    fn unknown_indicator_fails() {
        let err = build_history(
            &table(),
            &IndicatorSelection::new("seasonal yield"),
            &current(&[("A", 1.0)]),
        )
        .unwrap_err();
        assert!(matches!(err, IpiError::InvalidIndicator(_)));
    }

    #[test]
    fn frame_carries_list_history() {
        let out = build_history(&table(), &sel(), &current(&[("A", 1.5), ("B", 2.5)])).unwrap();
        let df = out.to_frame().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.column("history").unwrap().dtype(),
            &DataType::List(Box::new(DataType::Float64))
        );
        assert!(df.column("current_value").is_ok());
    }

    #[test]
    fn halves_round_to_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(-0.125), -0.12);
    }

    fn block_table() -> IndicatorTable {
        let df = df!(
            "year" => [2018i64, 2018, 2018, 2019, 2019, 2019],
            "section name" => ["Tebere", "Tebere", "Mwea", "Tebere", "Tebere", "Mwea"],
            "block" => ["T1", "T2", "M1", "T1", "T2", "M1"],
            "crop water productivity" => [1.0, 2.0, 4.0, 3.0, 4.0, 5.0],
        )
        .unwrap();
        IndicatorTable::new(df, ColumnMapping::blocks()).unwrap()
    }

    #[test]
    fn section_averages_feed_section_history() {
        let table = block_table();
        let cur = aggregate_by_section(&table, &sel(), 2019, Statistic::Mean).unwrap();
        let out = build_section_history(&table, &sel(), Statistic::Mean, &cur).unwrap();

        assert_eq!(out.entity_column, "section name");
        let ids: Vec<&str> = out.rows.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["Tebere", "Mwea"]);
        assert_eq!(out.rows[0].current_value, 3.5);
        assert_eq!(out.rows[0].years, vec![2018, 2019]);
        assert_eq!(out.rows[0].history, vec![1.5, 3.5]);
        assert_eq!(out.rows[1].history, vec![4.0, 5.0]);

        let df = out.to_frame().unwrap();
        assert!(df.column("section name").is_ok());
    }

    #[test]
    fn block_history_does_not_match_section_ids() {
        let table = block_table();
        let cur = aggregate_by_section(&table, &sel(), 2019, Statistic::Mean).unwrap();
        let err = build_history(&table, &sel(), &cur).unwrap_err();
        assert!(matches!(err, IpiError::NoOverlap));
    }

    #[test]
    fn section_history_needs_a_section_column() {
        let err = build_section_history(
            &table(),
            &sel(),
            Statistic::Mean,
            &current(&[("A", 1.0)]),
        )
        .unwrap_err();
        assert!(matches!(err, IpiError::MissingColumn(_)));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let cur = current(&[("A", 1.5), ("B", 2.5)]);
        let a = build_history(&table(), &sel(), &cur).unwrap();
        let b = build_history(&table(), &sel(), &cur).unwrap();
        assert_eq!(a, b);
    }
}
