use std::collections::HashMap;

use log::{debug, warn};
use polars::prelude::*;

use crate::config::IndicatorSelection;
use crate::error::IpiError;
use crate::schema::difference;
use crate::table::IndicatorTable;

/// Value of an entity at the selected year and its change from the year before.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceRow {
    pub entity_id: String,
    pub value: f64,
    pub difference: f64,
}

/// Year-over-year differences, sorted by `difference` descending.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceTable {
    pub entity_column: String,
    pub column: String,
    pub year: i64,
    pub rows: Vec<DifferenceRow>,
}

/// Top gainer and top loser of a difference table.
#[derive(Debug, Clone, PartialEq)]
pub struct GainLoss {
    pub top: DifferenceRow,
    pub bottom: DifferenceRow,
}

/// Label / value / delta triple of a summary metric, already formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricCard {
    pub label: String,
    pub value: String,
    pub delta: String,
}

impl MetricCard {
    pub fn placeholder() -> Self {
        Self {
            label: "-".to_string(),
            value: "-".to_string(),
            delta: String::new(),
        }
    }

    fn from_row(row: &DifferenceRow) -> Self {
        Self {
            label: row.entity_id.clone(),
            value: format_metric(row.value),
            delta: format_metric(row.difference),
        }
    }
}

/// Render an indicator value with two decimals.
pub fn format_metric(value: f64) -> String {
    format!("{value:.2}")
}

/// Compute `value(Y) - value(Y-1)` for every entity observed in year `year`.
///
/// A missing or null value is read as zero. Entities only present in the
/// prior year are dropped. Ties keep table order.
pub fn compute_difference(
    table: &IndicatorTable,
    selection: &IndicatorSelection,
    year: i64,
) -> Result<DifferenceTable, IpiError> {
    let column = table.resolve(selection)?;
    let rows = table.panel(selection)?;

    let prior_year = year.checked_sub(1);
    let mut previous: HashMap<&str, f64> = HashMap::new();
    let mut current = Vec::new();
    for row in &rows {
        if Some(row.year) == prior_year {
            if previous
                .insert(row.entity_id.as_str(), row.value.unwrap_or(0.0))
                .is_some()
            {
                warn!(
                    "duplicate row for '{}' in {} of '{column}', keeping the last",
                    row.entity_id, row.year
                );
            }
        } else if row.year == year {
            current.push(row);
        }
    }

    if current.is_empty() {
        return Err(IpiError::EmptyResult { column, year });
    }

    let mut out: Vec<DifferenceRow> = current
        .into_iter()
        .map(|row| {
            let value = row.value.unwrap_or(0.0);
            let prior = previous
                .get(row.entity_id.as_str())
                .copied()
                .unwrap_or(0.0);
            DifferenceRow {
                entity_id: row.entity_id.clone(),
                value,
                difference: value - prior,
            }
        })
        .collect();
    out.sort_by(|a, b| b.difference.total_cmp(&a.difference));

    debug!(
        "difference of '{column}' for {year}: {} entities, {} with a prior year",
        out.len(),
        previous.len()
    );

    Ok(DifferenceTable {
        entity_column: table.mapping().entity.clone(),
        column,
        year,
        rows: out,
    })
}

impl DifferenceTable {
    /// Top and bottom rows, or `None` when `year` has no prior year to
    /// compare against (the deltas would only repeat the raw values).
    pub fn gain_loss(&self, min_year: i64) -> Option<GainLoss> {
        if self.year <= min_year {
            return None;
        }
        Some(GainLoss {
            top: self.rows.first()?.clone(),
            bottom: self.rows.last()?.clone(),
        })
    }

    /// Gainer and loser cards, with `-` placeholders for the first year.
    pub fn metric_cards(&self, min_year: i64) -> [MetricCard; 2] {
        match self.gain_loss(min_year) {
            Some(gl) => [MetricCard::from_row(&gl.top), MetricCard::from_row(&gl.bottom)],
            None => [MetricCard::placeholder(), MetricCard::placeholder()],
        }
    }

    pub fn to_frame(&self) -> Result<DataFrame, IpiError> {
        let ids: Vec<&str> = self.rows.iter().map(|r| r.entity_id.as_str()).collect();
        let values: Vec<f64> = self.rows.iter().map(|r| r.value).collect();
        let diffs: Vec<f64> = self.rows.iter().map(|r| r.difference).collect();

        let df = DataFrame::new(vec![
            Series::new(self.entity_column.as_str().into(), ids).into(),
            Series::new(self.column.as_str().into(), values).into(),
            Series::new(difference::INDICATOR_DIFFERENCE.into(), diffs).into(),
        ])?;
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnMapping;

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            entity: "section_id".into(),
            underscores_to_spaces: false,
            ..ColumnMapping::sections()
        }
    }

    fn two_year_table() -> IndicatorTable {
        let df = df!(
            "year" => [2018i64, 2019, 2018, 2019],
            "section_id" => ["A", "A", "B", "B"],
            "value" => [10.0, 15.0, 5.0, 5.0],
        )
        .unwrap();
        IndicatorTable::new(df, mapping()).unwrap()
    }

    fn sel() -> IndicatorSelection {
        IndicatorSelection::new("value")
    }

    #[test]
    fn ranks_by_change_from_prior_year() {
        let out = compute_difference(&two_year_table(), &sel(), 2019).unwrap();
        assert_eq!(
            out.rows,
            vec![
                DifferenceRow {
                    entity_id: "A".into(),
                    value: 15.0,
                    difference: 5.0
                },
                DifferenceRow {
                    entity_id: "B".into(),
                    value: 5.0,
                    difference: 0.0
                },
            ]
        );
    }

    #[test]
    fn first_year_diffs_equal_raw_values() {
        let table = two_year_table();
        let out = compute_difference(&table, &sel(), 2018).unwrap();
        for row in &out.rows {
            assert_eq!(row.difference, row.value);
        }
        let min_year = table.min_year().unwrap().unwrap();
        assert!(out.gain_loss(min_year).is_none());
        assert_eq!(out.metric_cards(min_year)[0], MetricCard::placeholder());
    }

    #[test]
    fn entities_new_in_year_are_zero_filled_and_vanished_ones_dropped() {
        let df = df!(
            "year" => [2019i64, 2019, 2020, 2020],
            "section_id" => ["A", "Gone", "A", "New"],
            "value" => [1.0, 9.0, 3.0, 4.0],
        )
        .unwrap();
        let table = IndicatorTable::new(df, mapping()).unwrap();
        let out = compute_difference(&table, &sel(), 2020).unwrap();
        let ids: Vec<&str> = out.rows.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["New", "A"]);
        assert_eq!(out.rows[0].difference, 4.0);
        assert_eq!(out.rows[1].difference, 2.0);
    }

    #[test]
    fn prior_year_is_matched_by_entity_not_position() {
        let df = df!(
            "year" => [2018i64, 2018, 2018, 2019, 2019],
            "section_id" => ["C", "A", "B", "A", "B"],
            "value" => [100.0, 1.0, 2.0, 3.0, 3.0],
        )
        .unwrap();
        let table = IndicatorTable::new(df, mapping()).unwrap();
        let out = compute_difference(&table, &sel(), 2019).unwrap();
        assert_eq!(out.rows[0].entity_id, "A");
        assert_eq!(out.rows[0].difference, 2.0);
        assert_eq!(out.rows[1].difference, 1.0);
    }

    #[test]
    fn output_is_sorted_and_each_entity_appears_once() {
        let df = df!(
            "year" => [2020i64, 2020, 2020, 2020, 2021, 2021, 2021, 2021],
            "section_id" => ["A", "B", "C", "D", "A", "B", "C", "D"],
            "value" => [0.4, 0.9, 0.1, 0.5, 0.6, 0.3, 0.1, 0.8],
        )
        .unwrap();
        let table = IndicatorTable::new(df, mapping()).unwrap();
        let out = compute_difference(&table, &sel(), 2021).unwrap();
        assert_eq!(out.rows.len(), 4);
        for pair in out.rows.windows(2) {
            assert!(pair[0].difference >= pair[1].difference);
        }
        let mut ids: Vec<&str> = out.rows.iter().map(|r| r.entity_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn ties_keep_table_order() {
        let df = df!(
            "year" => [2021i64, 2021, 2021],
            "section_id" => ["Z", "Y", "X"],
            "value" => [1.0, 1.0, 1.0],
        )
        .unwrap();
        let table = IndicatorTable::new(df, mapping()).unwrap();
        let out = compute_difference(&table, &sel(), 2021).unwrap();
        let ids: Vec<&str> = out.rows.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["Z", "Y", "X"]);
    }

    #[test]
    fn unknown_indicator_and_empty_year_fail() {
        let table = two_year_table();
        assert!(matches!(
            compute_difference(&table, &IndicatorSelection::new("yield"), 2019),
            Err(IpiError::InvalidIndicator(_))
        ));
        assert!(matches!(
            compute_difference(&table, &sel(), 2025),
            Err(IpiError::EmptyResult { year: 2025, .. })
        ));
    }

    #[test]
    fn lowest_representable_year_has_no_prior_year() {
        let df = df!(
            "year" => [i64::MIN, i64::MAX],
            "section_id" => ["A", "A"],
            "value" => [3.0, 4.0],
        )
        .unwrap();
        let table = IndicatorTable::new(df, mapping()).unwrap();
        let out = compute_difference(&table, &sel(), i64::MIN).unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].difference, 3.0);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let table = two_year_table();
        let a = compute_difference(&table, &sel(), 2019).unwrap();
        let b = compute_difference(&table, &sel(), 2019).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn gain_loss_cards_are_formatted() {
        let table = two_year_table();
        let out = compute_difference(&table, &sel(), 2019).unwrap();
        let [top, bottom] = out.metric_cards(2018);
        assert_eq!(top.label, "A");
        assert_eq!(top.value, "15.00");
        assert_eq!(top.delta, "5.00");
        assert_eq!(bottom.label, "B");
        assert_eq!(bottom.delta, "0.00");
    }

    #[test]
    fn frame_has_named_columns() {
        let out = compute_difference(&two_year_table(), &sel(), 2019).unwrap();
        let df = out.to_frame().unwrap();
        assert_eq!(
            df.get_column_names_str(),
            vec!["section_id", "value", "indicator_difference"]
        );
        assert_eq!(df.height(), 2);
    }
}
