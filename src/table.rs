use std::collections::{BTreeSet, HashSet};

use log::{debug, warn};
use polars::prelude::*;

use crate::config::{ColumnMapping, IndicatorSelection, Statistic};
use crate::error::IpiError;
use crate::schema::history::CURRENT_VALUE;

/// One (year, entity) observation of a single indicator column.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    pub year: i64,
    pub entity_id: String,
    pub section_id: Option<String>,
    pub value: Option<f64>,
}

/// Value of an indicator for one entity at the selected year.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentValue {
    pub entity_id: String,
    pub value: f64,
}

/// Read an (entity, `current_value`) frame handed over by the display layer.
/// Rows with a null id or value are dropped.
pub fn current_values_from_frame(
    df: &DataFrame,
    entity_column: &str,
) -> Result<Vec<CurrentValue>, IpiError> {
    require_columns(df, &[entity_column, CURRENT_VALUE])?;
    let out = df
        .clone()
        .lazy()
        .select([
            col(entity_column).cast(DataType::String),
            col(CURRENT_VALUE).cast(DataType::Float64),
        ])
        .collect()?;
    let ids = out.column(entity_column)?.str()?;
    let values = out.column(CURRENT_VALUE)?.f64()?;
    Ok(ids
        .into_iter()
        .zip(values)
        .filter_map(|(id, value)| {
            Some(CurrentValue {
                entity_id: id?.to_string(),
                value: value?,
            })
        })
        .collect())
}

pub fn current_values_to_frame(
    values: &[CurrentValue],
    entity_column: &str,
) -> Result<DataFrame, IpiError> {
    let ids: Vec<&str> = values.iter().map(|v| v.entity_id.as_str()).collect();
    let vals: Vec<f64> = values.iter().map(|v| v.value).collect();
    let df = DataFrame::new(vec![
        Series::new(entity_column.into(), ids).into(),
        Series::new(CURRENT_VALUE.into(), vals).into(),
    ])?;
    Ok(df)
}

/// All rows belonging to one parent section, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionPanel {
    pub section_id: String,
    pub rows: Vec<PanelRow>,
}

/// Year × entity panel of indicator values.
///
/// Wraps a loaded DataFrame together with the column mapping of the page it
/// belongs to. The frame is never mutated after construction.
#[derive(Debug, Clone)]
pub struct IndicatorTable {
    df: DataFrame,
    mapping: ColumnMapping,
}

impl IndicatorTable {
    /// Wrap a DataFrame, normalizing headers and checking the structural
    /// columns named by `mapping` exist.
    pub fn new(df: DataFrame, mapping: ColumnMapping) -> Result<Self, IpiError> {
        let mapping = mapping.normalized();
        let df = normalize_headers(df, mapping.underscores_to_spaces)?;
        require_columns(&df, &mapping.structural_columns())?;
        debug!(
            "indicator table: {} rows, {} columns, entity column '{}'",
            df.height(),
            df.width(),
            mapping.entity
        );
        Ok(Self { df, mapping })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    // ── Selector options ────────────────────────────────────────────────────

    /// Distinct observation years, most recent first.
    pub fn years(&self) -> Result<Vec<i64>, IpiError> {
        let year_col = self.mapping.year.as_str();
        let out = self
            .df
            .clone()
            .lazy()
            .select([col(year_col).cast(DataType::Int64)])
            .collect()?;
        let years: BTreeSet<i64> = out.column(year_col)?.i64()?.into_iter().flatten().collect();
        Ok(years.into_iter().rev().collect())
    }

    pub fn min_year(&self) -> Result<Option<i64>, IpiError> {
        Ok(self.years()?.last().copied())
    }

    /// Indicator names in table order. Statistic-suffixed columns collapse
    /// into their base indicator.
    pub fn indicators(&self) -> Vec<String> {
        let structural = self.mapping.structural_columns();
        let mut seen = HashSet::new();
        self.df
            .get_column_names_str()
            .into_iter()
            .filter(|name| !structural.contains(name))
            .map(|name| self.strip_statistic(name).to_string())
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    /// Statistics present as separate columns for `indicator`.
    pub fn statistics(&self, indicator: &str) -> Vec<Statistic> {
        Statistic::ALL
            .into_iter()
            .filter(|stat| {
                let name = IndicatorSelection::with_statistic(indicator, *stat)
                    .column_name(&self.mapping);
                self.df.column(&name).is_ok()
            })
            .collect()
    }

    /// Physical column for a selection, or `InvalidIndicator`.
    pub fn resolve(&self, selection: &IndicatorSelection) -> Result<String, IpiError> {
        let name = selection.column_name(&self.mapping);
        let structural = self.mapping.structural_columns();
        if structural.contains(&name.as_str()) || self.df.column(&name).is_err() {
            return Err(IpiError::InvalidIndicator(name));
        }
        Ok(name)
    }

    // ── Typed access ────────────────────────────────────────────────────────

    /// Every row of the table for one indicator column, in table order.
    ///
    /// Rows without a year or entity id are dropped; a null indicator value
    /// is kept as `None` and left to each consumer's policy.
    pub fn panel(&self, selection: &IndicatorSelection) -> Result<Vec<PanelRow>, IpiError> {
        let column = self.resolve(selection)?;
        let year_col = self.mapping.year.as_str();
        let entity_col = self.mapping.entity.as_str();

        let mut exprs = vec![
            col(year_col).cast(DataType::Int64),
            col(entity_col).cast(DataType::String),
            col(column.as_str()).cast(DataType::Float64),
        ];
        if let Some(section) = &self.mapping.section {
            exprs.push(col(section.as_str()).cast(DataType::String));
        }
        let out = self.df.clone().lazy().select(exprs).collect()?;

        let years = out.column(year_col)?.i64()?;
        let entities = out.column(entity_col)?.str()?;
        let values = out.column(column.as_str())?.f64()?;
        let sections = match &self.mapping.section {
            Some(section) => Some(out.column(section.as_str())?.str()?),
            None => None,
        };

        let mut rows = Vec::with_capacity(out.height());
        let mut dropped = 0usize;
        for i in 0..out.height() {
            let (Some(year), Some(entity)) = (years.get(i), entities.get(i)) else {
                dropped += 1;
                continue;
            };
            rows.push(PanelRow {
                year,
                entity_id: entity.to_string(),
                section_id: sections.and_then(|s| s.get(i)).map(str::to_string),
                value: values.get(i),
            });
        }
        if dropped > 0 {
            warn!("{dropped} rows without year or entity id ignored for '{column}'");
        }
        Ok(rows)
    }

    /// Rows of a single year, in table order. `EmptyResult` if none exist.
    pub fn year_slice(
        &self,
        selection: &IndicatorSelection,
        year: i64,
    ) -> Result<Vec<PanelRow>, IpiError> {
        let rows: Vec<PanelRow> = self
            .panel(selection)?
            .into_iter()
            .filter(|r| r.year == year)
            .collect();
        if rows.is_empty() {
            return Err(IpiError::EmptyResult {
                column: selection.column_name(&self.mapping),
                year,
            });
        }
        Ok(rows)
    }

    /// (entity, value) pairs for year Y at the table's own granularity.
    /// Entities whose value is null are left out.
    pub fn current_values(
        &self,
        selection: &IndicatorSelection,
        year: i64,
    ) -> Result<Vec<CurrentValue>, IpiError> {
        Ok(self
            .year_slice(selection, year)?
            .into_iter()
            .filter_map(|r| {
                r.value.map(|value| CurrentValue {
                    entity_id: r.entity_id,
                    value,
                })
            })
            .collect())
    }

    /// Group rows by parent section, sections in first-appearance order.
    pub fn panels_by_section(
        &self,
        selection: &IndicatorSelection,
    ) -> Result<Vec<SectionPanel>, IpiError> {
        if self.mapping.section.is_none() {
            return Err(IpiError::MissingColumn("section".into()));
        }
        let mut panels: Vec<SectionPanel> = Vec::new();
        for row in self.panel(selection)? {
            let Some(section_id) = row.section_id.clone() else {
                continue;
            };
            match panels.iter_mut().find(|p| p.section_id == section_id) {
                Some(panel) => panel.rows.push(row),
                None => panels.push(SectionPanel {
                    section_id,
                    rows: vec![row],
                }),
            }
        }
        Ok(panels)
    }

    fn strip_statistic<'a>(&self, name: &'a str) -> &'a str {
        let sep = self.mapping.statistic_separator.as_str();
        for stat in Statistic::ALL {
            if let Some(base) = name
                .strip_suffix(stat.suffix())
                .and_then(|rest| rest.strip_suffix(sep))
            {
                if !base.is_empty() {
                    return base;
                }
            }
        }
        name
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

/// Trim header whitespace and optionally turn `_` into spaces.
fn normalize_headers(mut df: DataFrame, underscores_to_spaces: bool) -> Result<DataFrame, IpiError> {
    let normalized: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| {
            let c = c.trim();
            if underscores_to_spaces {
                c.replace('_', " ")
            } else {
                c.to_string()
            }
        })
        .collect();
    df.set_column_names(normalized.iter().map(String::as_str))?;
    Ok(df)
}

fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), IpiError> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(IpiError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_table() -> IndicatorTable {
        let _ = env_logger::builder().is_test(true).try_init();
        let df = df!(
            "year" => [2018i64, 2018, 2018, 2019, 2019, 2019],
            "section_name" => ["Tebere", "Tebere", "Mwea", "Tebere", "Tebere", "Mwea"],
            "block" => ["T1", "T2", "M1", "T1", "T2", "M1"],
            "beneficial_fraction_mean" => [0.5, 0.6, 0.7, 0.55, 0.65, 0.75],
            "beneficial_fraction_std" => [0.1, 0.1, 0.2, 0.1, 0.2, 0.2],
            "seasonal_yield" => [Some(4.0), Some(5.0), None, Some(4.5), Some(5.5), Some(6.0)],
        )
        .unwrap();
        IndicatorTable::new(df, ColumnMapping::blocks()).unwrap()
    }

    #[test]
    fn headers_are_normalized() {
        let table = block_table();
        assert!(table.frame().column("section name").is_ok());
        assert!(table.frame().column("beneficial fraction mean").is_ok());
    }

    #[test]
    fn missing_structural_column_is_reported() {
        let df = df!("year" => [2018i64], "value" => [1.0]).unwrap();
        let err = IndicatorTable::new(df, ColumnMapping::blocks()).unwrap_err();
        assert!(matches!(err, IpiError::MissingColumn(c) if c == "block"));
    }

    #[test]
    fn years_are_descending() {
        assert_eq!(block_table().years().unwrap(), vec![2019, 2018]);
        assert_eq!(block_table().min_year().unwrap(), Some(2018));
    }

    #[test]
    fn indicators_collapse_statistics() {
        let table = block_table();
        assert_eq!(
            table.indicators(),
            vec!["beneficial fraction".to_string(), "seasonal yield".to_string()]
        );
        assert_eq!(
            table.statistics("beneficial fraction"),
            vec![Statistic::Mean, Statistic::Std]
        );
        assert!(table.statistics("seasonal yield").is_empty());
    }

    #[test]
    fn resolve_rejects_unknown_and_structural_columns() {
        let table = block_table();
        assert!(matches!(
            table.resolve(&IndicatorSelection::new("evaporation")),
            Err(IpiError::InvalidIndicator(_))
        ));
        assert!(matches!(
            table.resolve(&IndicatorSelection::new("block")),
            Err(IpiError::InvalidIndicator(_))
        ));
        let sel = IndicatorSelection::with_statistic("beneficial fraction", Statistic::Max);
        assert!(table.resolve(&sel).is_err());
    }

    #[test]
    fn panel_keeps_nulls_and_sections() {
        let rows = block_table()
            .panel(&IndicatorSelection::new("seasonal yield"))
            .unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[2].value, None);
        assert_eq!(rows[2].section_id.as_deref(), Some("Mwea"));
    }

    #[test]
    fn current_values_skip_nulls() {
        let current = block_table()
            .current_values(&IndicatorSelection::new("seasonal yield"), 2018)
            .unwrap();
        let ids: Vec<&str> = current.iter().map(|c| c.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T2"]);
    }

    #[test]
    fn current_value_frame_round_trips_and_drops_nulls() {
        let df = df!(
            "block" => [Some("T1"), None, Some("M1")],
            "current_value" => [Some(0.5), Some(0.7), None],
        )
        .unwrap();
        let values = current_values_from_frame(&df, "block").unwrap();
        assert_eq!(
            values,
            vec![CurrentValue {
                entity_id: "T1".into(),
                value: 0.5
            }]
        );
        let back = current_values_to_frame(&values, "block").unwrap();
        assert_eq!(back.get_column_names_str(), vec!["block", "current_value"]);
        assert!(matches!(
            current_values_from_frame(&df, "section name"),
            Err(IpiError::MissingColumn(_))
        ));
    }

    #[test]
    fn year_slice_of_absent_year_is_empty_result() {
        let err = block_table()
            .year_slice(&IndicatorSelection::new("seasonal yield"), 2030)
            .unwrap_err();
        assert!(matches!(err, IpiError::EmptyResult { year: 2030, .. }));
    }

    #[test]
    fn panels_group_by_section_in_order() {
        let panels = block_table()
            .panels_by_section(&IndicatorSelection::with_statistic(
                "beneficial fraction",
                Statistic::Mean,
            ))
            .unwrap();
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].section_id, "Tebere");
        assert_eq!(panels[0].rows.len(), 4);
        assert_eq!(panels[1].rows.len(), 2);
    }
}
