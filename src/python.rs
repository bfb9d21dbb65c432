use std::path::PathBuf;

use polars::prelude::*;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::aggregation::aggregate_by_section;
use crate::config::{ColumnMapping, IndicatorSelection, Statistic};
use crate::difference::compute_difference;
use crate::dissolve::{blocks_from_geojson, dissolve, BoundaryCollection};
use crate::error::IpiError;
use crate::history::{build_history, build_section_history};
use crate::ranking::rank_year;
use crate::schema;
use crate::table::{current_values_from_frame, current_values_to_frame, IndicatorTable};

/// Export schema constants as Python submodules
pub fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Difference
    let difference = PyModule::new(m.py(), "difference")?;
    difference.add(
        "INDICATOR_DIFFERENCE",
        schema::difference::INDICATOR_DIFFERENCE,
    )?;
    m.add_submodule(&difference)?;

    // History
    let history = PyModule::new(m.py(), "history")?;
    history.add("CURRENT_VALUE", schema::history::CURRENT_VALUE)?;
    history.add("HISTORY", schema::history::HISTORY)?;
    m.add_submodule(&history)?;

    // Geometry
    let geometry = PyModule::new(m.py(), "geometry")?;
    geometry.add("SECTION_ID", schema::geometry::SECTION_ID)?;
    geometry.add(
        "SECTION_NAME_PROPERTY",
        schema::geometry::SECTION_NAME_PROPERTY,
    )?;
    geometry.add("BLOCK_PROPERTY", schema::geometry::BLOCK_PROPERTY)?;
    m.add_submodule(&geometry)?;

    // Statistic
    let statistic = PyModule::new(m.py(), "statistic")?;
    statistic.add("MEAN", schema::statistic::MEAN)?;
    statistic.add("MIN", schema::statistic::MIN)?;
    statistic.add("MAX", schema::statistic::MAX)?;
    statistic.add("STD", schema::statistic::STD)?;
    m.add_submodule(&statistic)?;

    Ok(())
}

/// Indicator computations for one dashboard page.
///
/// Holds the page's column mapping and, once loaded, its read-only table.
/// Year, indicator and statistic are passed to every call.
#[pyclass]
pub struct IpiModel {
    mapping: ColumnMapping,
    table: Option<IndicatorTable>,
}

#[pymethods]
impl IpiModel {
    #[new]
    #[pyo3(signature = (preset="sections", entity_column=None, section_column=None, year_column=None))]
    fn new(
        preset: &str,
        entity_column: Option<String>,
        section_column: Option<String>,
        year_column: Option<String>,
    ) -> PyResult<Self> {
        let mut mapping = ColumnMapping::preset(preset).ok_or_else(|| {
            PyValueError::new_err(format!(
                "Invalid preset: '{}'. Must be 'sections' or 'blocks'",
                preset
            ))
        })?;
        if let Some(entity) = entity_column {
            mapping.entity = entity;
        }
        if section_column.is_some() {
            mapping.section = section_column;
        }
        if let Some(year) = year_column {
            mapping.year = year;
        }
        Ok(Self {
            mapping,
            table: None,
        })
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load an indicator CSV and keep it as the page table.
    fn load_csv(&mut self, path: &str) -> PyResult<PyDataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(PathBuf::from(path)))
            .map_err(IpiError::from)?
            .finish()
            .map_err(IpiError::from)?;
        let table = IndicatorTable::new(df, self.mapping.clone())?;
        let out = table.frame().clone();
        self.table = Some(table);
        Ok(PyDataFrame(out))
    }

    /// Use an already loaded DataFrame as the page table.
    fn set_table(&mut self, df: PyDataFrame) -> PyResult<()> {
        self.table = Some(IndicatorTable::new(df.0, self.mapping.clone())?);
        Ok(())
    }

    // ── Selector options ────────────────────────────────────────────────────

    fn years(&self) -> PyResult<Vec<i64>> {
        Ok(self.table()?.years()?)
    }

    fn min_year(&self) -> PyResult<Option<i64>> {
        Ok(self.table()?.min_year()?)
    }

    fn indicators(&self) -> PyResult<Vec<String>> {
        Ok(self.table()?.indicators())
    }

    fn statistics(&self, indicator: &str) -> PyResult<Vec<String>> {
        Ok(self
            .table()?
            .statistics(indicator)
            .into_iter()
            .map(|s| s.suffix().to_string())
            .collect())
    }

    // ── Computations ────────────────────────────────────────────────────────

    /// Per-entity value and change from the prior year, largest gain first.
    #[pyo3(signature = (indicator, year, statistic=None))]
    fn difference(
        &self,
        indicator: &str,
        year: i64,
        statistic: Option<&str>,
    ) -> PyResult<PyDataFrame> {
        let selection = Self::selection(indicator, statistic)?;
        let table = compute_difference(self.table()?, &selection, year)?;
        Ok(PyDataFrame(table.to_frame()?))
    }

    /// Gainer and loser cards as (label, value, delta) tuples.
    /// The first year yields `-` placeholders.
    #[pyo3(signature = (indicator, year, statistic=None))]
    fn gain_loss(
        &self,
        indicator: &str,
        year: i64,
        statistic: Option<&str>,
    ) -> PyResult<Vec<(String, String, String)>> {
        let table = self.table()?;
        let selection = Self::selection(indicator, statistic)?;
        let min_year = table
            .min_year()?
            .ok_or_else(|| IpiError::EmptyResult {
                column: selection.column_name(table.mapping()),
                year,
            })?;
        let diff = compute_difference(table, &selection, year)?;
        Ok(diff
            .metric_cards(min_year)
            .into_iter()
            .map(|c| (c.label, c.value, c.delta))
            .collect())
    }

    /// Entities of `year` ranked by value, highest first.
    #[pyo3(signature = (indicator, year, statistic=None))]
    fn rank(&self, indicator: &str, year: i64, statistic: Option<&str>) -> PyResult<PyDataFrame> {
        let selection = Self::selection(indicator, statistic)?;
        let ranking = rank_year(self.table()?, &selection, year)?;
        Ok(PyDataFrame(ranking.to_frame()?))
    }

    /// Current-value table for `year`.
    ///
    /// With `aggregate` set (mean/min/max/std), blocks are summarized per
    /// section and the entity column becomes the section column.
    #[pyo3(signature = (indicator, year, statistic=None, aggregate=None))]
    fn current_values(
        &self,
        indicator: &str,
        year: i64,
        statistic: Option<&str>,
        aggregate: Option<&str>,
    ) -> PyResult<PyDataFrame> {
        let table = self.table()?;
        let selection = Self::selection(indicator, statistic)?;
        let (values, entity_column) = match aggregate {
            Some(name) => {
                let stat = Self::statistic(name)?;
                let values = aggregate_by_section(table, &selection, year, stat)?;
                let section = table
                    .mapping()
                    .section
                    .clone()
                    .unwrap_or_else(|| schema::geometry::SECTION_ID.to_string());
                (values, section)
            }
            None => (
                table.current_values(&selection, year)?,
                table.mapping().entity.clone(),
            ),
        };
        Ok(PyDataFrame(current_values_to_frame(&values, &entity_column)?))
    }

    /// Join each entity's yearly values with a current-value frame.
    ///
    /// `current` must hold the page's entity column and `current_value`.
    /// With `aggregate` set, `current` comes from `current_values(...,
    /// aggregate)` and the series are that statistic of each section's blocks.
    #[pyo3(signature = (indicator, current, statistic=None, aggregate=None))]
    fn history(
        &self,
        indicator: &str,
        current: PyDataFrame,
        statistic: Option<&str>,
        aggregate: Option<&str>,
    ) -> PyResult<PyDataFrame> {
        let table = self.table()?;
        let selection = Self::selection(indicator, statistic)?;
        let history = match aggregate {
            Some(name) => {
                let stat = Self::statistic(name)?;
                let section = table
                    .mapping()
                    .section
                    .as_deref()
                    .ok_or_else(|| IpiError::MissingColumn("section".into()))?;
                let current = current_values_from_frame(&current.0, section)?;
                build_section_history(table, &selection, stat, &current)?
            }
            None => {
                let current = current_values_from_frame(&current.0, &table.mapping().entity)?;
                build_history(table, &selection, &current)?
            }
        };
        Ok(PyDataFrame(history.to_frame()?))
    }

    /// Dissolve a block boundary GeoJSON into one feature per section.
    ///
    /// Returns the dissolved FeatureCollection as a GeoJSON string.
    #[staticmethod]
    #[pyo3(signature = (boundaries, sections, section_property="section_name"))]
    fn dissolve(boundaries: &str, sections: Vec<String>, section_property: &str) -> PyResult<String> {
        let collection = BoundaryCollection::from_json(boundaries)?;
        let blocks = blocks_from_geojson(&collection, section_property)?;
        let dissolved = dissolve(&blocks, &sections)?;
        Ok(serde_json::to_string(&dissolved.to_geojson()).map_err(IpiError::from)?)
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

impl IpiModel {
    fn table(&self) -> Result<&IndicatorTable, IpiError> {
        self.table
            .as_ref()
            .ok_or_else(|| IpiError::NotLoaded("indicator table".into()))
    }

    fn statistic(name: &str) -> PyResult<Statistic> {
        Statistic::parse(name).ok_or_else(|| {
            PyValueError::new_err(format!(
                "Invalid statistic: '{}'. Must be 'mean', 'min', 'max' or 'std'",
                name
            ))
        })
    }

    fn selection(indicator: &str, statistic: Option<&str>) -> PyResult<IndicatorSelection> {
        Ok(match statistic {
            Some(name) => IndicatorSelection::with_statistic(indicator, Self::statistic(name)?),
            None => IndicatorSelection::new(indicator),
        })
    }
}
