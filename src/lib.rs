pub mod aggregation;
pub mod config;
pub mod difference;
pub mod dissolve;
pub mod error;
pub mod history;
pub mod ranking;
pub mod schema;
pub mod table;

#[cfg(feature = "python")]
mod python;

pub use aggregation::{aggregate_by_section, section_series};
pub use config::{ColumnMapping, IndicatorSelection, Statistic};
pub use difference::{compute_difference, DifferenceRow, DifferenceTable, GainLoss, MetricCard};
pub use dissolve::{
    blocks_from_geojson, dissolve, BlockPolygon, BoundaryCollection, DissolvedCollection,
};
pub use error::IpiError;
pub use history::{build_history, build_section_history, HistoryRow, HistoryTable};
pub use ranking::{rank_year, Ranking};
pub use table::{CurrentValue, IndicatorTable, PanelRow, SectionPanel};

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn ipi_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::IpiModel>()?;
    python::add_schema_exports(m)?;
    Ok(())
}
