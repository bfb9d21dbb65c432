use std::cmp::Ordering;

use polars::prelude::*;

use crate::config::IndicatorSelection;
use crate::error::IpiError;
use crate::table::IndicatorTable;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub entity_id: String,
    pub section_id: Option<String>,
    pub value: Option<f64>,
}

/// Entities of one year ordered by indicator value, highest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub entity_column: String,
    pub column: String,
    pub year: i64,
    pub rows: Vec<RankedRow>,
}

impl Ranking {
    /// Upper bound for progress bars; `None` if every value is null.
    pub fn max_value(&self) -> Option<f64> {
        self.rows.iter().filter_map(|r| r.value).reduce(f64::max)
    }

    pub fn to_frame(&self) -> Result<DataFrame, IpiError> {
        let ids: Vec<&str> = self.rows.iter().map(|r| r.entity_id.as_str()).collect();
        let values: Vec<Option<f64>> = self.rows.iter().map(|r| r.value).collect();
        let df = DataFrame::new(vec![
            Series::new(self.entity_column.as_str().into(), ids).into(),
            Series::new(self.column.as_str().into(), values).into(),
        ])?;
        Ok(df)
    }
}

/// Rank the entities of `year` by value. Nulls go last; ties keep table order.
pub fn rank_year(
    table: &IndicatorTable,
    selection: &IndicatorSelection,
    year: i64,
) -> Result<Ranking, IpiError> {
    let column = table.resolve(selection)?;
    let mut rows: Vec<RankedRow> = table
        .year_slice(selection, year)?
        .into_iter()
        .map(|r| RankedRow {
            entity_id: r.entity_id,
            section_id: r.section_id,
            value: r.value,
        })
        .collect();

    rows.sort_by(|a, b| match (a.value, b.value) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    Ok(Ranking {
        entity_column: table.mapping().entity.clone(),
        column,
        year,
        rows,
    })
}
