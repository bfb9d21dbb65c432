use serde::Deserialize;

use crate::error::IpiError;
use crate::schema::{input, statistic};

/// Names of the structural columns of an indicator table.
///
/// Each dashboard page passes its own mapping instead of relying on column
/// positions: the section page keys rows by `section name`, the block page
/// keys rows by `block` and carries the parent section alongside.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub year: String,
    pub entity: String,
    pub section: Option<String>,
    /// Separator between an indicator name and its statistic suffix,
    /// e.g. `" "` for `beneficial fraction mean`.
    pub statistic_separator: String,
    /// Replace `_` with a space in every header before lookup.
    pub underscores_to_spaces: bool,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::sections()
    }
}

impl ColumnMapping {
    /// Section-level table: one row per (year, section).
    pub fn sections() -> Self {
        Self {
            year: input::YEAR.to_string(),
            entity: input::SECTION_NAME.to_string(),
            section: None,
            statistic_separator: " ".to_string(),
            underscores_to_spaces: true,
        }
    }

    /// Block-level table: one row per (year, block), tagged with its section.
    pub fn blocks() -> Self {
        Self {
            year: input::YEAR.to_string(),
            entity: input::BLOCK.to_string(),
            section: Some(input::SECTION_NAME.to_string()),
            statistic_separator: " ".to_string(),
            underscores_to_spaces: true,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, IpiError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Look up a preset by name (`"sections"` or `"blocks"`).
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "sections" => Some(Self::sections()),
            "blocks" => Some(Self::blocks()),
            _ => None,
        }
    }

    /// Mapping with its column names spelled the way normalized headers are.
    pub fn normalized(&self) -> Self {
        if !self.underscores_to_spaces {
            return self.clone();
        }
        let fix = |name: &str| name.trim().replace('_', " ");
        Self {
            year: fix(&self.year),
            entity: fix(&self.entity),
            section: self.section.as_deref().map(fix),
            statistic_separator: self.statistic_separator.clone(),
            underscores_to_spaces: true,
        }
    }

    /// Columns that identify a row rather than carry a measurement.
    pub fn structural_columns(&self) -> Vec<&str> {
        let mut cols = vec![self.year.as_str(), self.entity.as_str()];
        if let Some(section) = &self.section {
            cols.push(section.as_str());
        }
        cols
    }
}

/// Aggregation applied when block-level raw values are summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Mean,
    Min,
    Max,
    Std,
}

impl Statistic {
    pub const ALL: [Statistic; 4] = [
        Statistic::Mean,
        Statistic::Min,
        Statistic::Max,
        Statistic::Std,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            Statistic::Mean => statistic::MEAN,
            Statistic::Min => statistic::MIN,
            Statistic::Max => statistic::MAX,
            Statistic::Std => statistic::STD,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.suffix().eq_ignore_ascii_case(name.trim()))
    }
}

/// The indicator a user picked, optionally narrowed to one statistic column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorSelection {
    pub indicator: String,
    pub statistic: Option<Statistic>,
}

impl IndicatorSelection {
    pub fn new(indicator: impl Into<String>) -> Self {
        Self {
            indicator: indicator.into(),
            statistic: None,
        }
    }

    pub fn with_statistic(indicator: impl Into<String>, statistic: Statistic) -> Self {
        Self {
            indicator: indicator.into(),
            statistic: Some(statistic),
        }
    }

    /// Physical column name under the given mapping.
    pub fn column_name(&self, mapping: &ColumnMapping) -> String {
        match self.statistic {
            Some(stat) => format!(
                "{}{}{}",
                self.indicator,
                mapping.statistic_separator,
                stat.suffix()
            ),
            None => self.indicator.clone(),
        }
    }
}
