/// Column-name constants for ipi-dashboard derived tables.
/// Single source of truth - exported to Python via PyO3.

// ── Input columns (defaults) ────────────────────────────────────────────────
pub mod input {
    pub const YEAR: &str = "year";
    pub const SECTION_NAME: &str = "section name";
    pub const BLOCK: &str = "block";
}

// ── Difference table ────────────────────────────────────────────────────────
pub mod difference {
    pub const INDICATOR_DIFFERENCE: &str = "indicator_difference";
}

// ── History table ───────────────────────────────────────────────────────────
pub mod history {
    pub const CURRENT_VALUE: &str = "current_value";
    pub const HISTORY: &str = "history";
}

// ── Dissolved geometry properties ───────────────────────────────────────────
pub mod geometry {
    pub const SECTION_ID: &str = "section_id";
    pub const SECTION_NAME_PROPERTY: &str = "section_name";
    pub const BLOCK_PROPERTY: &str = "block";
}

// ── Statistic suffixes ──────────────────────────────────────────────────────
pub mod statistic {
    pub const MEAN: &str = "mean";
    pub const MIN: &str = "min";
    pub const MAX: &str = "max";
    pub const STD: &str = "std";

    pub const ALL: [&str; 4] = [MEAN, MIN, MAX, STD];
}
