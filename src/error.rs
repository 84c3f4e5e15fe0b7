// ⚠️ Typed errors for the library boundary
//
// Bad cell values are never errors (they coerce to zero). These enums cover
// the structural failures: a workbook that cannot be read, a scenario with an
// unknown adjustment name, an edit that targets a row that does not exist.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("workbook directory not found: {0}")]
    WorkbookNotFound(PathBuf),

    #[error("required sheet '{sheet}' not found at {path}")]
    MissingSheet { sheet: String, path: PathBuf },

    #[error("sheet '{sheet}' has no header row at offset {offset}")]
    MissingHeader { sheet: String, offset: usize },

    #[error("sheet '{sheet}' is missing required column '{column}'")]
    MissingColumn { sheet: String, column: String },

    #[error("sheet '{sheet}' has no month columns")]
    NoMonthColumns { sheet: String },

    #[error("failed to read sheet '{sheet}'")]
    Csv {
        sheet: String,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScenarioError {
    #[error("unknown adjustment '{0}'")]
    UnknownAdjustment(String),

    #[error("unknown territory '{territory}' in adjustment '{name}'")]
    UnknownTerritory { name: String, territory: String },

    #[error("unknown channel '{channel}' in adjustment '{name}'")]
    UnknownChannel { name: String, channel: String },

    #[error("adjustment '{name}' has invalid value '{value}'")]
    InvalidValue { name: String, value: String },

    #[error("expected 'name=value', got '{0}'")]
    MalformedAssignment(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EditError {
    #[error("no B2B customer named '{0}'")]
    UnknownCustomer(String),

    #[error("no overhead row at index {0}")]
    UnknownOverheadRow(usize),

    #[error("no DTC inputs loaded for territory '{0}'")]
    UnknownTerritory(String),

    #[error("month '{0}' is not part of the budget period")]
    UnknownMonth(String),

    #[error("value {0} is not a finite number")]
    NotFinite(f64),
}
