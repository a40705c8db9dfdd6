use thiserror::Error;

/// Structural problems with the input tables. These abort a run.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("no polygon records to inspect")]
    NoRecords,

    #[error("could not detect a ward identifier field among {candidates:?}")]
    NoIdentifierField { candidates: Vec<String> },

    #[error("required column `{column}` missing from {table} table")]
    MissingColumn {
        column: &'static str,
        table: &'static str,
    },

    #[error("polygon {index} has no usable ward id in `{field}` (found {value})")]
    InvalidWardId {
        index: usize,
        field: String,
        value: String,
    },

    #[error("ward {0} is defined by more than one polygon")]
    DuplicateWardId(u32),
}
