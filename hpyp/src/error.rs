use thiserror::Error;

/// A seating invariant that failed to hold when re-derived from stored detail.
///
/// Produced only by [`crate::restaurants::Restaurant::check_consistency`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("type {key}: stored customer count {stored} but tables hold {derived}")]
    CustomerSum {
        key: String,
        stored: usize,
        derived: usize,
    },

    #[error("type {key}: stored table count {stored} but {derived} tables are recorded")]
    TableSum {
        key: String,
        stored: usize,
        derived: usize,
    },

    #[error("type {key}: found an empty table")]
    EmptyTable { key: String },

    #[error("type {key}: {tables} tables for {customers} customers")]
    TablesExceedCustomers {
        key: String,
        customers: usize,
        tables: usize,
    },

    #[error("type {key}: {customers} customers but no tables")]
    NoTables { key: String, customers: usize },

    #[error("type {key}: stored with zero customers")]
    EmptyType { key: String },

    #[error("type {key}: histogram bucket for size {size} has zero tables")]
    EmptyBucket { key: String, size: usize },

    #[error("cached {which} total is {stored} but types sum to {derived}")]
    Total {
        which: &'static str,
        stored: usize,
        derived: usize,
    },
}

/// Errors for restaurant configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("discount must be in [0, 1), got {discount}")]
    DiscountOutOfRange { discount: f64 },

    #[error("concentration must be finite and greater than -discount ({discount}), got {concentration}")]
    ConcentrationTooLow { discount: f64, concentration: f64 },

    #[cfg(feature = "serde")]
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
}

/// Errors from the payload arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("handle {index}@{generation} does not refer to a live payload")]
    StaleHandle { index: usize, generation: u32 },
}

/// Errors from saving or loading payload archives.
#[cfg(feature = "serde")]
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("archive version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}
