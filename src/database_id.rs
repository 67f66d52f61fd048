//! The integer type used for primary keys across the tables.

/// Alias for the integer type SQLite hands back for `INTEGER PRIMARY KEY` columns.
pub type DatabaseId = i64;
