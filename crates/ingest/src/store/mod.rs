//! Tick persistence
//!
//! The writer only sees the `TickStore`/`StoreSession` contract from
//! `traits.rs`; the statement shape lives here so every backend renders the
//! same columns.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryTickStore;
#[cfg(feature = "postgres")]
pub use postgres::PgTickStore;

/// Rows per INSERT statement (4 bind parameters each, well under the
/// PostgreSQL limit of 65535)
pub const MAX_ROWS_PER_STATEMENT: usize = 1000;

/// Persisted columns, in bind order
pub const TICK_COLUMNS: [&str; 4] = ["symbol", "ts", "price", "volume"];

/// Bulk insert of tick rows into one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    table: String,
}

impl InsertStatement {
    /// `table` must already be validated (see `IngestConfig::validate`)
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Multi-row INSERT with numbered placeholders for `rows` rows
    pub fn sql(&self, rows: usize) -> String {
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ",
            self.table,
            TICK_COLUMNS.join(", ")
        );
        let width = TICK_COLUMNS.len();
        for row in 0..rows {
            if row > 0 {
                sql.push_str(", ");
            }
            let base = row * width;
            let placeholders: Vec<String> =
                (1..=width).map(|col| format!("${}", base + col)).collect();
            sql.push('(');
            sql.push_str(&placeholders.join(", "));
            sql.push(')');
        }
        sql
    }

    /// DDL for the target table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id BIGSERIAL PRIMARY KEY, \
             symbol TEXT NOT NULL, \
             ts TIMESTAMPTZ NOT NULL, \
             price NUMERIC NOT NULL, \
             volume NUMERIC NOT NULL)",
            self.table
        )
    }
}
