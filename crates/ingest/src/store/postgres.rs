//! PostgreSQL tick store (deadpool-postgres)
//!
//! A session holds one pooled connection. Rows are staged by `execute` and
//! written inside a single transaction on `commit`, so a session dropped
//! without committing leaves nothing behind.

use async_trait::async_trait;
use deadpool_postgres::{Config, Object, Pool, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::message::TickRow;
use crate::store::{InsertStatement, MAX_ROWS_PER_STATEMENT};
use crate::traits::{StoreSession, TickStore};

/// Create a connection pool from a database URL
pub fn create_pool(database_url: &str) -> Result<Pool, PersistenceError> {
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| {
            PersistenceError::Pool(format!("invalid database URL: {}", e))
        })?;

    let mut cfg = Config::new();
    if let Some(host) = pg_config.get_hosts().first() {
        match host {
            tokio_postgres::config::Host::Tcp(h) => cfg.host = Some(h.clone()),
            #[cfg(unix)]
            tokio_postgres::config::Host::Unix(p) => {
                cfg.host = Some(p.to_string_lossy().to_string())
            }
        }
    }
    if let Some(port) = pg_config.get_ports().first() {
        cfg.port = Some(*port);
    }
    if let Some(user) = pg_config.get_user() {
        cfg.user = Some(user.to_string());
    }
    if let Some(password) = pg_config.get_password() {
        cfg.password = Some(String::from_utf8_lossy(password).to_string());
    }
    if let Some(dbname) = pg_config.get_dbname() {
        cfg.dbname = Some(dbname.to_string());
    }

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| PersistenceError::Pool(format!("failed to create pool: {}", e)))
}

pub struct PgTickStore {
    pool: Pool,
}

impl PgTickStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn connect(database_url: &str) -> Result<Self, PersistenceError> {
        Ok(Self::new(create_pool(database_url)?))
    }

    /// Create the tick table if it does not exist
    pub async fn ensure_table(&self, stmt: &InsertStatement) -> Result<(), PersistenceError> {
        let client = self.pool.get().await?;
        client.batch_execute(&stmt.create_table_sql()).await?;
        info!(table = %stmt.table(), "tick table ready");
        Ok(())
    }
}

#[async_trait]
impl TickStore for PgTickStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, PersistenceError> {
        let client = self.pool.get().await?;
        Ok(Box::new(PgSession {
            client,
            staged: Vec::new(),
        }))
    }
}

struct PgSession {
    client: Object,
    staged: Vec<(InsertStatement, Vec<TickRow>)>,
}

#[async_trait]
impl StoreSession for PgSession {
    async fn execute(
        &mut self,
        stmt: &InsertStatement,
        rows: &[TickRow],
    ) -> Result<(), PersistenceError> {
        if !rows.is_empty() {
            self.staged.push((stmt.clone(), rows.to_vec()));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        let PgSession { mut client, staged } = *self;
        let tx = client.transaction().await?;

        for (stmt, rows) in &staged {
            for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
                let sql = stmt.sql(chunk.len());
                let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 4);
                for row in chunk {
                    params.push(&row.symbol);
                    params.push(&row.ts);
                    params.push(&row.price);
                    params.push(&row.volume);
                }
                let inserted = tx.execute(sql.as_str(), &params).await?;
                debug!(table = %stmt.table(), rows = inserted, "inserted tick chunk");
            }
        }

        // Dropping `tx` on any error above rolls the transaction back.
        tx.commit().await?;
        Ok(())
    }
}
