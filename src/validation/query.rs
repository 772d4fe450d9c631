//! Data-query check.

use crate::error::{DrError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::{AnyConnection, Connection};
use tracing::debug;

/// Runs a query and counts the rows it returns.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Number of rows `query` yields. The whole result set is read.
    async fn count_rows(&self, connection: &str, query: &str) -> Result<u64>;
}

/// [`QueryBackend`] over `sqlx`'s `Any` driver; the URL scheme picks the
/// database (`mysql://`, `postgres://`, `sqlite:`).
#[derive(Debug, Clone, Default)]
pub struct SqlxQueryBackend;

impl SqlxQueryBackend {
    pub fn new() -> Self {
        sqlx::any::install_default_drivers();
        Self
    }
}

fn query_error(stage: &str, e: sqlx::Error) -> DrError {
    DrError::QueryConnection(format!("{}: {}", stage, e))
}

#[async_trait]
impl QueryBackend for SqlxQueryBackend {
    async fn count_rows(&self, connection: &str, query: &str) -> Result<u64> {
        sqlx::any::install_default_drivers();

        let mut conn = AnyConnection::connect(connection)
            .await
            .map_err(|e| query_error("connect", e))?;

        let mut rows = 0u64;
        {
            let mut stream = sqlx::query(query).fetch(&mut conn);
            while stream
                .try_next()
                .await
                .map_err(|e| query_error("query", e))?
                .is_some()
            {
                rows += 1;
            }
        }

        if let Err(e) = conn.close().await {
            debug!(error = %e, "Failed to close query connection");
        }
        Ok(rows)
    }
}
