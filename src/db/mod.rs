//! libSQL database handle shared by the persistent queue and state store.
//!
//! One connection is opened per database and every operation takes the
//! handle's lock first, so a transaction opened by one backend never
//! interleaves with statements from another.

pub mod migrations;

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use libsql::{Connection, Database as LibSqlDatabase};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::error::StoreError;

struct DbInner {
    _db: LibSqlDatabase,
    conn: Connection,
    lock: Mutex<()>,
}

/// Cloneable handle to an open, migrated libSQL database.
#[derive(Clone)]
pub struct LibSqlDb {
    inner: Arc<DbInner>,
}

/// Exclusive access to the connection for the lifetime of the guard.
pub struct DbGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    conn: &'a Connection,
}

impl Deref for DbGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl LibSqlDb {
    /// Open (or create) a local database file and run migrations.
    pub async fn open_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let handle = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(handle)
    }

    /// Create an in-memory database (for tests).
    pub async fn open_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;

        Ok(Self {
            inner: Arc::new(DbInner {
                _db: db,
                conn,
                lock: Mutex::new(()),
            }),
        })
    }

    /// Wait for exclusive use of the connection.
    pub async fn lock(&self) -> DbGuard<'_> {
        DbGuard {
            _guard: self.inner.lock.lock().await,
            conn: &self.inner.conn,
        }
    }
}
