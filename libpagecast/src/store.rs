//! Persisted local state
//!
//! A single SQLite table of JSON values. Every key is namespaced under
//! [`KEY_PREFIX`]; callers pass the bare name (`"theme"`) and the store adds
//! the prefix.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, Row};
use std::path::Path;

use crate::error::{Result, StoreError};

pub const KEY_PREFIX: &str = "pagecast:";

pub const THEME_KEY: &str = "theme";
pub const API_KEY_KEY: &str = "api_key";
pub const TEMPLATES_KEY: &str = "prompt_templates";
pub const HISTORY_KEY: &str = "post_history";

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the store at `db_path`
    pub async fn open(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::IoError)?;
            }
        }

        // Forward slashes keep the URL valid on Windows; mode=rwc creates the file
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(StoreError::SqlxError)?;

        Self::migrate(pool).await
    }

    /// Throwaway store for tests
    ///
    /// Limited to one connection because each in-memory connection would
    /// otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(StoreError::SqlxError)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::MigrationError)?;
        Ok(Self { pool })
    }

    pub fn namespaced(key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }

    /// Raw JSON text stored under `key`
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        read_raw(&self.pool, key).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key).await? {
            Some(raw) => Ok(Some(decode(key, &raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        write_raw(&self.pool, key, encode(key, value)?).await
    }

    /// Read, change and write back one value inside a single write transaction
    ///
    /// `BEGIN IMMEDIATE` takes the write lock before the read, so another
    /// process sharing the file cannot slip a write in between. A missing
    /// value starts from `T::default()`. When `change` fails nothing is
    /// written. Returns the stored value and whatever `change` returned.
    pub async fn update_json<T, R, F>(&self, key: &str, change: F) -> Result<(T, R)>
    where
        T: Serialize + DeserializeOwned + Default + Send,
        R: Send,
        F: FnOnce(&mut T) -> Result<R> + Send,
    {
        let mut conn = self.pool.acquire().await.map_err(StoreError::SqlxError)?;
        (&mut *conn)
            .execute("BEGIN IMMEDIATE")
            .await
            .map_err(StoreError::SqlxError)?;

        let result: Result<(T, R)> = async {
            let mut value: T = match read_raw(&mut *conn, key).await? {
                Some(raw) => decode(key, &raw)?,
                None => T::default(),
            };
            let output = change(&mut value)?;
            write_raw(&mut *conn, key, encode(key, &value)?).await?;
            Ok((value, output))
        }
        .await;

        let end = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
        (&mut *conn).execute(end).await.map_err(StoreError::SqlxError)?;
        result
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(Self::namespaced(key))
            .execute(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;
        Ok(result.rows_affected() > 0)
    }

    /// All stored keys, prefix included
    pub async fn keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM kv_store ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("key")).collect())
    }
}

async fn read_raw<'e, E>(executor: E, key: &str) -> Result<Option<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
        .bind(Store::namespaced(key))
        .fetch_optional(executor)
        .await
        .map_err(StoreError::SqlxError)?;

    Ok(row.map(|r| r.get::<String, _>("value")))
}

async fn write_raw<'e, E>(executor: E, key: &str, raw: String) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO kv_store (key, value, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(Store::namespaced(key))
    .bind(raw)
    .bind(chrono::Utc::now().timestamp())
    .execute(executor)
    .await
    .map_err(StoreError::SqlxError)?;

    Ok(())
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|source| {
        StoreError::Serialization {
            key: Store::namespaced(key),
            source,
        }
        .into()
    })
}

fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|source| {
        StoreError::Serialization {
            key: Store::namespaced(key),
            source,
        }
        .into()
    })
}
