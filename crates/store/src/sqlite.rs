use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use theta_core::{RecordKey, StateStore, StoreError, StoredRecord};
use tracing::debug;

fn database(err: impl std::fmt::Display) -> StoreError {
    StoreError::Database(err.to_string())
}

/// `SQLite` document store.
///
/// Each namespace holds JSON documents in `strategy_records`; the engine keeps
/// exactly one per strategy. Uses connection pooling for concurrent access.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database and runs migrations.
    ///
    /// # Arguments
    ///
    /// * `database_url` - `SQLite` database path (e.g., `<sqlite://theta.db>`)
    /// * `max_connections` - pool size
    ///
    /// # Errors
    ///
    /// Returns error if connection fails or migrations fail.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(database)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(database)?;

        Self::migrate(pool).await
    }

    /// Creates an in-memory database.
    ///
    /// A single connection is used so every query sees the same database.
    ///
    /// # Errors
    ///
    /// Returns error if connection fails.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(database)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(database)?;

        Ok(Self { pool })
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn create_namespace(&self, name: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query("INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(database)?;

        Ok(())
    }

    async fn get(&self, namespace: &str) -> Result<Option<StoredRecord>, StoreError> {
        let row = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, document FROM strategy_records WHERE namespace = ?1 ORDER BY id LIMIT 1",
        )
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await
        .map_err(database)?;

        row.map(|(id, document)| {
            Ok(StoredRecord {
                key: RecordKey {
                    namespace: namespace.to_string(),
                    id: id.to_string(),
                },
                document: serde_json::from_str(&document)?,
            })
        })
        .transpose()
    }

    async fn insert(
        &self,
        namespace: &str,
        document: serde_json::Value,
    ) -> Result<RecordKey, StoreError> {
        self.create_namespace(namespace).await?;

        let document = serde_json::to_string(&document)?;
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r"
            INSERT INTO strategy_records (namespace, document, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ",
        )
        .bind(namespace)
        .bind(document)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(database)?;

        let id = result.last_insert_rowid();
        debug!(namespace, id, "Inserted strategy record");

        Ok(RecordKey {
            namespace: namespace.to_string(),
            id: id.to_string(),
        })
    }

    async fn update(&self, key: &RecordKey, document: serde_json::Value) -> Result<(), StoreError> {
        let id: i64 = key
            .id
            .parse()
            .map_err(|_| StoreError::not_found(&key.namespace, &key.id))?;
        let document = serde_json::to_string(&document)?;
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r"
            UPDATE strategy_records
            SET document = ?1, updated_at = ?2
            WHERE id = ?3 AND namespace = ?4
            ",
        )
        .bind(document)
        .bind(now)
        .bind(id)
        .bind(&key.namespace)
        .execute(&self.pool)
        .await
        .map_err(database)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(&key.namespace, &key.id));
        }

        Ok(())
    }
}
