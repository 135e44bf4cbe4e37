//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{ObjectRepo, PinRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: PinRepo + ObjectRepo + Send + Sync {
    /// Create tables and indexes if they are missing.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(600));

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // One connection serializes writers and avoids "database is locked"
            // under concurrent pin workers.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run a query future and warn when it exceeds the advisory timeout.
    ///
    /// SQLite cannot cancel a running statement, so the timeout is only logged.
    async fn timed<T>(&self, op: &'static str, fut: impl Future<Output = T>) -> T {
        let started = Instant::now();
        let out = fut.await;
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                op,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_secs = self.query_timeout.as_secs(),
                "slow metadata query"
            );
        }
        out
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use sqlx::QueryBuilder;
    use std::collections::HashMap;
    use time::OffsetDateTime;

    fn is_unique_violation(e: &sqlx::Error) -> bool {
        matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
    }

    #[async_trait]
    impl PinRepo for SqliteStore {
        async fn create_pin(&self, pin: &NewPin) -> MetadataResult<PinRow> {
            let now = OffsetDateTime::now_utc();
            let result = sqlx::query_as::<_, PinRow>(
                r#"
                INSERT INTO pins (content, cid, user_id, active, pinning, failed, size, created_at, updated_at)
                VALUES (?, ?, ?, 0, 1, 0, 0, ?, ?)
                RETURNING *
                "#,
            )
            .bind(pin.content)
            .bind(pin.cid.to_string())
            .bind(pin.user_id)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await;

            match result {
                Ok(row) => Ok(row),
                Err(e) if is_unique_violation(&e) => Err(MetadataError::AlreadyExists(format!(
                    "pin for content {}",
                    pin.content
                ))),
                Err(e) => Err(e.into()),
            }
        }

        async fn get_pin(&self, id: i64) -> MetadataResult<Option<PinRow>> {
            let row = sqlx::query_as::<_, PinRow>("SELECT * FROM pins WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_pin_by_content(&self, content: i64) -> MetadataResult<Option<PinRow>> {
            let row = sqlx::query_as::<_, PinRow>("SELECT * FROM pins WHERE content = ?")
                .bind(content)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_pins_to_restore(&self) -> MetadataResult<Vec<PinRow>> {
            let rows = sqlx::query_as::<_, PinRow>(
                "SELECT * FROM pins WHERE active = 0 AND pinning = 1 ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn mark_pin_active(&self, content: i64, size: u64) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                UPDATE pins
                SET active = 1, pinning = 0, failed = 0, size = ?, updated_at = ?
                WHERE content = ?
                "#,
            )
            .bind(to_db_size(size))
            .bind(OffsetDateTime::now_utc())
            .bind(content)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("pin for content {content}")));
            }
            Ok(())
        }

        async fn mark_pin_failed(&self, content: i64) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                UPDATE pins
                SET active = 0, pinning = 0, failed = 1, updated_at = ?
                WHERE content = ?
                "#,
            )
            .bind(OffsetDateTime::now_utc())
            .bind(content)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("pin for content {content}")));
            }
            Ok(())
        }

        async fn delete_pin(&self, content: i64) -> MetadataResult<Option<PinRow>> {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query_as::<_, PinRow>("DELETE FROM pins WHERE content = ? RETURNING *")
                .bind(content)
                .fetch_optional(&mut *tx)
                .await?;

            // The cascade covers this; the explicit delete keeps databases opened
            // without foreign key enforcement consistent too.
            if let Some(pin) = &row {
                sqlx::query("DELETE FROM obj_refs WHERE pin = ?")
                    .bind(pin.id)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            Ok(row)
        }

        async fn count_active_pins(&self) -> MetadataResult<i64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pins WHERE active = 1")
                .fetch_one(&self.pool)
                .await?;
            Ok(count)
        }
    }

    #[async_trait]
    impl ObjectRepo for SqliteStore {
        async fn insert_objects(
            &self,
            objects: &[NewObject],
            batch_size: usize,
        ) -> MetadataResult<Vec<i64>> {
            if batch_size == 0 {
                return Err(MetadataError::Config("batch_size cannot be 0".to_string()));
            }

            let mut ids: HashMap<String, i64> = HashMap::with_capacity(objects.len());
            self.timed("insert_objects", async {
                for batch in objects.chunks(batch_size) {
                    let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO objects (cid, size) ");
                    qb.push_values(batch, |mut row, obj| {
                        row.push_bind(obj.cid.to_string())
                            .push_bind(to_db_size(obj.size));
                    });
                    // A no-op update makes RETURNING yield ids for existing rows as well.
                    qb.push(" ON CONFLICT(cid) DO UPDATE SET cid = excluded.cid RETURNING id, cid");

                    let rows: Vec<(i64, String)> =
                        qb.build_query_as().fetch_all(&self.pool).await?;
                    ids.extend(rows.into_iter().map(|(id, cid)| (cid, id)));
                }
                Ok::<_, MetadataError>(())
            })
            .await?;

            objects
                .iter()
                .map(|obj| {
                    let key = obj.cid.to_string();
                    ids.get(&key).copied().ok_or_else(|| {
                        MetadataError::Internal(format!("no id returned for object {key}"))
                    })
                })
                .collect()
        }

        async fn insert_refs(
            &self,
            pin_id: i64,
            object_ids: &[i64],
            batch_size: usize,
        ) -> MetadataResult<()> {
            if batch_size == 0 {
                return Err(MetadataError::Config("batch_size cannot be 0".to_string()));
            }

            self.timed("insert_refs", async {
                for batch in object_ids.chunks(batch_size) {
                    let mut qb = QueryBuilder::<Sqlite>::new("INSERT OR IGNORE INTO obj_refs (pin, object) ");
                    qb.push_values(batch, |mut row, object| {
                        row.push_bind(pin_id).push_bind(*object);
                    });
                    qb.build().execute(&self.pool).await?;
                }
                Ok::<_, MetadataError>(())
            })
            .await
        }

        async fn get_object(&self, cid: &str) -> MetadataResult<Option<ObjectRow>> {
            let row = sqlx::query_as::<_, ObjectRow>("SELECT * FROM objects WHERE cid = ?")
                .bind(cid)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn objects_for_pin(&self, pin_id: i64) -> MetadataResult<Vec<ObjectRow>> {
            let rows = sqlx::query_as::<_, ObjectRow>(
                r#"
                SELECT objects.* FROM objects
                INNER JOIN obj_refs ON obj_refs.object = objects.id
                WHERE obj_refs.pin = ?
                ORDER BY objects.id
                "#,
            )
            .bind(pin_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_refs(&self, object_id: i64) -> MetadataResult<i64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM obj_refs WHERE object = ?")
                .bind(object_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(count)
        }

        async fn delete_unreferenced_objects(&self) -> MetadataResult<Vec<ObjectRow>> {
            self.timed("delete_unreferenced_objects", async {
                let rows = sqlx::query_as::<_, ObjectRow>(
                    r#"
                    DELETE FROM objects
                    WHERE NOT EXISTS (SELECT 1 FROM obj_refs WHERE obj_refs.object = objects.id)
                    RETURNING *
                    "#,
                )
                .fetch_all(&self.pool)
                .await?;
                Ok::<_, MetadataError>(rows)
            })
            .await
        }
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS pins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content INTEGER NOT NULL UNIQUE,
    cid TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 0,
    pinning INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    size INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pins_cid ON pins(cid);
CREATE INDEX IF NOT EXISTS idx_pins_state ON pins(active, pinning);

CREATE TABLE IF NOT EXISTS objects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cid TEXT NOT NULL UNIQUE,
    size INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS obj_refs (
    pin INTEGER NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
    object INTEGER NOT NULL REFERENCES objects(id),
    UNIQUE(pin, object)
);
CREATE INDEX IF NOT EXISTS idx_obj_refs_object ON obj_refs(object);
"#;
