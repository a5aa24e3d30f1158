use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::dataset::HousingRecord;
use crate::error::Result;

/// Relational store holding the `housing_data` table
#[async_trait]
pub trait HousingStore: Send + Sync {
    /// Create the table if it does not exist yet
    async fn migrate(&self) -> Result<()>;

    async fn count_rows(&self) -> Result<i64>;

    /// Insert every record inside one transaction, committed once at the end.
    /// A failing insert rolls back the whole batch. With `replace`, existing
    /// rows are deleted in the same transaction first.
    async fn insert_records(&self, records: &[HousingRecord], replace: bool) -> Result<u64>;

    /// All rows ordered by id
    async fn fetch_all(&self) -> Result<Vec<(i64, HousingRecord)>>;
}

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl HousingStore for PostgresStore {
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn count_rows(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM housing_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self, records), fields(rows = records.len()))]
    async fn insert_records(&self, records: &[HousingRecord], replace: bool) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        if replace {
            let deleted = sqlx::query("DELETE FROM housing_data")
                .execute(&mut *tx)
                .await?
                .rows_affected();
            debug!("Deleted {} existing rows", deleted);
        }

        for record in records {
            let f = &record.features;
            sqlx::query(
                r#"
                INSERT INTO housing_data
                    (med_inc, house_age, ave_rooms, ave_bedrms, population, ave_occup, latitude, longitude, target)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(f[0])
            .bind(f[1])
            .bind(f[2])
            .bind(f[3])
            .bind(f[4])
            .bind(f[5])
            .bind(f[6])
            .bind(f[7])
            .bind(record.target)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Inserted {} housing rows", records.len());
        Ok(records.len() as u64)
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<(i64, HousingRecord)>> {
        let rows = sqlx::query(
            r#"
            SELECT id, med_inc, house_age, ave_rooms, ave_bedrms, population, ave_occup,
                   latitude, longitude, target
            FROM housing_data
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let record = HousingRecord {
                    features: [
                        row.get("med_inc"),
                        row.get("house_age"),
                        row.get("ave_rooms"),
                        row.get("ave_bedrms"),
                        row.get("population"),
                        row.get("ave_occup"),
                        row.get("latitude"),
                        row.get("longitude"),
                    ],
                    target: row.get("target"),
                };
                (row.get::<i64, _>("id"), record)
            })
            .collect())
    }
}

/// In-process store used for dry runs; nothing leaves the process
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<(i64, HousingRecord)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: &[HousingRecord]) -> Self {
        let rows = records
            .iter()
            .enumerate()
            .map(|(i, r)| (i as i64 + 1, *r))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }
}

#[async_trait]
impl HousingStore for MemoryStore {
    async fn migrate(&self) -> Result<()> {
        Ok(())
    }

    async fn count_rows(&self) -> Result<i64> {
        Ok(self.rows.read().await.len() as i64)
    }

    async fn insert_records(&self, records: &[HousingRecord], replace: bool) -> Result<u64> {
        let mut rows = self.rows.write().await;
        // Identity keeps counting after a delete, like a database sequence.
        let mut next_id = rows.last().map(|(id, _)| id + 1).unwrap_or(1);
        if replace {
            rows.clear();
        }
        for record in records {
            rows.push((next_id, *record));
            next_id += 1;
        }
        Ok(records.len() as u64)
    }

    async fn fetch_all(&self) -> Result<Vec<(i64, HousingRecord)>> {
        Ok(self.rows.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(v: f64) -> HousingRecord {
        HousingRecord {
            features: [v; 8],
            target: v,
        }
    }

    #[tokio::test]
    async fn memory_store_assigns_increasing_ids() {
        let store = MemoryStore::new();
        store.insert_records(&[record(1.0), record(2.0)], false).await.unwrap();
        store.insert_records(&[record(3.0)], true).await.unwrap();

        let rows = store.fetch_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 3);
        assert_eq!(store.count_rows().await.unwrap(), 1);
    }

    mod database {
        use super::*;
        use crate::config::DatabaseConfig;
        use sqlx::Executor;

        /// Store bound to a throwaway schema so tests never share rows
        async fn scratch_store() -> (PostgresStore, PgPool, String) {
            let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DatabaseConfig::default().url);
            let admin = PgPoolOptions::new()
                .max_connections(1)
                .connect(&url)
                .await
                .expect("Requires database");
            let schema = format!("arbor_test_{}", uuid::Uuid::new_v4().simple());
            admin
                .execute(format!("CREATE SCHEMA {schema}").as_str())
                .await
                .unwrap();

            let search_path = format!("SET search_path TO {schema}");
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .after_connect(move |conn, _meta| {
                    let sql = search_path.clone();
                    Box::pin(async move {
                        (&mut *conn).execute(sql.as_str()).await?;
                        Ok(())
                    })
                })
                .connect(&url)
                .await
                .unwrap();

            let store = PostgresStore::from_pool(pool);
            store.migrate().await.unwrap();
            (store, admin, schema)
        }

        async fn drop_schema(admin: &PgPool, schema: &str) {
            let _ = admin
                .execute(format!("DROP SCHEMA {schema} CASCADE").as_str())
                .await;
        }

        #[tokio::test]
        #[ignore] // Requires database
        async fn migrate_creates_empty_table() {
            let (store, admin, schema) = scratch_store().await;
            assert_eq!(store.count_rows().await.unwrap(), 0);

            // Re-running migrations is a no-op.
            store.migrate().await.unwrap();
            assert_eq!(store.count_rows().await.unwrap(), 0);
            drop_schema(&admin, &schema).await;
        }

        #[tokio::test]
        #[ignore] // Requires database
        async fn failing_row_rolls_back_whole_batch() {
            let (store, admin, schema) = scratch_store().await;
            store.insert_records(&[record(1.0)], false).await.unwrap();

            let batch = [record(2.0), record(3.0), record(f64::NAN)];
            assert!(store.insert_records(&batch, false).await.is_err());
            assert_eq!(store.count_rows().await.unwrap(), 1);

            let replace = [record(4.0), record(f64::INFINITY)];
            assert!(store.insert_records(&replace, true).await.is_err());
            assert_eq!(store.count_rows().await.unwrap(), 1);
            drop_schema(&admin, &schema).await;
        }

        #[tokio::test]
        #[ignore] // Requires database
        async fn replace_keeps_a_single_copy() {
            let (store, admin, schema) = scratch_store().await;
            let batch = [record(1.0), record(2.0), record(3.0)];
            store.insert_records(&batch, false).await.unwrap();
            store.insert_records(&batch, true).await.unwrap();
            assert_eq!(store.count_rows().await.unwrap(), 3);

            let raw: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT target) FROM housing_data")
                .fetch_one(store.pool())
                .await
                .unwrap();
            assert_eq!(raw, 3);
            drop_schema(&admin, &schema).await;
        }

        #[tokio::test]
        #[ignore] // Requires database
        async fn fetch_all_is_ordered_by_id() {
            let (store, admin, schema) = scratch_store().await;
            store
                .insert_records(&[record(5.0), record(1.0), record(3.0)], false)
                .await
                .unwrap();

            let rows = store.fetch_all().await.unwrap();
            let ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
            let mut sorted = ids.clone();
            sorted.sort();
            assert_eq!(ids, sorted);
            let targets: Vec<f64> = rows.iter().map(|(_, r)| r.target).collect();
            assert_eq!(targets, vec![5.0, 1.0, 3.0]);
            assert_eq!(rows[0].1, record(5.0));
            drop_schema(&admin, &schema).await;
        }
    }
}
