//! ParkingLedger Repository
//!
//! `RecordStore` is the seam to the record-store engine. `MySqlRecordStore`
//! backs production, `InMemoryRecordStore` backs tests and local runs.

use super::types::*;
use crate::error::{Error, Result};
use crate::image_store::ImageRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use tokio::sync::RwLock;

/// Queryable collection of parking records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new `in` record, returning it with its assigned id
    async fn insert(&self, record: NewParkingRecord) -> Result<ParkingRecord>;

    /// Overwrite an existing record by id
    async fn update(&self, record: &ParkingRecord) -> Result<()>;

    /// Records matching `filter`, newest `entry_time` first
    async fn find(&self, filter: &RecordFilter) -> Result<Vec<ParkingRecord>>;

    /// Newest record matching `filter`
    async fn find_latest(&self, filter: &RecordFilter) -> Result<Option<ParkingRecord>>;

    async fn count(&self, filter: &RecordFilter) -> Result<i64>;

    /// Delete every record, returning how many were removed
    async fn delete_all(&self) -> Result<u64>;
}

// ========================================
// In-memory store
// ========================================

#[derive(Default)]
struct MemoryTable {
    rows: Vec<ParkingRecord>,
    next_id: i64,
}

/// In-memory record store
#[derive(Default)]
pub struct InMemoryRecordStore {
    table: RwLock<MemoryTable>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(records: &mut [ParkingRecord]) {
    records.sort_by(|a, b| b.entry_time.cmp(&a.entry_time).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, new: NewParkingRecord) -> Result<ParkingRecord> {
        let mut table = self.table.write().await;
        table.next_id += 1;
        let record = ParkingRecord {
            id: table.next_id,
            rfid_tag: new.rfid_tag,
            license_plate: new.license_plate,
            entry_time: new.entry_time,
            exit_time: None,
            status: ParkingStatus::In,
            duration_minutes: None,
            fee: None,
            images: RecordImages {
                entry: new.entry_image,
                exit: None,
            },
        };
        table.rows.push(record.clone());
        Ok(record)
    }

    async fn update(&self, record: &ParkingRecord) -> Result<()> {
        let mut table = self.table.write().await;
        let slot = table
            .rows
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| Error::NotFound(format!("Parking record {} not found", record.id)))?;
        *slot = record.clone();
        Ok(())
    }

    async fn find(&self, filter: &RecordFilter) -> Result<Vec<ParkingRecord>> {
        let table = self.table.read().await;
        let mut found: Vec<ParkingRecord> = table
            .rows
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        newest_first(&mut found);
        Ok(found)
    }

    async fn find_latest(&self, filter: &RecordFilter) -> Result<Option<ParkingRecord>> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    async fn count(&self, filter: &RecordFilter) -> Result<i64> {
        let table = self.table.read().await;
        Ok(table.rows.iter().filter(|r| filter.matches(r)).count() as i64)
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut table = self.table.write().await;
        let removed = table.rows.len() as u64;
        table.rows.clear();
        Ok(removed)
    }
}

// ========================================
// MySQL store
// ========================================

#[derive(sqlx::FromRow)]
struct ParkingRecordRow {
    id: i64,
    rfid_tag: String,
    license_plate: String,
    entry_time: DateTime<Utc>,
    exit_time: Option<DateTime<Utc>>,
    status: String,
    duration_minutes: Option<i64>,
    fee: Option<i64>,
    entry_image: Option<String>,
    exit_image: Option<String>,
}

impl TryFrom<ParkingRecordRow> for ParkingRecord {
    type Error = Error;

    fn try_from(row: ParkingRecordRow) -> Result<Self> {
        Ok(ParkingRecord {
            id: row.id,
            rfid_tag: row.rfid_tag,
            license_plate: row.license_plate,
            entry_time: row.entry_time,
            exit_time: row.exit_time,
            status: ParkingStatus::parse(&row.status)?,
            duration_minutes: row.duration_minutes,
            fee: row.fee,
            images: RecordImages {
                entry: row.entry_image.map(ImageRef::new),
                exit: row.exit_image.map(ImageRef::new),
            },
        })
    }
}

/// MySQL-backed record store (`parking_records` table)
#[derive(Clone)]
pub struct MySqlRecordStore {
    pool: MySqlPool,
}

impl MySqlRecordStore {
    const COLUMNS: &'static str = r#"
        id, rfid_tag, license_plate, entry_time, exit_time, status,
        duration_minutes, fee, entry_image, exit_image
    "#;

    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// WHERE clause and its bind values, in order
    fn where_clause(filter: &RecordFilter) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut binds = Vec::new();

        if let Some(tag) = &filter.rfid_tag {
            clauses.push("rfid_tag = ?");
            binds.push(tag.clone());
        }
        if let Some(plate) = &filter.license_plate {
            clauses.push("license_plate = ?");
            binds.push(plate.clone());
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            binds.push(status.as_str().to_string());
        }

        if clauses.is_empty() {
            (String::new(), binds)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), binds)
        }
    }

    async fn query_records(&self, filter: &RecordFilter, limit: Option<u32>) -> Result<Vec<ParkingRecord>> {
        let (where_sql, binds) = Self::where_clause(filter);
        let limit_sql = limit.map(|n| format!("LIMIT {}", n)).unwrap_or_default();
        let query = format!(
            "SELECT {} FROM parking_records {} ORDER BY entry_time DESC, id DESC {}",
            Self::COLUMNS,
            where_sql,
            limit_sql
        );

        let mut q = sqlx::query_as::<_, ParkingRecordRow>(&query);
        for value in binds {
            q = q.bind(value);
        }
        let rows = q.fetch_all(&self.pool).await?;

        rows.into_iter().map(ParkingRecord::try_from).collect()
    }
}

#[async_trait]
impl RecordStore for MySqlRecordStore {
    async fn insert(&self, new: NewParkingRecord) -> Result<ParkingRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO parking_records (
                rfid_tag, license_plate, entry_time, status, entry_image
            ) VALUES (?, ?, ?, 'in', ?)
            "#,
        )
        .bind(&new.rfid_tag)
        .bind(&new.license_plate)
        .bind(new.entry_time)
        .bind(new.entry_image.as_ref().map(|i| i.as_str().to_string()))
        .execute(&self.pool)
        .await?;

        Ok(ParkingRecord {
            id: result.last_insert_id() as i64,
            rfid_tag: new.rfid_tag,
            license_plate: new.license_plate,
            entry_time: new.entry_time,
            exit_time: None,
            status: ParkingStatus::In,
            duration_minutes: None,
            fee: None,
            images: RecordImages {
                entry: new.entry_image,
                exit: None,
            },
        })
    }

    async fn update(&self, record: &ParkingRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE parking_records SET
                rfid_tag = ?, license_plate = ?, entry_time = ?, exit_time = ?,
                status = ?, duration_minutes = ?, fee = ?, entry_image = ?, exit_image = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.rfid_tag)
        .bind(&record.license_plate)
        .bind(record.entry_time)
        .bind(record.exit_time)
        .bind(record.status.as_str())
        .bind(record.duration_minutes)
        .bind(record.fee)
        .bind(record.images.entry.as_ref().map(|i| i.as_str().to_string()))
        .bind(record.images.exit.as_ref().map(|i| i.as_str().to_string()))
        .bind(record.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Parking record {} not found", record.id)));
        }
        Ok(())
    }

    async fn find(&self, filter: &RecordFilter) -> Result<Vec<ParkingRecord>> {
        self.query_records(filter, None).await
    }

    async fn find_latest(&self, filter: &RecordFilter) -> Result<Option<ParkingRecord>> {
        Ok(self.query_records(filter, Some(1)).await?.into_iter().next())
    }

    async fn count(&self, filter: &RecordFilter) -> Result<i64> {
        let (where_sql, binds) = Self::where_clause(filter);
        let query = format!("SELECT COUNT(*) FROM parking_records {}", where_sql);

        let mut q = sqlx::query_scalar::<_, i64>(&query);
        for value in binds {
            q = q.bind(value);
        }
        Ok(q.fetch_one(&self.pool).await?)
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM parking_records")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_record(tag: &str, plate: &str, entry_time: DateTime<Utc>) -> NewParkingRecord {
        NewParkingRecord {
            rfid_tag: tag.to_string(),
            license_plate: plate.to_string(),
            entry_time,
            entry_image: None,
        }
    }

    #[tokio::test]
    async fn test_find_latest_orders_by_entry_time() {
        let store = InMemoryRecordStore::new();
        let now = Utc::now();

        let mut old = store.insert(new_record("T1", "P1", now - Duration::hours(2))).await.unwrap();
        old.status = ParkingStatus::Out;
        old.exit_time = Some(now - Duration::hours(1));
        store.update(&old).await.unwrap();
        store.insert(new_record("T1", "P1", now)).await.unwrap();

        let latest = store.find_latest(&RecordFilter::by_tag("T1")).await.unwrap().unwrap();
        assert_eq!(latest.status, ParkingStatus::In);
        assert_eq!(latest.entry_time, now);
    }

    #[tokio::test]
    async fn test_count_and_delete_all() {
        let store = InMemoryRecordStore::new();
        let now = Utc::now();
        store.insert(new_record("T1", "P1", now)).await.unwrap();
        store.insert(new_record("T2", "P2", now)).await.unwrap();

        let active = RecordFilter::by_status(ParkingStatus::In);
        assert_eq!(store.count(&active).await.unwrap(), 2);
        assert_eq!(store.delete_all().await.unwrap(), 2);
        assert_eq!(store.count(&RecordFilter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_unknown_record() {
        let store = InMemoryRecordStore::new();
        let record = store.insert(new_record("T1", "P1", Utc::now())).await.unwrap();
        store.delete_all().await.unwrap();

        assert!(matches!(store.update(&record).await, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_mysql_where_clause() {
        let (sql, binds) = MySqlRecordStore::where_clause(
            &RecordFilter::by_tag("T1").with_status(ParkingStatus::In),
        );
        assert_eq!(sql, "WHERE rfid_tag = ? AND status = ?");
        assert_eq!(binds, vec!["T1".to_string(), "in".to_string()]);

        let (sql, binds) = MySqlRecordStore::where_clause(&RecordFilter::all());
        assert!(sql.is_empty());
        assert!(binds.is_empty());
    }
}
