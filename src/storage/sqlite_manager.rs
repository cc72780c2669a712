use async_trait::async_trait;
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::history::History;
use super::migrations::DatabaseMigrations;
use super::sink::{FallbackLevel, ReadingSink, WriteOutcome};
use crate::devices::reading::{parse_date, parse_timestamp, Reading, DATE_FORMAT};
use crate::utils::error::CondensateError;

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_readings: i64,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub database_size_bytes: u64,
}

/// Optional second home for readings, mirroring the CSV log.
#[derive(Clone)]
pub struct SqliteManager {
    pool: SqlitePool,
    database_path: PathBuf,
    destination: String,
}

impl SqliteManager {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self, CondensateError> {
        let database_path = database_path.as_ref().to_path_buf();
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("🗄️  Initializing SQLite database: {}", database_path.display());

        let options = SqliteConnectOptions::new()
            .filename(&database_path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30))
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        DatabaseMigrations::run_migrations(&pool).await?;

        info!("✅ SQLite database ready");
        Ok(Self {
            pool,
            destination: database_path.display().to_string(),
            database_path,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns `false` when an identical reading is already stored.
    pub async fn insert_reading(&self, reading: &Reading) -> Result<bool, CondensateError> {
        let result = bind_reading(
            sqlx::query(
                "INSERT OR IGNORE INTO readings (timestamp, reading_date, conductivity, unit, temperature, device) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            ),
            reading,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_batch(&self, readings: &[Reading]) -> Result<usize, CondensateError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for reading in readings {
            let result = bind_reading(
                sqlx::query(
                    "INSERT OR IGNORE INTO readings (timestamp, reading_date, conductivity, unit, temperature, device) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                ),
                reading,
            )
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        info!("💾 Inserted {} readings into SQLite", inserted);
        Ok(inserted)
    }

    pub async fn readings_for_date(&self, date: NaiveDate) -> Result<Vec<Reading>, CondensateError> {
        let rows = sqlx::query(
            "SELECT timestamp, conductivity, unit, temperature, device FROM readings \
             WHERE reading_date = ? ORDER BY timestamp",
        )
        .bind(date.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(|row| match row_to_reading(row) {
            Ok(reading) => Some(reading),
            Err(e) => {
                warn!("⚠️  Skipping unreadable row: {}", e);
                None
            }
        }).collect())
    }

    pub async fn available_dates(&self) -> Result<Vec<NaiveDate>, CondensateError> {
        let dates: Vec<String> = sqlx::query_scalar("SELECT DISTINCT reading_date FROM readings ORDER BY reading_date")
            .fetch_all(&self.pool)
            .await?;
        Ok(dates.iter().filter_map(|d| parse_date(d).ok()).collect())
    }

    pub async fn count(&self) -> Result<i64, CondensateError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn stats(&self) -> Result<DatabaseStats, CondensateError> {
        let row = sqlx::query("SELECT COUNT(*) AS total, MIN(timestamp) AS first, MAX(timestamp) AS last FROM readings")
            .fetch_one(&self.pool)
            .await?;
        let database_size_bytes = std::fs::metadata(&self.database_path).map(|m| m.len()).unwrap_or(0);

        Ok(DatabaseStats {
            total_readings: row.try_get("total")?,
            first_timestamp: row.try_get("first")?,
            last_timestamp: row.try_get("last")?,
            database_size_bytes,
        })
    }

    /// Copies every reading in the CSV history into the database.
    pub async fn import_history(&self, history: &History) -> Result<usize, CondensateError> {
        let readings = history.all()?;
        info!("🔄 Migrating {} CSV readings into SQLite", readings.len());
        self.insert_batch(&readings).await
    }

    pub async fn close(&self) {
        info!("🔒 Closing SQLite database connections");
        self.pool.close().await;
    }
}

fn bind_reading<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    reading: &Reading,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(reading.timestamp_string())
        .bind(reading.date().format(DATE_FORMAT).to_string())
        .bind(reading.conductivity)
        .bind(reading.unit.as_str())
        .bind(reading.temperature)
        .bind(reading.source.clone())
}

fn row_to_reading(row: &SqliteRow) -> Result<Reading, CondensateError> {
    let timestamp: String = row.try_get("timestamp")?;
    let unit: String = row.try_get("unit")?;
    let device: String = row.try_get("device")?;
    Ok(Reading::new(
        parse_timestamp(&timestamp)?,
        row.try_get("conductivity")?,
        unit.parse()?,
        row.try_get("temperature")?,
        device,
    ))
}

#[async_trait]
impl ReadingSink for SqliteManager {
    async fn record(&self, reading: &Reading) -> Result<WriteOutcome, CondensateError> {
        self.insert_reading(reading).await?;
        Ok(WriteOutcome {
            path: self.database_path.clone(),
            level: FallbackLevel::Configured,
        })
    }

    fn sink_type(&self) -> &str {
        "sqlite"
    }

    fn destination(&self) -> &str {
        &self.destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::reading::ConductivityUnit;
    use std::fs;
    use tempfile::tempdir;

    fn reading(ts: &str, value: f64) -> Reading {
        Reading::new(parse_timestamp(ts).unwrap(), value, ConductivityUnit::MicroSiemensPerCm, Some(21.0), "HACH Sension7")
    }

    #[tokio::test]
    async fn stores_and_reads_back_by_date() {
        let dir = tempdir().unwrap();
        let db = SqliteManager::new(dir.path().join("data").join("test.db")).await.unwrap();

        db.record(&reading("2024-06-01 10:00:00", 120.0)).await.unwrap();
        db.record(&reading("2024-06-02 09:00:00", 130.0)).await.unwrap();
        assert!(!db.insert_reading(&reading("2024-06-02 09:00:00", 130.0)).await.unwrap());

        let day = db.readings_for_date(parse_date("2024-06-02").unwrap()).await.unwrap();
        assert_eq!(day, vec![reading("2024-06-02 09:00:00", 130.0)]);
        assert_eq!(db.available_dates().await.unwrap().len(), 2);
        assert_eq!(db.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn migrations_are_recorded_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = SqliteManager::new(&path).await.unwrap();
        DatabaseMigrations::run_migrations(db.pool()).await.unwrap();
        assert_eq!(DatabaseMigrations::applied_versions(db.pool()).await.unwrap(), vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn imports_csv_history() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("condensate_2024-06-01.csv"),
            "Timestamp,Conductivity,Unit,Temperature,Device\n\
             2024-06-01 09:00:00,150.0,uS/cm,22.0,Mock\n\
             2024-06-01 11:00:00,160.0,uS/cm,22.5,Mock\n",
        )
        .unwrap();
        let history = History::new(vec![dir.path().to_path_buf()], "condensate").unwrap();
        let db = SqliteManager::new(dir.path().join("test.db")).await.unwrap();

        assert_eq!(db.import_history(&history).await.unwrap(), 2);
        assert_eq!(db.import_history(&history).await.unwrap(), 0);
        assert_eq!(db.stats().await.unwrap().total_readings, 2);
    }
}
