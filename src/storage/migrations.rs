use log::info;
use sqlx::SqlitePool;

use crate::utils::error::CondensateError;

pub struct DatabaseMigrations;

impl DatabaseMigrations {
    pub async fn run_migrations(pool: &SqlitePool) -> Result<(), CondensateError> {
        info!("🔄 Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS migrations (
                id INTEGER PRIMARY KEY,
                version TEXT NOT NULL UNIQUE,
                applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#,
        )
        .execute(pool)
        .await?;

        Self::apply(pool, "v1", "Create readings table", &[
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                reading_date TEXT NOT NULL,
                conductivity REAL NOT NULL,
                unit TEXT NOT NULL,
                temperature REAL,
                device TEXT NOT NULL
            )
            "#,
        ])
        .await?;

        Self::apply(pool, "v2", "Add reading indexes", &[
            "CREATE INDEX IF NOT EXISTS idx_readings_date ON readings(reading_date)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_readings_unique ON readings(timestamp, device, conductivity, unit)",
        ])
        .await?;

        info!("✅ All migrations completed");
        Ok(())
    }

    pub async fn applied_versions(pool: &SqlitePool) -> Result<Vec<String>, CondensateError> {
        let versions: Vec<String> = sqlx::query_scalar("SELECT version FROM migrations ORDER BY id")
            .fetch_all(pool)
            .await?;
        Ok(versions)
    }

    async fn apply(
        pool: &SqlitePool,
        version: &str,
        description: &str,
        statements: &[&str],
    ) -> Result<(), CondensateError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM migrations WHERE version = ?)")
            .bind(version)
            .fetch_one(pool)
            .await?;
        if exists {
            return Ok(());
        }

        info!("📦 Applying migration {}: {}", version, description);
        let mut tx = pool.begin().await?;
        for statement in statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO migrations (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
