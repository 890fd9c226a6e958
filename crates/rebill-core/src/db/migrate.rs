//! Database migration system
//!
//! Runs embedded SQL migrations on startup and tracks applied versions.

use sqlx::{PgPool, Row};
use tracing::{error, info};

use crate::{Error, Result};

/// Migration record tracking applied migrations
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
}

/// Database migration manager
pub struct Migrator {
    pool: PgPool,
}

impl Migrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn init_migration_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn get_applied_migrations(&self) -> Result<Vec<Migration>> {
        let rows = sqlx::query(r#"SELECT version, name, applied_at FROM _migrations ORDER BY version"#)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let migrations = rows
            .into_iter()
            .map(|row| Migration {
                version: row.get("version"),
                name: row.get("name"),
                applied_at: row.get("applied_at"),
            })
            .collect();

        Ok(migrations)
    }

    async fn record_migration(&self, version: i64, name: &str) -> Result<()> {
        sqlx::query(r#"INSERT INTO _migrations (version, name) VALUES ($1, $2) ON CONFLICT DO NOTHING"#)
            .bind(version)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(())
    }

    /// Run all pending migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Initializing migration system...");
        self.init_migration_table().await?;

        let applied = self.get_applied_migrations().await?;
        info!("Found {} applied migrations", applied.len());

        let migrations = vec![(
            1,
            "initial_schema",
            include_str!("../../migrations/001_initial_schema.sql"),
        )];

        for (version, name, sql) in migrations {
            if applied.iter().any(|m| m.version == version) {
                info!("Migration {} ({}) already applied, skipping", version, name);
                continue;
            }

            info!("Applying migration {} ({})...", version, name);

            // Execute the migration SQL as a single batch; splitting on
            // semicolons breaks DO blocks.
            sqlx::raw_sql(sql).execute(&self.pool).await.map_err(|e| {
                error!("Failed to execute migration {}: {}", version, e);
                Error::Database(e)
            })?;

            self.record_migration(version, name).await?;
            info!("Migration {} applied", version);
        }

        Ok(())
    }
}
