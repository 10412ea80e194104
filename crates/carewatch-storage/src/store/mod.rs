use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

use crate::error::Result;

pub mod alert;

/// Unified access layer for the alerts database.
///
/// All methods are `async fn`; SeaORM underneath, SQLite by default. The
/// partial unique index created by the migrations is what enforces the
/// one-open-alert-per-(patient, rule) invariant.
pub struct AlertStore {
    pub(crate) db: DatabaseConnection,
}

impl AlertStore {
    /// Connect and initialize the alerts database.
    ///
    /// `db_url` is a full connection URL supplied by the caller, e.g.
    /// `sqlite:///data/carewatch.db?mode=rwc` or `sqlite::memory:`.
    /// Runs all pending migrations so the schema is current.
    pub async fn connect(db_url: &str) -> Result<Self> {
        let db = Database::connect(db_url).await?;

        // WAL mode only applies to file-backed SQLite
        if db_url.starts_with("sqlite://") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;

        tracing::info!(db_url = %db_url, "Initialized alert store");
        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}
