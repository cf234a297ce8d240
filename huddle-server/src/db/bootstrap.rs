//! Startup schema management.
//!
//! Scripts live under `<bootstrap_path>/<stage>/*.sql`. Stages run in a fixed
//! order and scripts within a stage in filename order. Every applied script
//! is recorded in `huddle.bootstrap_scripts` inside the same transaction, so a
//! restart only applies what is new.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use shared::config::server::DatabaseConfig;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Schema,
    Indexes,
}

impl Stage {
    pub const ALL: [Self; 2] = [Self::Schema, Self::Indexes];

    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Indexes => "indexes",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bootstrap directory {0} does not exist")]
    MissingRoot(PathBuf),
    #[error("bootstrap stage '{stage}' has no directory at {path}")]
    MissingStage { stage: Stage, path: PathBuf },
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("script {script} failed: {source}")]
    Sql {
        script: String,
        #[source]
        source: sqlx::Error,
    },
}

/// One non-empty script, loaded and ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub stage: Stage,
    /// `<stage>/<file name>`; the key recorded once the script is applied.
    pub name: String,
    pub sql: String,
}

const LEDGER_SQL: &str = "CREATE SCHEMA IF NOT EXISTS huddle;
CREATE TABLE IF NOT EXISTS huddle.bootstrap_scripts (
    name TEXT PRIMARY KEY,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
);";

/// Loads every script under `root` in application order.
///
/// # Errors
/// Fails when `root` or a stage directory is missing or unreadable.
pub fn plan(root: &Path) -> Result<Vec<Script>, BootstrapError> {
    if !root.is_dir() {
        return Err(BootstrapError::MissingRoot(root.to_path_buf()));
    }

    let mut scripts = Vec::new();
    for stage in Stage::ALL {
        let dir = root.join(stage.dir_name());
        if !dir.is_dir() {
            return Err(BootstrapError::MissingStage { stage, path: dir });
        }

        for path in sql_files(&dir)? {
            let sql = fs::read_to_string(&path).map_err(|source| BootstrapError::Io {
                path: path.clone(),
                source,
            })?;
            let file_name = path.file_name().map(|name| name.to_string_lossy());
            let name = format!("{stage}/{}", file_name.unwrap_or_default());
            if sql.trim().is_empty() {
                warn!(script = %name, "skipping empty bootstrap script");
                continue;
            }
            scripts.push(Script {
                stage,
                name,
                sql: sql.trim().to_string(),
            });
        }
    }
    Ok(scripts)
}

fn sql_files(dir: &Path) -> Result<Vec<PathBuf>, BootstrapError> {
    let io_error = |source| BootstrapError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = fs::read_dir(dir)
        .map_err(io_error)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_error)?;
    files.retain(|path| {
        path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
    });
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Applies every script not yet recorded. Returns how many were applied.
///
/// # Errors
/// Fails on the first script that cannot be loaded or applied; earlier
/// scripts stay applied.
pub async fn run(pool: &PgPool, config: &DatabaseConfig) -> Result<usize, BootstrapError> {
    let scripts = plan(&config.bootstrap_path)?;
    info!(
        path = %config.bootstrap_path.display(),
        scripts = scripts.len(),
        "running database bootstrap"
    );

    sqlx::raw_sql(LEDGER_SQL)
        .execute(pool)
        .await
        .map_err(|source| BootstrapError::Sql {
            script: "bootstrap ledger".into(),
            source,
        })?;

    let mut applied = 0;
    for script in &scripts {
        if apply(pool, script).await? {
            applied += 1;
        }
    }
    info!(applied, "database bootstrap finished");
    Ok(applied)
}

async fn apply(pool: &PgPool, script: &Script) -> Result<bool, BootstrapError> {
    let failed = |source| BootstrapError::Sql {
        script: script.name.clone(),
        source,
    };

    let mut tx = pool.begin().await.map_err(failed)?;
    let seen: Option<(String,)> =
        sqlx::query_as("SELECT name FROM huddle.bootstrap_scripts WHERE name = $1")
            .bind(&script.name)
            .fetch_optional(&mut *tx)
            .await
            .map_err(failed)?;
    if seen.is_some() {
        debug!(script = %script.name, "already applied");
        return Ok(false);
    }

    info!(script = %script.name, "applying bootstrap script");
    sqlx::raw_sql(&script.sql)
        .execute(&mut *tx)
        .await
        .map_err(failed)?;
    sqlx::query("INSERT INTO huddle.bootstrap_scripts (name) VALUES ($1)")
        .bind(&script.name)
        .execute(&mut *tx)
        .await
        .map_err(failed)?;
    tx.commit().await.map_err(failed)?;
    Ok(true)
}

/// Startup liveness probe.
///
/// # Errors
/// Returns the driver error when the database is unreachable.
pub async fn ensure_liveness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Readiness probe: the message tables the store reads must exist.
///
/// # Errors
/// Returns the driver error when the tables are missing or unreachable.
pub async fn ensure_readiness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1 FROM huddle.messages, huddle.direct_messages LIMIT 1")
        .execute(pool)
        .await
        .map(|_| ())
}
