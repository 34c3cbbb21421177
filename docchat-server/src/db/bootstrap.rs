use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
enum ScriptStage {
    Schema,
    Indexes,
}

impl ScriptStage {
    fn label(self) -> &'static str {
        match self {
            ScriptStage::Schema => "schema",
            ScriptStage::Indexes => "indexes",
        }
    }
}

impl std::fmt::Display for ScriptStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Bootstrap scripts in execution order. Every statement is idempotent.
const SCRIPTS: &[(ScriptStage, &str, &str)] = &[
    (
        ScriptStage::Schema,
        "001_chats.sql",
        include_str!("../../sql/schema/001_chats.sql"),
    ),
    (
        ScriptStage::Schema,
        "002_documents.sql",
        include_str!("../../sql/schema/002_documents.sql"),
    ),
    (
        ScriptStage::Indexes,
        "001_lookup.sql",
        include_str!("../../sql/indexes/001_lookup.sql"),
    ),
];

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database error executing {stage} script {script}: {source}")]
    Sql {
        stage: &'static str,
        script: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Execute all bootstrap SQL scripts in order, each inside its own transaction.
pub async fn run(pool: &PgPool) -> Result<(), BootstrapError> {
    info!(scripts = SCRIPTS.len(), "running database bootstrap");

    for (stage, script, sql) in SCRIPTS {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            warn!(%stage, script, "skipping empty bootstrap script");
            continue;
        }
        apply_script(pool, *stage, script, trimmed).await?;
    }

    Ok(())
}

/// Simple liveness check used during startup.
pub async fn ensure_liveness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Readiness probe that expects the bootstrapped tables to exist.
pub async fn ensure_readiness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1 FROM chats LIMIT 1")
        .execute(pool)
        .await
        .map(|_| ())
}

async fn apply_script(
    pool: &PgPool,
    stage: ScriptStage,
    script: &'static str,
    sql: &'static str,
) -> Result<(), BootstrapError> {
    let to_error = |source| BootstrapError::Sql {
        stage: stage.label(),
        script,
        source,
    };

    let mut transaction = pool.begin().await.map_err(to_error)?;

    info!(%stage, script, "executing bootstrap script");
    sqlx::raw_sql(sql)
        .execute(&mut *transaction)
        .await
        .map_err(to_error)?;

    transaction.commit().await.map_err(to_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_runs_before_indexes() {
        let first_index = SCRIPTS
            .iter()
            .position(|(stage, _, _)| matches!(stage, ScriptStage::Indexes))
            .unwrap();

        assert!(
            SCRIPTS[..first_index]
                .iter()
                .all(|(stage, _, _)| matches!(stage, ScriptStage::Schema))
        );
    }

    #[test]
    fn scripts_are_idempotent() {
        for (_, script, sql) in SCRIPTS {
            for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                assert!(
                    statement.contains("IF NOT EXISTS"),
                    "{script}: statement is not idempotent: {statement}"
                );
            }
        }
    }
}
