use async_trait::async_trait;
use sqlx::PgPool;

/// Runs one migration script verbatim.
///
/// The script may hold several statements; implementations must not split it
/// or wrap it in a transaction.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Returns the number of rows affected across all statements.
    async fn execute_script(&self, sql: &str) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl ScriptExecutor for PgPool {
    async fn execute_script(&self, sql: &str) -> Result<u64, sqlx::Error> {
        let done = sqlx::raw_sql(sql).execute(self).await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl<E: ScriptExecutor + ?Sized> ScriptExecutor for &E {
    async fn execute_script(&self, sql: &str) -> Result<u64, sqlx::Error> {
        (**self).execute_script(sql).await
    }
}
