use crate::config::AppConfig;
use crate::shared::utils::DbPool;

/// Shared across every request handler; the pool is the only shared mutable
/// resource, the database itself being the single source of truth.
#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
}
