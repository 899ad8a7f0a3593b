//! PostgreSQL-backed `Store` implementation: connection pooling, task-local
//! transaction propagation, and the hand-rolled migration engine that backs
//! the `up`/`down`/`status`/`create` CLI surface.

pub mod config;
pub mod convert;
pub mod error;
pub mod migrations;
pub mod schema;
pub mod store;
pub mod tx;

use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;

use wfo_core::errors::{CoreError, CoreResult};

pub use config::DbConfig;
pub use error::PersistenceError;
pub use store::PgStore;
pub use tx::{with_transaction, PgPool};

/// Builds a pool from an already-resolved `DbConfig`. Does not run
/// migrations; callers invoke the `up` CLI subcommand (or
/// `migrations::run_migration` directly) before serving traffic.
pub fn build_pool(config: &DbConfig) -> CoreResult<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(&config.url);
    r2d2::Pool::builder()
        .min_idle(Some(config.min_connections))
        .max_size(config.max_connections)
        .connection_timeout(config.connection_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .build(manager)
        .map_err(|err| CoreError::StorageUnavailable(format!("pool build: {err}")))
}

/// Development convenience: loads `.env`, reads `DbConfig::from_env()`, and
/// builds an unmigrated pool.
pub fn build_pool_from_env() -> CoreResult<PgPool> {
    config::init_dotenv();
    let cfg = DbConfig::from_env();
    build_pool(&cfg)
}
