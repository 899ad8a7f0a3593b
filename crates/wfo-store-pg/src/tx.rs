//! Task-local transaction propagation. `with_transaction` threads an active
//! connection through nested `Store` calls made from within its closure, so
//! handlers never need to pass a connection explicitly.

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;
use std::cell::RefCell;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use wfo_core::errors::{CoreError, CoreResult};

use crate::error::PersistenceError;

pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type SharedConn = Arc<StdMutex<r2d2::PooledConnection<ConnectionManager<PgConnection>>>>;

tokio::task_local! {
    static TX_CONN: RefCell<Option<SharedConn>>;
}

/// The connection held by the innermost active `with_transaction`, if any.
/// `Store` methods check this before checking out a fresh pooled connection.
pub fn current_tx_conn() -> Option<SharedConn> {
    TX_CONN.try_with(|cell| cell.borrow().clone()).unwrap_or(None)
}

/// Runs `f` with a transactional connection available to every nested
/// `Store` call made from inside it. If a transaction is already active on
/// this task, `f` reuses it and issues no additional `BEGIN`/`COMMIT` — an
/// inner failure still rolls back the outer transaction, since there is only
/// ever one physical transaction per task.
pub async fn with_transaction<F, Fut, T>(pool: &PgPool, f: F) -> CoreResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    if current_tx_conn().is_some() {
        return f().await;
    }

    let pool = pool.clone();
    let conn = tokio::task::spawn_blocking(move || -> Result<_, PersistenceError> {
        let mut conn = pool.get()?;
        conn.batch_execute("BEGIN").map_err(PersistenceError::from)?;
        Ok(conn)
    })
    .await
    .map_err(|e| CoreError::Internal(e.to_string()))?
    .map_err(CoreError::from)?;

    let shared: SharedConn = Arc::new(StdMutex::new(conn));
    let result = TX_CONN.scope(RefCell::new(Some(shared.clone())), f()).await;

    let succeeded = result.is_ok();
    let finish = tokio::task::spawn_blocking(move || {
        let mut conn = shared.lock().expect("tx connection mutex poisoned");
        if succeeded {
            conn.batch_execute("COMMIT")
        } else {
            let rollback = conn.batch_execute("ROLLBACK");
            if let Err(err) = &rollback {
                tracing::error!(error = %err, "rollback failed; original error is still surfaced");
            }
            Ok(())
        }
    })
    .await;

    match finish {
        Err(join_err) => Err(CoreError::Internal(join_err.to_string())),
        Ok(Err(commit_err)) if succeeded => Err(PersistenceError::from(commit_err).into()),
        Ok(_) => result,
    }
}
