//! Process-level factory selecting which `Store`/`Queue` implementation to
//! wire up, driven by `DATA_DRIVER`/`QUEUE_DRIVER` (spec.md §6). No
//! reflection: two concrete `Store` types and one concrete `Queue` type are
//! known to this binary ahead of time; the factory just picks between them.

use std::sync::Arc;

use wfo_core::queue::Queue;
use wfo_core::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDriver {
    Db,
    Fs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDriver {
    Memory,
}

/// `QUEUE_DRIVER` is read first since `DATA_DRIVER`'s own default depends on
/// it ("fs when queue is memory", spec.md §6). Only `memory` is compiled
/// into this binary; any other value names a broker backend this workspace
/// does not implement, so the caller should treat it as a hard error rather
/// than silently falling back.
pub fn queue_driver_from_env() -> Result<QueueDriver, String> {
    match std::env::var("QUEUE_DRIVER") {
        Ok(v) if v.eq_ignore_ascii_case("memory") => Ok(QueueDriver::Memory),
        Ok(v) => Err(format!("QUEUE_DRIVER={v:?} names a broker backend not compiled into this binary; only \"memory\" is available")),
        Err(_) => Ok(QueueDriver::Memory),
    }
}

/// Defaults to `fs` when the selected queue driver is `memory` (the common
/// local/dev pairing); otherwise defaults to `db`. `DATA_DRIVER`, when set,
/// always wins.
pub fn data_driver_from_env(queue_driver: QueueDriver) -> Result<DataDriver, String> {
    match std::env::var("DATA_DRIVER") {
        Ok(v) if v.eq_ignore_ascii_case("db") => Ok(DataDriver::Db),
        Ok(v) if v.eq_ignore_ascii_case("fs") => Ok(DataDriver::Fs),
        Ok(v) => Err(format!("DATA_DRIVER={v:?} is not one of \"db\", \"fs\"")),
        Err(_) => Ok(match queue_driver {
            QueueDriver::Memory => DataDriver::Fs,
        }),
    }
}

pub fn build_queue(driver: QueueDriver, metrics: Arc<dyn wfo_core::metrics::MetricSink>) -> Arc<dyn Queue> {
    match driver {
        QueueDriver::Memory => Arc::new(wfo_queue::InMemoryQueue::new(wfo_queue::config::max_concurrent_from_env(), metrics)),
    }
}

#[cfg(feature = "pg_demo")]
pub async fn build_store(driver: DataDriver) -> anyhow::Result<Arc<dyn Store>> {
    match driver {
        DataDriver::Fs => {
            let root = wfo_store_fs::default_root();
            Ok(Arc::new(wfo_store_fs::FsStore::open(&root)?))
        }
        DataDriver::Db => {
            let pool = wfo_store_pg::build_pool_from_env()?;
            Ok(Arc::new(wfo_store_pg::PgStore::new(pool)))
        }
    }
}

#[cfg(not(feature = "pg_demo"))]
pub async fn build_store(driver: DataDriver) -> anyhow::Result<Arc<dyn Store>> {
    match driver {
        DataDriver::Fs => {
            let root = wfo_store_fs::default_root();
            Ok(Arc::new(wfo_store_fs::FsStore::open(&root)?))
        }
        DataDriver::Db => {
            anyhow::bail!("DATA_DRIVER=db requires rebuilding with --features pg_demo")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn queue_driver_defaults_to_memory() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("QUEUE_DRIVER");
        assert_eq!(queue_driver_from_env().unwrap(), QueueDriver::Memory);
    }

    #[test]
    fn queue_driver_rejects_unknown_broker_name() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("QUEUE_DRIVER", "sqs");
        assert!(queue_driver_from_env().is_err());
        std::env::remove_var("QUEUE_DRIVER");
    }

    #[test]
    fn data_driver_defaults_to_fs_when_queue_is_memory() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("DATA_DRIVER");
        assert_eq!(data_driver_from_env(QueueDriver::Memory).unwrap(), DataDriver::Fs);
    }

    #[test]
    fn data_driver_override_wins_regardless_of_queue_driver() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DATA_DRIVER", "db");
        assert_eq!(data_driver_from_env(QueueDriver::Memory).unwrap(), DataDriver::Db);
        std::env::remove_var("DATA_DRIVER");
    }

    #[test]
    fn data_driver_rejects_unknown_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DATA_DRIVER", "redis");
        assert!(data_driver_from_env(QueueDriver::Memory).is_err());
        std::env::remove_var("DATA_DRIVER");
    }
}
