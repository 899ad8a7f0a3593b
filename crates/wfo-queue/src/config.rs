//! `max_concurrent` resolution from the environment.

use wfo_core::constants::DEFAULT_MAX_CONCURRENT;

/// `WORKER_CONCURRENCY` is checked before `NOFX_WORKER_CONCURRENCY`; the
/// first present, parseable, positive value wins. Falls back to
/// `DEFAULT_MAX_CONCURRENT` (4), clamped to a minimum of 1.
pub fn max_concurrent_from_env() -> usize {
    for var in ["WORKER_CONCURRENCY", "NOFX_WORKER_CONCURRENCY"] {
        if let Ok(raw) = std::env::var(var) {
            if let Ok(parsed) = raw.trim().parse::<usize>() {
                return parsed.max(1);
            }
        }
    }
    DEFAULT_MAX_CONCURRENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("WORKER_CONCURRENCY");
        std::env::remove_var("NOFX_WORKER_CONCURRENCY");
        assert_eq!(max_concurrent_from_env(), DEFAULT_MAX_CONCURRENT);
    }

    #[test]
    fn worker_concurrency_wins_over_nofx_variant() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("WORKER_CONCURRENCY", "7");
        std::env::set_var("NOFX_WORKER_CONCURRENCY", "2");
        assert_eq!(max_concurrent_from_env(), 7);
        std::env::remove_var("WORKER_CONCURRENCY");
        std::env::remove_var("NOFX_WORKER_CONCURRENCY");
    }

    #[test]
    fn falls_back_to_nofx_variant() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("WORKER_CONCURRENCY");
        std::env::set_var("NOFX_WORKER_CONCURRENCY", "3");
        assert_eq!(max_concurrent_from_env(), 3);
        std::env::remove_var("NOFX_WORKER_CONCURRENCY");
    }

    #[test]
    fn zero_clamped_to_minimum_one() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("WORKER_CONCURRENCY", "0");
        assert_eq!(max_concurrent_from_env(), 1);
        std::env::remove_var("WORKER_CONCURRENCY");
    }
}
