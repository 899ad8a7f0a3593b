//! Connection configuration loaded from environment variables, matching the
//! table in the external-interfaces section: serverless detection, pool
//! sizing, and timeouts.

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub idle_timeout: Duration,
    pub connection_timeout: Duration,
    pub statement_timeout: Duration,
    pub log_all: bool,
}

fn is_serverless() -> bool {
    env::var("VERCEL").is_ok() || env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok()
}

/// `NODE_ENV=test` caps the pool at a small, fixed size regardless of
/// `DB_POOL_SIZE` — tests that open many short-lived pools (one per test
/// module) should not each reserve ten connections. Any other value (or
/// absence) is treated as "production-shaped" sizing. The source's other
/// `NODE_ENV`-gated behavior ("test registration") is a JS test-framework
/// hook with no Rust equivalent and isn't carried forward.
fn is_test_env() -> bool {
    env::var("NODE_ENV").as_deref() == Ok("test")
}

impl DbConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").expect("DATABASE_URL not set");
        validate_pooled_endpoint(&url);

        let serverless = is_serverless();
        let max_connections = if serverless {
            1
        } else if is_test_env() {
            env::var("DB_POOL_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(2).clamp(1, 4)
        } else {
            env::var("DB_POOL_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(10).max(2)
        };
        let min_connections = if serverless { 1 } else { 2.min(max_connections) };
        let idle_timeout_ms = if serverless { 10_000 } else { 600_000 };

        Self {
            url,
            min_connections,
            max_connections,
            idle_timeout: Duration::from_millis(idle_timeout_ms),
            connection_timeout: Duration::from_millis(5_000),
            statement_timeout: Duration::from_millis(30_000),
            log_all: env::var("DB_LOG_ALL").as_deref() == Ok("1"),
        }
    }
}

/// Informational-only check; a non-pooled-looking endpoint is logged, never
/// rejected.
fn validate_pooled_endpoint(url: &str) {
    if !url.contains("pooler") && !url.contains("pgbouncer") && !url.contains("localhost") && !url.contains("127.0.0.1")
    {
        tracing::warn!("DATABASE_URL does not look like a pooled endpoint; verify this is intentional");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _guard = ENV_LOCK.lock().unwrap();
        for (k, v) in vars {
            env::set_var(k, v);
        }
        f();
        for (k, _) in vars {
            env::remove_var(k);
        }
    }

    #[test]
    fn test_env_caps_pool_below_production_default() {
        with_env(&[("DATABASE_URL", "postgres://localhost/wfo"), ("NODE_ENV", "test")], || {
            let cfg = DbConfig::from_env();
            assert!(cfg.max_connections <= 4);
        });
    }

    #[test]
    fn production_env_keeps_default_pool_size() {
        with_env(&[("DATABASE_URL", "postgres://localhost/wfo")], || {
            let cfg = DbConfig::from_env();
            assert_eq!(cfg.max_connections, 10);
        });
    }

    #[test]
    fn serverless_hint_overrides_everything_else() {
        with_env(&[("DATABASE_URL", "postgres://localhost/wfo"), ("VERCEL", "1"), ("DB_POOL_SIZE", "20")], || {
            let cfg = DbConfig::from_env();
            assert_eq!(cfg.max_connections, 1);
            assert_eq!(cfg.min_connections, 1);
        });
    }
}
