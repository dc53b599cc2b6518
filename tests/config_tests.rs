//! Tests for layered configuration loading.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use paiprog::config::{PaiprogConfig, CONFIG_FILE_NAME};
use paiprog::error::PaiprogError;
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 4] = [
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "PAIPROG_POLL_INTERVAL_MS",
    "PAIPROG_HOME",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clear_env() {
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
}

#[test]
fn load_reads_env_over_file() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_env();

    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "model = \"gpt-3.5-turbo\"\npoll_interval_ms = 2000\n",
    )
    .unwrap();
    std::env::set_var("OPENAI_API_KEY", "sk-env");
    std::env::set_var("OPENAI_BASE_URL", "http://localhost:9999/v1");
    std::env::set_var("PAIPROG_POLL_INTERVAL_MS", "50");
    std::env::set_var("PAIPROG_HOME", dir.path());

    let config = PaiprogConfig::load(dir.path()).unwrap();

    assert_eq!(config.require_api_key().unwrap(), "sk-env");
    assert_eq!(config.base_url.as_deref(), Some("http://localhost:9999/v1"));
    assert_eq!(config.assistant.model, "gpt-3.5-turbo");
    assert_eq!(config.poll_interval, Duration::from_millis(50));
    assert_eq!(config.home_dir, PathBuf::from(dir.path()));
    assert_eq!(config.assistant_cache_dir(), dir.path().join("assistants"));
}

#[test]
fn load_without_file_or_key_uses_defaults() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_env();

    let dir = TempDir::new().unwrap();
    let config = PaiprogConfig::load(dir.path()).unwrap();

    assert_eq!(config.assistant.name, "baseAssistant");
    assert_eq!(config.poll_interval, Duration::from_secs(1));
    assert!(config.base_url.is_none());
    assert!(matches!(
        config.require_api_key(),
        Err(PaiprogError::Configuration(_))
    ));
}

#[test]
fn malformed_file_is_a_configuration_error() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_env();

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "model = [").unwrap();

    assert!(matches!(
        PaiprogConfig::load(dir.path()),
        Err(PaiprogError::Configuration(_))
    ));
}
