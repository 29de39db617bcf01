use cloudspend::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const TEST_KEY_B64: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    let keys: Vec<String> = env::vars()
        .map(|(key, _)| key)
        .filter(|key| key.starts_with("CLOUDSPEND_"))
        .collect();
    unsafe {
        for key in keys {
            env::remove_var(key);
        }
    }
}

fn set_required_env() {
    unsafe {
        env::set_var("CLOUDSPEND_CRYPTO_KEY", TEST_KEY_B64);
        env::set_var("CLOUDSPEND_OPERATOR_TOKEN", "test-token");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

fn loader_for(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::with_base_dir(PathBuf::from(dir.path()))
}

#[test]
fn loads_defaults_when_only_secrets_present() {
    let _guard = env_guard();
    clear_env();
    set_required_env();

    let temp_dir = TempDir::new().unwrap();
    let cfg = loader_for(&temp_dir)
        .load()
        .expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.default_currency, "RUB");
    assert_eq!(cfg.operator_tokens, vec!["test-token".to_string()]);
    assert_eq!(cfg.crypto_key.as_ref().map(Vec::len), Some(32));
    assert!(!cfg.scheduler.bulk_sync_enabled);
    assert_eq!(cfg.scheduler.bulk_sync_interval_seconds, 86400);
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "CLOUDSPEND_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "CLOUDSPEND_API_BIND_ADDR=192.168.0.10:5000\nCLOUDSPEND_DEFAULT_CURRENCY=usd\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "CLOUDSPEND_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        &format!(
            "CLOUDSPEND_PROFILE=test\nCLOUDSPEND_API_BIND_ADDR=127.0.0.1:4000\nCLOUDSPEND_OPERATOR_TOKENS=\"alpha, beta\"\nCLOUDSPEND_CRYPTO_KEY={TEST_KEY_B64}\n"
        ),
    );

    let cfg = loader_for(&temp_dir)
        .load()
        .expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.default_currency, "USD");
    assert_eq!(
        cfg.operator_tokens,
        vec!["alpha".to_string(), "beta".to_string()]
    );
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "CLOUDSPEND_API_BIND_ADDR=127.0.0.1:3000\nCLOUDSPEND_BULK_SYNC_ENABLED=false\n",
    );

    set_required_env();
    unsafe {
        env::set_var("CLOUDSPEND_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("CLOUDSPEND_BULK_SYNC_ENABLED", "true");
    }

    let cfg = loader_for(&temp_dir)
        .load()
        .expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert!(cfg.scheduler.bulk_sync_enabled);

    clear_env();
}

#[test]
fn retry_overrides_apply_per_provider() {
    let _guard = env_guard();
    clear_env();
    set_required_env();
    unsafe {
        env::set_var("CLOUDSPEND_RETRY_BASE_SECONDS", "3");
        env::set_var("CLOUDSPEND_RETRY_OVERRIDE_YANDEX_BASE_SECONDS", "5");
        env::set_var("CLOUDSPEND_RETRY_OVERRIDE_YANDEX_MAX_SECONDS", "120");
    }

    let temp_dir = TempDir::new().unwrap();
    let cfg = loader_for(&temp_dir).load().expect("config loads");

    let yandex = cfg.retry_policy.for_provider("yandex");
    assert_eq!(yandex.base_seconds, 5);
    assert_eq!(yandex.max_seconds, 120);
    assert_eq!(yandex.jitter_factor, 0.1);

    let selectel = cfg.retry_policy.for_provider("selectel");
    assert_eq!(selectel.base_seconds, 3);
    assert_eq!(selectel.max_seconds, 60);

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();
    set_required_env();
    unsafe {
        env::set_var("CLOUDSPEND_API_BIND_ADDR", "not-an-addr");
    }

    let temp_dir = TempDir::new().unwrap();
    let err = loader_for(&temp_dir)
        .load()
        .expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn missing_crypto_key_is_rejected() {
    let _guard = env_guard();
    clear_env();
    unsafe {
        env::set_var("CLOUDSPEND_OPERATOR_TOKEN", "test-token");
    }

    let temp_dir = TempDir::new().unwrap();
    let err = loader_for(&temp_dir)
        .load()
        .expect_err("missing key should fail");
    assert!(matches!(err, ConfigError::MissingCryptoKey));

    clear_env();
}

#[test]
fn malformed_crypto_key_is_rejected() {
    let _guard = env_guard();
    clear_env();
    set_required_env();
    unsafe {
        env::set_var("CLOUDSPEND_CRYPTO_KEY", "not base64!");
    }

    let temp_dir = TempDir::new().unwrap();
    let err = loader_for(&temp_dir)
        .load()
        .expect_err("bad key should fail");
    assert!(matches!(err, ConfigError::InvalidCryptoKeyBase64 { .. }));

    clear_env();
}
