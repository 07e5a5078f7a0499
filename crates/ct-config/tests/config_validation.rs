//! Configuration validation + resolution tests against real JSON fixtures.
//!
//! Covers:
//! - Policy and action space validation
//! - Resolution order (CLI > env > config dir > XDG)
//! - Missing configuration is an error, never a default

use ct_config::resolve::{resolve_config, ConfigSource};
use ct_config::validate::{validate_action_space, validate_policy, ValidationError};
use ct_config::{epoch_hash, load_config, ActionSpaceConfig, PolicyConfig, StrategyConfig};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const ENV_KEYS: &[&str] = &[
    "CHRONO_POLICY",
    "CHRONO_ACTIONS",
    "CHRONO_CONFIG_DIR",
    "XDG_CONFIG_HOME",
];

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn load_policy_fixture(name: &str) -> PolicyConfig {
    PolicyConfig::from_file(&fixtures_dir().join(name)).expect("read policy fixture")
}

fn load_actions_fixture(name: &str) -> ActionSpaceConfig {
    ActionSpaceConfig::from_file(&fixtures_dir().join(name)).expect("read actions fixture")
}

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        Self {
            saved: keys
                .iter()
                .map(|k| (k.to_string(), env::var(k).ok()))
                .collect(),
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env lock poisoned");
    f()
}

fn write_config_dir(dir: &Path) {
    fs::create_dir_all(dir).expect("create config dir");
    fs::copy(
        fixtures_dir().join("valid_policy.json"),
        dir.join("policy.json"),
    )
    .expect("copy policy");
    fs::copy(
        fixtures_dir().join("valid_actions.json"),
        dir.join("actions.json"),
    )
    .expect("copy actions");
}

fn isolate_env(temp: &TempDir) {
    for key in ENV_KEYS {
        env::remove_var(key);
    }
    let xdg = temp.path().join("xdg-empty");
    fs::create_dir_all(&xdg).expect("create xdg");
    env::set_var("XDG_CONFIG_HOME", xdg.display().to_string());
}

#[test]
fn test_validate_policy_fixture_ok() {
    let policy = load_policy_fixture("valid_policy.json");
    validate_policy(&policy).expect("valid policy should pass validation");
    assert_eq!(policy.strategy, StrategyConfig::Ucb { alpha: 1.0 });
}

#[test]
fn test_validate_thompson_fixture_ok() {
    let policy = load_policy_fixture("thompson_policy.json");
    validate_policy(&policy).expect("thompson policy should pass validation");
    assert_eq!(policy.strategy.name(), "thompson");
}

#[test]
fn test_validate_policy_rejects_bad_alpha() {
    let policy = load_policy_fixture("invalid_policy_bad_alpha.json");
    let err = validate_policy(&policy).expect_err("negative alpha should fail validation");
    assert!(matches!(err, ValidationError::InvalidValue { .. }));
}

#[test]
fn test_missing_cap_fails_to_parse() {
    let err = PolicyConfig::from_file(&fixtures_dir().join("invalid_policy_missing_cap.json"))
        .expect_err("exploration cap is required");
    assert!(matches!(err, ValidationError::ParseError(_)));
    assert!(err.to_string().contains("exploration_cap_hours"));
}

#[test]
fn test_validate_actions_fixture_ok() {
    let actions = load_actions_fixture("valid_actions.json");
    validate_action_space(&actions).expect("valid actions should pass validation");
    assert_eq!(actions.n_bins, 12);
    assert_eq!(actions.drugs.len(), 3);
}

#[test]
fn test_validate_actions_rejects_overlong_layout() {
    let actions = load_actions_fixture("invalid_actions_overlong.json");
    let err = validate_action_space(&actions).expect_err("36 hours of bins should fail");
    assert!(matches!(err, ValidationError::SemanticError(_)));
}

#[test]
fn test_resolve_config_cli_over_env() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        isolate_env(&temp);

        let cli_dir = temp.path().join("cli");
        let env_dir = temp.path().join("env");
        write_config_dir(&cli_dir);
        write_config_dir(&env_dir);

        env::set_var(
            "CHRONO_POLICY",
            env_dir.join("policy.json").display().to_string(),
        );
        env::set_var("CHRONO_CONFIG_DIR", env_dir.display().to_string());

        let cli_policy = cli_dir.join("policy.json");
        let paths = resolve_config(Some(&cli_policy), None);

        assert_eq!(paths.policy_source, ConfigSource::CliArgument);
        assert_eq!(paths.policy.unwrap(), cli_policy);
        assert_eq!(paths.actions_source, ConfigSource::Environment);
        assert_eq!(paths.actions.unwrap(), env_dir.join("actions.json"));
    });
}

#[test]
fn test_resolve_config_env_over_config_dir() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        isolate_env(&temp);

        let env_dir = temp.path().join("env");
        let config_dir = temp.path().join("config_dir");
        write_config_dir(&env_dir);
        write_config_dir(&config_dir);

        env::set_var(
            "CHRONO_ACTIONS",
            env_dir.join("actions.json").display().to_string(),
        );
        env::set_var("CHRONO_CONFIG_DIR", config_dir.display().to_string());

        let paths = resolve_config(None, None);
        assert_eq!(paths.actions.unwrap(), env_dir.join("actions.json"));
        assert_eq!(paths.policy.unwrap(), config_dir.join("policy.json"));
    });
}

#[test]
fn test_resolve_config_xdg() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        isolate_env(&temp);

        let xdg = temp.path().join("xdg");
        write_config_dir(&xdg.join("chronotherapy"));
        env::set_var("XDG_CONFIG_HOME", xdg.display().to_string());

        let paths = resolve_config(None, None);
        assert_eq!(paths.policy_source, ConfigSource::XdgConfig);
        assert_eq!(paths.actions_source, ConfigSource::XdgConfig);
    });
}

#[test]
fn test_load_config_missing_is_error() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        isolate_env(&temp);

        if Path::new("/etc/chronotherapy/policy.json").exists() {
            return;
        }
        let err = load_config(None, None).expect_err("no config anywhere");
        assert!(matches!(err, ValidationError::NotFound(_)));
    });
}

#[test]
fn test_load_config_from_dir() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        isolate_env(&temp);

        let dir = temp.path().join("cfg");
        write_config_dir(&dir);
        env::set_var("CHRONO_CONFIG_DIR", dir.display().to_string());

        let loaded = load_config(None, None).expect("load config");
        assert_eq!(loaded.snapshot.policy_source, "environment variable");
        assert_eq!(
            loaded.snapshot.epoch,
            epoch_hash(&loaded.policy, &loaded.actions)
        );
    });
}

#[test]
fn test_load_config_rejects_invalid_values() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        isolate_env(&temp);

        let err = load_config(
            Some(&fixtures_dir().join("invalid_policy_bad_alpha.json")),
            Some(&fixtures_dir().join("valid_actions.json")),
        )
        .expect_err("bad alpha");
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
    });
}
