//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI arguments → environment variables → XDG paths → /etc.
//! Nothing is synthesized when every location is empty.

use std::path::{Path, PathBuf};

/// Discovered configuration file paths.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Path to policy.json (or None if not found).
    pub policy: Option<PathBuf>,

    /// Path to actions.json (or None if not found).
    pub actions: Option<PathBuf>,

    /// Source of the policy config (for diagnostics).
    pub policy_source: ConfigSource,

    /// Source of the action space config (for diagnostics).
    pub actions_source: ConfigSource,
}

/// Where a configuration file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/chronotherapy/.
    SystemConfig,

    /// Not found anywhere.
    #[default]
    Missing,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::Missing => write!(f, "missing"),
        }
    }
}

/// Environment variable names.
pub const ENV_POLICY_PATH: &str = "CHRONO_POLICY";
pub const ENV_ACTIONS_PATH: &str = "CHRONO_ACTIONS";
pub const ENV_CONFIG_DIR: &str = "CHRONO_CONFIG_DIR";

/// Standard config file names.
pub const POLICY_FILENAME: &str = "policy.json";
pub const ACTIONS_FILENAME: &str = "actions.json";

/// Application name for XDG directories.
const APP_NAME: &str = "chronotherapy";

/// Resolve configuration paths using the standard resolution order.
///
/// Resolution order for each config file:
/// 1. Explicit CLI path (taken as-is, even if it does not exist)
/// 2. Environment variable (CHRONO_POLICY, CHRONO_ACTIONS)
/// 3. CHRONO_CONFIG_DIR environment variable + filename
/// 4. XDG config directory (~/.config/chronotherapy/)
/// 5. System config (/etc/chronotherapy/)
pub fn resolve_config(cli_policy: Option<&Path>, cli_actions: Option<&Path>) -> ConfigPaths {
    let mut paths = ConfigPaths::default();

    paths.policy = resolve_single_config(
        cli_policy,
        ENV_POLICY_PATH,
        POLICY_FILENAME,
        &mut paths.policy_source,
    );

    paths.actions = resolve_single_config(
        cli_actions,
        ENV_ACTIONS_PATH,
        ACTIONS_FILENAME,
        &mut paths.actions_source,
    );

    paths
}

fn resolve_single_config(
    cli_path: Option<&Path>,
    env_var: &str,
    filename: &str,
    source: &mut ConfigSource,
) -> Option<PathBuf> {
    // Explicit paths are used as-is; loading reports a missing file.
    if let Some(path) = cli_path {
        *source = ConfigSource::CliArgument;
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(env_var) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            *source = ConfigSource::Environment;
            return Some(path);
        }
    }

    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(filename);
        if path.exists() {
            *source = ConfigSource::Environment;
            return Some(path);
        }
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(filename);
        if path.exists() {
            *source = ConfigSource::XdgConfig;
            return Some(path);
        }
    }

    let system_path = system_config_dir().join(filename);
    if system_path.exists() {
        *source = ConfigSource::SystemConfig;
        return Some(system_path);
    }

    *source = ConfigSource::Missing;
    None
}

/// Get the XDG config directory for chronotherapy.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}
