use super::schema::MimicConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming a config file that takes precedence over the default locations.
pub const CONFIG_ENV: &str = "MIMIC_CONFIG";

const LOCAL_CONFIG: &str = "mimic.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. `$MIMIC_CONFIG` (must exist when set)
    /// 2. ./mimic.yaml
    /// 3. ~/.mimic/config.yaml
    /// 4. Default configuration
    pub async fn load_default() -> Result<MimicConfig, ConfigError> {
        let env_override = std::env::var_os(CONFIG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        match Self::locate(env_override, Path::new("."), dirs::home_dir().as_deref()) {
            Some(path) => Self::load_from(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(MimicConfig::default())
            }
        }
    }

    /// First config file to use. An explicit override is returned even if missing,
    /// so that a typo in `$MIMIC_CONFIG` surfaces as an error instead of defaults.
    pub fn locate(
        env_override: Option<PathBuf>,
        cwd: &Path,
        home: Option<&Path>,
    ) -> Option<PathBuf> {
        if env_override.is_some() {
            return env_override;
        }
        let local = cwd.join(LOCAL_CONFIG);
        if local.exists() {
            return Some(local);
        }
        home.map(|h| h.join(".mimic").join("config.yaml"))
            .filter(|p| p.exists())
    }

    /// Parse a config file. Relative store paths are taken relative to the file's
    /// directory and a leading `~/` expands to the home directory.
    pub async fn load_from(path: &Path) -> Result<MimicConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut config: MimicConfig = serde_yaml::from_str(&content)?;

        let base = path.parent().unwrap_or(Path::new("."));
        let home = dirs::home_dir();
        config.store.path = anchor_path(&config.store.path, base, home.as_deref());
        config.store.sessions_dir = anchor_path(&config.store.sessions_dir, base, home.as_deref());

        debug!(
            "Loaded config from {} (store {}, sessions {})",
            path.display(),
            config.store.path.display(),
            config.store.sessions_dir.display()
        );
        Ok(config)
    }
}

fn anchor_path(path: &Path, base: &Path, home: Option<&Path>) -> PathBuf {
    if let (Ok(rest), Some(home)) = (path.strip_prefix("~"), home) {
        return home.join(rest);
    }
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}
