use referral_core::Rules;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR: &str = "$HOME/.earnctl";
pub const CONFIG_FILE: &str = "earnctl.toml";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub data_dir: String,
    pub log_level: String,
    pub rules: Rules,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.to_string(),
            log_level: "warn".to_string(),
            rules: Rules::default(),
        }
    }
}

impl CliConfig {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(expand_path(&self.data_dir))
    }
}

/// Read the config file if there is one. An explicit path must exist.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<CliConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(expand_path(DEFAULT_DATA_DIR)).join(CONFIG_FILE);
            if !fallback.exists() {
                return Ok(CliConfig::default());
            }
            fallback
        }
    };

    let contents = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
    let config: CliConfig = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
    config
        .rules
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid rules in {}: {}", path.display(), e))?;
    Ok(config)
}

pub fn expand_path(path: &str) -> String {
    path.replace("$HOME", &std::env::var("HOME").unwrap_or_default())
}
