use std::path::{Path, PathBuf};

use dotmatrix_core::MachineConfig;
use log::warn;
use serde::{Deserialize, Serialize};

/// Settings read from the `--config` TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CliConfig {
    pub machine: MachineConfig,
    pub boot_rom: Option<PathBuf>,
}

pub fn load_from_file(path: &Path) -> CliConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to read config {}: {e}; using defaults", path.display());
            return CliConfig::default();
        }
    };
    parse(&text, path)
}

fn parse(text: &str, path: &Path) -> CliConfig {
    match toml::from_str::<CliConfig>(text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            CliConfig::default()
        }
    }
}
