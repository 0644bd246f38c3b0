use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use bankbus_core::{bus::DEFAULT_PPI_BASE, hardware::CompatMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModeSetting {
    /// Follow the CGB flag in the cartridge header.
    #[default]
    Auto,
    Classic,
    Enhanced,
}

impl ModeSetting {
    pub fn resolve(self, cgb_flag: bool) -> CompatMode {
        match self {
            Self::Auto => CompatMode::from_enhanced(cgb_flag),
            Self::Classic => CompatMode::Classic,
            Self::Enhanced => CompatMode::Enhanced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MachineConfig {
    pub mode: ModeSetting,
    /// Base address of the 4-register 8255 window in the high page.
    pub ppi_base: u16,
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub log_level: Option<String>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            mode: ModeSetting::Auto,
            ppi_base: DEFAULT_PPI_BASE,
            log_level: None,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("bankbus").join("config.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("bankbus").join("config.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("bankbus")
            .join("config.toml");
    }

    PathBuf::from("bankbus.toml")
}

pub fn load_from_file(path: &Path) -> MachineConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return MachineConfig::default(),
    };

    match toml::from_str::<MachineConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            MachineConfig::default()
        }
    }
}

pub fn save_to_file(path: &Path, cfg: &MachineConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(cfg).map_err(std::io::Error::other)?;
    std::fs::write(path, text)
}
