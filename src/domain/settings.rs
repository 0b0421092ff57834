use crate::domain::session::SessionConfig;
use crate::infrastructure::bluetooth::protocol;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "openbci_ble".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    // Last device a session was started for
    #[serde(default)]
    pub last_device_address: Option<String>,
    #[serde(default)]
    pub last_device_name: Option<String>,

    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    /// Start every new link with 'b' instead of resuming the toggle
    #[serde(default = "default_false")]
    pub reset_stream_on_connect: bool,

    // Display placeholders
    #[serde(default = "default_unknown_service")]
    pub unknown_service_label: String,
    #[serde(default = "default_unknown_characteristic")]
    pub unknown_characteristic_label: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            last_device_address: None,
            last_device_name: None,
            scan_timeout_secs: default_scan_timeout_secs(),
            reset_stream_on_connect: false,
            unknown_service_label: default_unknown_service(),
            unknown_characteristic_label: default_unknown_characteristic(),
        }
    }
}

impl Settings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            unknown_service_label: self.unknown_service_label.clone(),
            unknown_characteristic_label: self.unknown_characteristic_label.clone(),
            reset_stream_on_connect: self.reset_stream_on_connect,
        }
    }
}

fn default_scan_timeout_secs() -> u64 {
    5
}
fn default_unknown_service() -> String {
    protocol::UNKNOWN_SERVICE.to_string()
}
fn default_unknown_characteristic() -> String {
    protocol::UNKNOWN_CHARACTERISTIC.to_string()
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults if it is missing or invalid
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("OpenBCIBle");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn remember_device(
        &mut self,
        name: Option<String>,
        address: String,
    ) -> anyhow::Result<()> {
        self.settings.last_device_name = name;
        self.settings.last_device_address = Some(address);
        self.save()
    }
}
