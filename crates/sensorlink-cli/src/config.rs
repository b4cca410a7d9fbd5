//! Host configuration – reads/writes `~/.sensorlink/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sensorlink_middleware::{IngestionConfig, NotifierConfig};

/// Persisted host configuration stored in `~/.sensorlink/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Interface both listeners bind to.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port for the sensor (JSON) stream.
    #[serde(default = "default_sensor_port")]
    pub sensor_port: u16,

    /// TCP port for the keystroke command stream.
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Bytes read per sensor chunk.
    #[serde(default = "default_sensor_chunk_size")]
    pub sensor_chunk_size: usize,

    /// Directory holding the handoff file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_handoff_file_name")]
    pub handoff_file_name: String,

    /// `host:port` that velocity reports are sent to.
    #[serde(default = "default_notifier_address")]
    pub notifier_address: String,

    #[serde(default = "default_true")]
    pub notifier_enabled: bool,

    #[serde(default = "default_notifier_queue_capacity")]
    pub notifier_queue_capacity: usize,

    #[serde(default = "default_notifier_connect_timeout_ms")]
    pub notifier_connect_timeout_ms: u64,

    /// Physics steps per second.
    #[serde(default = "default_fixed_hz")]
    pub fixed_hz: u32,

    /// Frames (dispatcher drains) per second.
    #[serde(default = "default_frame_hz")]
    pub frame_hz: u32,

    #[serde(default = "default_object_count")]
    pub light_count: usize,

    #[serde(default = "default_object_count")]
    pub cylinder_count: usize,
}

fn default_bind_address() -> IpAddr {
    IngestionConfig::default().bind_address
}
fn default_sensor_port() -> u16 {
    5000
}
fn default_command_port() -> u16 {
    5001
}
fn default_sensor_chunk_size() -> usize {
    256
}
fn default_data_dir() -> PathBuf {
    sensorlink_dir_for_home(&home_dir())
}
fn default_handoff_file_name() -> String {
    "SensorData.txt".to_string()
}
fn default_notifier_address() -> String {
    NotifierConfig::default().address
}
fn default_true() -> bool {
    true
}
fn default_notifier_queue_capacity() -> usize {
    32
}
fn default_notifier_connect_timeout_ms() -> u64 {
    500
}
fn default_fixed_hz() -> u32 {
    50
}
fn default_frame_hz() -> u32 {
    60
}
fn default_object_count() -> usize {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            sensor_port: default_sensor_port(),
            command_port: default_command_port(),
            sensor_chunk_size: default_sensor_chunk_size(),
            data_dir: default_data_dir(),
            handoff_file_name: default_handoff_file_name(),
            notifier_address: default_notifier_address(),
            notifier_enabled: default_true(),
            notifier_queue_capacity: default_notifier_queue_capacity(),
            notifier_connect_timeout_ms: default_notifier_connect_timeout_ms(),
            fixed_hz: default_fixed_hz(),
            frame_hz: default_frame_hz(),
            light_count: default_object_count(),
            cylinder_count: default_object_count(),
        }
    }
}

impl Config {
    /// Reject settings the host cannot start with.
    pub fn validate(&self) -> Result<(), String> {
        if self.sensor_port != 0 && self.sensor_port == self.command_port {
            return Err(format!(
                "sensor_port and command_port must differ (both {})",
                self.sensor_port
            ));
        }
        if self.sensor_chunk_size == 0 {
            return Err("sensor_chunk_size must be at least 1".to_string());
        }
        if self.fixed_hz == 0 || self.frame_hz == 0 {
            return Err("fixed_hz and frame_hz must be positive".to_string());
        }
        if self.handoff_file_name.trim().is_empty() {
            return Err("handoff_file_name must not be empty".to_string());
        }
        Ok(())
    }

    pub fn ingestion(&self) -> IngestionConfig {
        IngestionConfig {
            bind_address: self.bind_address,
            sensor_port: self.sensor_port,
            command_port: self.command_port,
            sensor_chunk_size: self.sensor_chunk_size,
        }
    }

    pub fn notifier(&self) -> NotifierConfig {
        NotifierConfig {
            address: self.notifier_address.clone(),
            queue_capacity: self.notifier_queue_capacity,
            timeout: Duration::from_millis(self.notifier_connect_timeout_ms),
        }
    }

    pub fn handoff_path(&self) -> PathBuf {
        self.data_dir.join(&self.handoff_file_name)
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn sensorlink_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".sensorlink")
}

/// Return the path to `~/.sensorlink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    sensorlink_dir_for_home(home).join("config.toml")
}

/// Load the config from disk, falling back to defaults when the file does
/// not exist.  Environment overrides apply in both cases.
pub fn load() -> Result<Config, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Config, String> {
    let mut cfg = if path.exists() {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply `SENSORLINK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SENSORLINK_BIND_ADDRESS` | `bind_address` |
/// | `SENSORLINK_SENSOR_PORT` | `sensor_port` |
/// | `SENSORLINK_COMMAND_PORT` | `command_port` |
/// | `SENSORLINK_NOTIFIER_ADDRESS` | `notifier_address` |
/// | `SENSORLINK_DATA_DIR` | `data_dir` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SENSORLINK_BIND_ADDRESS")
        && let Ok(ip) = v.parse::<IpAddr>()
    {
        cfg.bind_address = ip;
    }
    if let Ok(v) = std::env::var("SENSORLINK_SENSOR_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.sensor_port = port;
    }
    if let Ok(v) = std::env::var("SENSORLINK_COMMAND_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.command_port = port;
    }
    if let Ok(v) = std::env::var("SENSORLINK_NOTIFIER_ADDRESS") {
        cfg.notifier_address = v;
    }
    if let Ok(v) = std::env::var("SENSORLINK_DATA_DIR") {
        cfg.data_dir = PathBuf::from(v);
    }
}

/// Save the config to disk, creating `~/.sensorlink/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
