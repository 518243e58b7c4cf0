//! TOML-based configuration for the MLME daemon.
//!
//! Reads `MlmeConfig` from an explicit path (`--config`) or from the
//! platform-appropriate config file:
//! - Windows:  `%APPDATA%\WlanMlme\mlme.toml`
//! - Linux:    `~/.config/wlan-mlme/mlme.toml`
//! - macOS:    `~/Library/Application Support/WlanMlme/mlme.toml`
//!
//! # What goes in the file? (for beginners)
//!
//! Every limit, timeout and retry budget the engine uses has a default, so an
//! empty file (or no file at all) is a valid configuration.  A file only
//! needs the values it wants to change:
//!
//! ```toml
//! [engine]
//! max_sessions = 2
//!
//! [timeouts]
//! auth_ms = 500
//!
//! [retries]
//! auth = 2
//!
//! [ap]
//! ssid = "lab"
//! bssid = "02:00:00:00:01:00"
//! channel = 6
//! ```
//!
//! Timeouts are written in milliseconds and converted to `Duration` when the
//! engine configuration is built.  The optional `[ap]` table makes the daemon
//! start a BSS right away.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wlan_mlme_core::domain::session::SecurityMaterial;
use wlan_mlme_core::{CapabilitySet, MacAddr, Role};

use crate::application::context::EngineConfig;
use crate::application::events::StartBssParams;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The file parsed but a value is unusable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MlmeConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub engine: EngineLimits,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retries: RetryConfig,
    /// Start a BSS at launch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ap: Option<ApConfig>,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonConfig {
    /// `tracing` log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Capacity of the event queue feeding the engine task.
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
    /// Frames allowed between `send` and their completion.
    #[serde(default = "default_tx_buffers")]
    pub tx_buffers: usize,
}

/// Pool sizes and other engine-wide limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineLimits {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
    #[serde(default = "default_preauth_capacity")]
    pub preauth_capacity: usize,
    /// Age after which an open-system pre-auth node may be reclaimed.
    #[serde(default = "default_open_auth_timeout_ms")]
    pub open_auth_timeout_ms: u32,
    #[serde(default = "default_protection_cache_size")]
    pub protection_cache_size: usize,
    #[serde(default = "default_overlap_decay_ms")]
    pub overlap_decay_ms: u64,
    #[serde(default = "default_listen_interval")]
    pub listen_interval: u16,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

/// Failure timeouts, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    #[serde(default = "default_join_ms")]
    pub join_ms: u64,
    #[serde(default = "default_auth_ms")]
    pub auth_ms: u64,
    #[serde(default = "default_assoc_ms")]
    pub assoc_ms: u64,
    #[serde(default = "default_assoc_ms")]
    pub reassoc_ms: u64,
    #[serde(default = "default_auth_ms")]
    pub ft_preauth_ms: u64,
    #[serde(default = "default_auth_ms")]
    pub ft_reassoc_ms: u64,
    #[serde(default = "default_auth_ms")]
    pub auth_frame3_ms: u64,
    #[serde(default = "default_sa_query_ms")]
    pub sa_query_ms: u64,
    /// Wait for the acknowledgment of our own deauthentication or
    /// disassociation.
    #[serde(default = "default_auth_ms")]
    pub disconnect_ack_ms: u64,
    #[serde(default = "default_scan_dwell_ms")]
    pub scan_dwell_ms: u64,
}

/// Retry budgets per frame class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    #[serde(default = "default_retry_limit")]
    pub auth: u8,
    #[serde(default = "default_retry_limit")]
    pub sae: u8,
    #[serde(default = "default_retry_limit")]
    pub reassoc: u8,
    #[serde(default = "default_retry_limit")]
    pub ft_reassoc: u8,
    #[serde(default = "default_retry_limit")]
    pub deauth: u8,
    #[serde(default = "default_retry_limit")]
    pub sa_query: u8,
}

/// A BSS to start at launch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApConfig {
    pub ssid: String,
    /// Colon-separated hex, e.g. `"02:00:00:00:01:00"`.
    pub bssid: String,
    #[serde(default = "default_channel")]
    pub channel: u8,
    #[serde(default = "default_beacon_interval")]
    pub beacon_interval: u16,
    /// 0 means the engine-wide limit.
    #[serde(default)]
    pub max_peers: usize,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_event_queue_depth() -> usize {
    256
}
fn default_tx_buffers() -> usize {
    64
}
fn default_max_sessions() -> usize {
    4
}
fn default_max_peers() -> usize {
    32
}
fn default_preauth_capacity() -> usize {
    16
}
fn default_open_auth_timeout_ms() -> u32 {
    5_000
}
fn default_protection_cache_size() -> usize {
    16
}
fn default_overlap_decay_ms() -> u64 {
    30_000
}
fn default_listen_interval() -> u16 {
    1
}
fn default_max_frame_len() -> usize {
    2304
}
fn default_join_ms() -> u64 {
    3_000
}
fn default_auth_ms() -> u64 {
    1_000
}
fn default_assoc_ms() -> u64 {
    2_000
}
fn default_sa_query_ms() -> u64 {
    201
}
fn default_scan_dwell_ms() -> u64 {
    100
}
fn default_retry_limit() -> u8 {
    3
}
fn default_channel() -> u8 {
    6
}
fn default_beacon_interval() -> u16 {
    100
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            event_queue_depth: default_event_queue_depth(),
            tx_buffers: default_tx_buffers(),
        }
    }
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            max_peers: default_max_peers(),
            preauth_capacity: default_preauth_capacity(),
            open_auth_timeout_ms: default_open_auth_timeout_ms(),
            protection_cache_size: default_protection_cache_size(),
            overlap_decay_ms: default_overlap_decay_ms(),
            listen_interval: default_listen_interval(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            join_ms: default_join_ms(),
            auth_ms: default_auth_ms(),
            assoc_ms: default_assoc_ms(),
            reassoc_ms: default_assoc_ms(),
            ft_preauth_ms: default_auth_ms(),
            ft_reassoc_ms: default_auth_ms(),
            auth_frame3_ms: default_auth_ms(),
            sa_query_ms: default_sa_query_ms(),
            disconnect_ack_ms: default_auth_ms(),
            scan_dwell_ms: default_scan_dwell_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            auth: default_retry_limit(),
            sae: default_retry_limit(),
            reassoc: default_retry_limit(),
            ft_reassoc: default_retry_limit(),
            deauth: default_retry_limit(),
            sa_query: default_retry_limit(),
        }
    }
}

// ── Conversion into engine types ──────────────────────────────────────────────

impl MlmeConfig {
    /// Checks values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_sessions == 0 {
            return Err(invalid("engine.max_sessions", "must be at least 1"));
        }
        if self.engine.preauth_capacity == 0 {
            return Err(invalid("engine.preauth_capacity", "must be at least 1"));
        }
        if self.daemon.event_queue_depth == 0 {
            return Err(invalid("daemon.event_queue_depth", "must be at least 1"));
        }
        if self.daemon.tx_buffers == 0 {
            return Err(invalid("daemon.tx_buffers", "must be at least 1"));
        }
        if let Some(ap) = &self.ap {
            ap.start_params()?;
        }
        Ok(())
    }

    /// The engine configuration these settings describe.
    pub fn engine_config(&self) -> EngineConfig {
        let ms = Duration::from_millis;
        let t = &self.timeouts;
        let r = &self.retries;
        EngineConfig {
            max_sessions: self.engine.max_sessions,
            max_peers: self.engine.max_peers,
            preauth_capacity: self.engine.preauth_capacity,
            open_auth_timeout_ticks: self.engine.open_auth_timeout_ms,
            protection_cache_size: self.engine.protection_cache_size,
            overlap_decay: ms(self.engine.overlap_decay_ms),
            join_timeout: ms(t.join_ms),
            auth_timeout: ms(t.auth_ms),
            assoc_timeout: ms(t.assoc_ms),
            reassoc_timeout: ms(t.reassoc_ms),
            ft_preauth_timeout: ms(t.ft_preauth_ms),
            ft_reassoc_timeout: ms(t.ft_reassoc_ms),
            auth_frame3_timeout: ms(t.auth_frame3_ms),
            sa_query_timeout: ms(t.sa_query_ms),
            disconnect_ack_timeout: ms(t.disconnect_ack_ms),
            scan_dwell: ms(t.scan_dwell_ms),
            auth_retry_limit: r.auth,
            sae_retry_limit: r.sae,
            reassoc_retry_limit: r.reassoc,
            ft_reassoc_retry_limit: r.ft_reassoc,
            deauth_retry_limit: r.deauth,
            sa_query_retry_limit: r.sa_query,
            listen_interval: self.engine.listen_interval,
            max_frame_len: self.engine.max_frame_len,
        }
    }
}

impl ApConfig {
    /// The StartBss request for this table: an open BSS advertising the
    /// basic rates of the channel's band.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a malformed BSSID, an SSID longer
    /// than 32 bytes, or channel 0.
    pub fn start_params(&self) -> Result<StartBssParams, ConfigError> {
        let bssid: MacAddr = self
            .bssid
            .parse()
            .map_err(|_| invalid("ap.bssid", format!("{:?} is not a MAC address", self.bssid)))?;
        if self.ssid.len() > 32 {
            return Err(invalid("ap.ssid", "longer than 32 bytes"));
        }
        if self.channel == 0 {
            return Err(invalid("ap.channel", "must be non-zero"));
        }
        let rates = if self.channel <= 14 {
            vec![0x82, 0x84, 0x8b, 0x96, 0x0c, 0x12, 0x18, 0x24, 0x30, 0x48, 0x60, 0x6c]
        } else {
            vec![0x8c, 0x12, 0x98, 0x24, 0xb0, 0x48, 0x60, 0x6c]
        };
        Ok(StartBssParams {
            vdev_id: 0,
            self_mac: bssid,
            bssid,
            ssid: self.ssid.as_bytes().to_vec(),
            channel: self.channel,
            ch_width_40: false,
            beacon_interval: self.beacon_interval,
            role: Role::Ap,
            caps: CapabilitySet {
                rates,
                ..CapabilitySet::default()
            },
            security: SecurityMaterial::default(),
            max_peers: self.max_peers,
            rifs_permitted: false,
            noa: None,
        })
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("mlme.toml"))
}

/// Loads the config from the platform default location.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<MlmeConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `MlmeConfig` from `path`, returning `MlmeConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed, and
/// [`ConfigError::Invalid`] if a value fails validation.
pub fn load_config_from(path: &Path) -> Result<MlmeConfig, ConfigError> {
    let cfg = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str::<MlmeConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => MlmeConfig::default(),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &MlmeConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("WlanMlme"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("wlan-mlme"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("WlanMlme"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("wlan_mlme_test_{tag}_{}", std::process::id()))
            .join("mlme.toml")
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_config_matches_engine_defaults() {
        // Arrange / Act
        let cfg = MlmeConfig::default();

        // Assert
        assert_eq!(cfg.engine_config(), EngineConfig::default());
    }

    #[test]
    fn test_default_log_level_is_info() {
        assert_eq!(DaemonConfig::default().log_level, "info");
    }

    #[test]
    fn test_default_has_no_ap_table() {
        assert!(MlmeConfig::default().ap.is_none());
    }

    // ── TOML parsing ──────────────────────────────────────────────────────────

    #[test]
    fn test_empty_toml_uses_defaults() {
        // Arrange / Act
        let cfg: MlmeConfig = toml::from_str("").expect("deserialize empty");

        // Assert
        assert_eq!(cfg, MlmeConfig::default());
    }

    #[test]
    fn test_partial_tables_override_only_named_fields() {
        // Arrange
        let toml_str = r#"
[timeouts]
auth_ms = 500

[retries]
auth = 2
"#;

        // Act
        let cfg: MlmeConfig = toml::from_str(toml_str).expect("deserialize partial");
        let engine = cfg.engine_config();

        // Assert
        assert_eq!(engine.auth_timeout, Duration::from_millis(500));
        assert_eq!(engine.auth_retry_limit, 2);
        // Unspecified fields keep their defaults
        assert_eq!(engine.assoc_timeout, Duration::from_millis(2_000));
        assert_eq!(engine.deauth_retry_limit, 3);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let result: Result<MlmeConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        // Arrange
        let mut cfg = MlmeConfig::default();
        cfg.engine.max_sessions = 2;
        cfg.timeouts.sa_query_ms = 300;
        cfg.ap = Some(ApConfig {
            ssid: "lab".to_string(),
            bssid: "02:00:00:00:01:00".to_string(),
            channel: 36,
            beacon_interval: 100,
            max_peers: 8,
        });

        // Act
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: MlmeConfig = toml::from_str(&toml_str).expect("deserialize");

        // Assert
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_absent_ap_table_is_omitted_from_output() {
        let toml_str = toml::to_string_pretty(&MlmeConfig::default()).expect("serialize");
        assert!(!toml_str.contains("[ap]"));
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn test_zero_sessions_is_rejected() {
        // Arrange
        let mut cfg = MlmeConfig::default();
        cfg.engine.max_sessions = 0;

        // Act
        let result = cfg.validate();

        // Assert
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "engine.max_sessions",
                ..
            })
        ));
    }

    #[test]
    fn test_malformed_ap_bssid_is_rejected() {
        let ap = ApConfig {
            ssid: "lab".to_string(),
            bssid: "not-a-mac".to_string(),
            channel: 6,
            beacon_interval: 100,
            max_peers: 0,
        };

        assert!(matches!(
            ap.start_params(),
            Err(ConfigError::Invalid { field: "ap.bssid", .. })
        ));
    }

    #[test]
    fn test_ap_table_builds_start_bss_request() {
        // Arrange
        let ap = ApConfig {
            ssid: "lab".to_string(),
            bssid: "02:00:00:00:01:00".to_string(),
            channel: 6,
            beacon_interval: 100,
            max_peers: 4,
        };

        // Act
        let params = ap.start_params().expect("valid ap table");

        // Assert
        assert_eq!(params.bssid, MacAddr([0x02, 0, 0, 0, 0x01, 0]));
        assert_eq!(params.ssid, b"lab".to_vec());
        assert_eq!(params.role, Role::Ap);
        assert_eq!(params.max_peers, 4);
        assert!(params.caps.rates.contains(&0x82), "2.4 GHz set carries 1 Mb/s basic");
    }

    // ── Load / save ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        // Arrange
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/mlme.toml");

        // Act
        let cfg = load_config_from(&path).expect("missing file is not an error");

        // Assert
        assert_eq!(cfg, MlmeConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        // Arrange
        let path = temp_path("roundtrip");
        let mut cfg = MlmeConfig::default();
        cfg.retries.deauth = 5;
        cfg.daemon.log_level = "debug".to_string();

        // Act
        save_config_to(&path, &cfg).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_load_rejects_invalid_values_in_file() {
        // Arrange
        let path = temp_path("invalid");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[engine]\npreauth_capacity = 0\n").unwrap();

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));

        // Cleanup
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_mlme_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("mlme.toml"), "got {path:?}");
        }
        // NoPlatformConfigDir in a stripped environment is also acceptable.
    }
}
