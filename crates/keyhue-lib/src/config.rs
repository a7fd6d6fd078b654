//! Application configuration — TOML-based, platform-aware paths.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::hid::DeviceAddress;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# KeyHue configuration — changes made while the daemon runs may be overwritten.\n\n";

/// Address of the keyboard's raw vendor interface, as hex strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// USB vendor id, e.g. "0x3434" (Keychron).
    #[serde(default = "default_vid")]
    pub vid: String,

    /// USB product id.
    #[serde(default = "default_pid")]
    pub pid: String,

    /// HID usage page of the raw VIA interface.
    #[serde(default = "default_usage_page")]
    pub usage_page: String,

    /// HID usage of the raw VIA interface.
    #[serde(default = "default_usage")]
    pub usage: String,
}

fn default_vid() -> String {
    "0x3434".into()
}
fn default_pid() -> String {
    "0x0011".into()
}
fn default_usage_page() -> String {
    "0xFF60".into()
}
fn default_usage() -> String {
    "0x61".into()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            vid: default_vid(),
            pid: default_pid(),
            usage_page: default_usage_page(),
            usage: default_usage(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target keyboard address.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Hue step size handed to the delegate tool. Default: 8.
    #[serde(default = "default_step")]
    pub step: u32,

    /// Delay between hue steps in milliseconds. Default: 15.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Minimum spacing between accepted sends in milliseconds. Default: 50.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// Layout poll interval in milliseconds. Default: 100.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deadline for a delegate invocation in seconds. Default: 30.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Master switch; when false the watcher polls but never sends.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delegate CLI used when the direct HID channel fails.
    #[serde(default = "default_delegate")]
    pub delegate: String,

    /// Color for layouts without an explicit mapping.
    #[serde(default = "default_color")]
    pub default_color: String,

    /// Layout tag to color expression, matched exact first, then by the
    /// prefix before `-`. Example: `[layout_colors]` / `en = "green"` /
    /// `de-CH = "#ff8800"`.
    #[serde(default = "default_layout_colors")]
    pub layout_colors: HashMap<String, String>,
}

fn default_step() -> u32 {
    8
}
fn default_delay_ms() -> u64 {
    15
}
fn default_rate_limit_ms() -> u64 {
    50
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_delegate() -> String {
    "keyhue-cli".into()
}
fn default_color() -> String {
    "red".into()
}
fn default_layout_colors() -> HashMap<String, String> {
    HashMap::from([("en".to_string(), "green".to_string())])
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device: DeviceConfig::default(),
            step: default_step(),
            delay_ms: default_delay_ms(),
            rate_limit_ms: default_rate_limit_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_timeout_secs(),
            enabled: true,
            delegate: default_delegate(),
            default_color: default_color(),
            layout_colors: default_layout_colors(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A device id field is not a valid hex id.
    InvalidHexId { field: &'static str, reason: String },
    /// `step` is outside 1..=255.
    BadStep(u32),
    /// `poll_interval_ms` is zero.
    ZeroPollInterval,
    /// A color expression does not parse (`field` names the offender).
    InvalidColor { field: String, reason: String },
    /// `delegate` is empty or whitespace-only.
    EmptyDelegate,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidHexId { field, reason } => {
                write!(f, "Invalid {field}: {reason}")
            }
            ValidationError::BadStep(step) => {
                write!(f, "step must be in 1..=255, got {step}")
            }
            ValidationError::ZeroPollInterval => write!(f, "poll_interval_ms cannot be 0"),
            ValidationError::InvalidColor { field, reason } => {
                write!(f, "Invalid {field}: {reason}")
            }
            ValidationError::EmptyDelegate => write!(f, "delegate cannot be empty"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Parse a hex id like "0x3434" or "3434" into a u16.
pub fn parse_hex_id(value: &str) -> std::result::Result<u16, String> {
    let trimmed = value.trim().to_lowercase();
    let digits = trimmed.strip_prefix("0x").unwrap_or(&trimmed);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex id \"{value}\": {e}"))
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        #[cfg(windows)]
        {
            dirs::config_dir().map(|p| p.join("Keyhue"))
        }
        #[cfg(not(windows))]
        {
            dirs::config_dir().map(|p| p.join("keyhue"))
        }
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Full path to the daemon log file.
    pub fn log_path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("keyhue.log"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Save config to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    /// Resolve the configured hex id strings into a [`DeviceAddress`].
    pub fn device_address(&self) -> std::result::Result<DeviceAddress, ValidationError> {
        let field = |field, value: &str| {
            parse_hex_id(value).map_err(|reason| ValidationError::InvalidHexId { field, reason })
        };
        Ok(DeviceAddress {
            vendor_id: field("device.vid", &self.device.vid)?,
            product_id: field("device.pid", &self.device.pid)?,
            usage_page: field("device.usage_page", &self.device.usage_page)?,
            usage: field("device.usage", &self.device.usage)?,
        })
    }

    /// Color expression for a layout tag.
    ///
    /// Exact match on the lowercased tag first, then on the prefix before
    /// `-` (so "de-CH" falls back to a "de" mapping), then `default_color`.
    pub fn color_for_layout(&self, layout: Option<&str>) -> String {
        let Some(tag) = layout else {
            return self.default_color.clone();
        };
        let tag = tag.trim().to_lowercase();
        if let Some(color) = self.layout_colors.get(&tag) {
            return color.clone();
        }
        if let Some(prefix) = tag.split('-').next() {
            if let Some(color) = self.layout_colors.get(prefix) {
                return color.clone();
            }
        }
        self.default_color.clone()
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.device_address() {
            errors.push(e);
        }
        if !(1..=255).contains(&self.step) {
            errors.push(ValidationError::BadStep(self.step));
        }
        if self.poll_interval_ms == 0 {
            errors.push(ValidationError::ZeroPollInterval);
        }
        if self.delegate.trim().is_empty() {
            errors.push(ValidationError::EmptyDelegate);
        }
        if let Err(e) = Color::parse(&self.default_color) {
            errors.push(ValidationError::InvalidColor {
                field: "default_color".into(),
                reason: e.to_string(),
            });
        }
        for (tag, expression) in &self.layout_colors {
            if let Err(e) = Color::parse(expression) {
                errors.push(ValidationError::InvalidColor {
                    field: format!("layout_colors.{tag}"),
                    reason: e.to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ──

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.device.vid, "0x3434");
        assert_eq!(c.device.pid, "0x0011");
        assert_eq!(c.device.usage_page, "0xFF60");
        assert_eq!(c.device.usage, "0x61");
        assert_eq!(c.step, 8);
        assert_eq!(c.delay_ms, 15);
        assert_eq!(c.rate_limit_ms, 50);
        assert_eq!(c.poll_interval_ms, 100);
        assert!(c.enabled);
        assert_eq!(c.default_color, "red");
        assert_eq!(c.layout_colors.get("en").map(String::as_str), Some("green"));
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c.step, 8);
        assert!(c.enabled);
        assert_eq!(c.default_color, "red");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: Config = toml::from_str("step = 4\n[device]\nvid = \"0x1234\"").unwrap();
        assert_eq!(c.step, 4);
        assert_eq!(c.device.vid, "0x1234");
        // Missing fields get defaults
        assert_eq!(c.device.pid, "0x0011");
        assert_eq!(c.rate_limit_ms, 50);
    }

    #[test]
    fn serialize_roundtrip() {
        let c = Config {
            step: 16,
            enabled: false,
            default_color: "blue".into(),
            layout_colors: HashMap::from([
                ("en".into(), "green".into()),
                ("de".into(), "#ff8800".into()),
            ]),
            ..Config::default()
        };
        let toml_str = toml::to_string_pretty(&c).unwrap();
        let c2: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(c2.step, 16);
        assert!(!c2.enabled);
        assert_eq!(c2.default_color, "blue");
        assert_eq!(c2.layout_colors, c.layout_colors);
    }

    #[test]
    fn config_path_ends_with_toml() {
        let path = Config::path().unwrap();
        assert_eq!(path.file_name().unwrap(), "config.toml");
    }

    #[test]
    fn log_path_is_in_config_dir() {
        let log = Config::log_path().unwrap();
        assert_eq!(log.parent().unwrap(), Config::dir().unwrap());
        assert_eq!(log.file_name().unwrap(), "keyhue.log");
    }

    // ── hex ids ──

    #[test]
    fn parse_hex_id_accepts_prefixed_and_bare() {
        assert_eq!(parse_hex_id("0x3434").unwrap(), 0x3434);
        assert_eq!(parse_hex_id("3434").unwrap(), 0x3434);
        assert_eq!(parse_hex_id("0xFF60").unwrap(), 0xFF60);
        assert_eq!(parse_hex_id(" 0x61 ").unwrap(), 0x61);
    }

    #[test]
    fn parse_hex_id_rejects_garbage() {
        assert!(parse_hex_id("").is_err());
        assert!(parse_hex_id("0x").is_err());
        assert!(parse_hex_id("zz").is_err());
        assert!(parse_hex_id("0x12345").is_err());
    }

    #[test]
    fn device_address_from_defaults() {
        let address = Config::default().device_address().unwrap();
        assert_eq!(address.vendor_id, 0x3434);
        assert_eq!(address.product_id, 0x0011);
        assert_eq!(address.usage_page, 0xFF60);
        assert_eq!(address.usage, 0x61);
    }

    #[test]
    fn device_address_names_bad_field() {
        let c = Config {
            device: DeviceConfig {
                pid: "junk".into(),
                ..DeviceConfig::default()
            },
            ..Config::default()
        };
        let err = c.device_address().unwrap_err();
        assert!(err.to_string().contains("device.pid"));
    }

    // ── layout colors ──

    #[test]
    fn color_for_layout_exact_match() {
        let c = Config::default();
        assert_eq!(c.color_for_layout(Some("en")), "green");
    }

    #[test]
    fn color_for_layout_case_insensitive() {
        let c = Config::default();
        assert_eq!(c.color_for_layout(Some("EN")), "green");
    }

    #[test]
    fn color_for_layout_prefix_match() {
        let c = Config {
            layout_colors: HashMap::from([("de".to_string(), "cyan".to_string())]),
            ..Config::default()
        };
        assert_eq!(c.color_for_layout(Some("de-CH")), "cyan");
    }

    #[test]
    fn color_for_layout_exact_beats_prefix() {
        let c = Config {
            layout_colors: HashMap::from([
                ("de".to_string(), "cyan".to_string()),
                ("de-ch".to_string(), "purple".to_string()),
            ]),
            ..Config::default()
        };
        assert_eq!(c.color_for_layout(Some("de-CH")), "purple");
    }

    #[test]
    fn color_for_layout_unknown_gets_default() {
        let c = Config::default();
        assert_eq!(c.color_for_layout(Some("fr")), "red");
    }

    #[test]
    fn color_for_layout_none_gets_default() {
        let c = Config::default();
        assert_eq!(c.color_for_layout(None), "red");
    }

    // ── validate ──

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_bad_vid() {
        let c = Config {
            device: DeviceConfig {
                vid: "nope".into(),
                ..DeviceConfig::default()
            },
            ..Config::default()
        };
        let errs = c.validate().unwrap_err();
        assert!(matches!(errs[0], ValidationError::InvalidHexId { .. }));
    }

    #[test]
    fn validate_bad_step() {
        let c = Config {
            step: 0,
            ..Config::default()
        };
        let errs = c.validate().unwrap_err();
        assert!(errs.contains(&ValidationError::BadStep(0)));
    }

    #[test]
    fn validate_zero_poll_interval() {
        let c = Config {
            poll_interval_ms: 0,
            ..Config::default()
        };
        let errs = c.validate().unwrap_err();
        assert!(errs.contains(&ValidationError::ZeroPollInterval));
    }

    #[test]
    fn validate_empty_delegate() {
        let c = Config {
            delegate: "  ".into(),
            ..Config::default()
        };
        let errs = c.validate().unwrap_err();
        assert!(errs.contains(&ValidationError::EmptyDelegate));
    }

    #[test]
    fn validate_bad_default_color() {
        let c = Config {
            default_color: "mauve".into(),
            ..Config::default()
        };
        let errs = c.validate().unwrap_err();
        assert!(errs.iter().any(|e| matches!(
            e,
            ValidationError::InvalidColor { field, .. } if field == "default_color"
        )));
    }

    #[test]
    fn validate_bad_layout_color_names_tag() {
        let c = Config {
            layout_colors: HashMap::from([("fr".to_string(), "hsv:999".to_string())]),
            ..Config::default()
        };
        let errs = c.validate().unwrap_err();
        assert!(errs.iter().any(|e| matches!(
            e,
            ValidationError::InvalidColor { field, .. } if field == "layout_colors.fr"
        )));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let c = Config {
            step: 300,
            poll_interval_ms: 0,
            default_color: "mauve".into(),
            ..Config::default()
        };
        let errs = c.validate().unwrap_err();
        assert_eq!(errs.len(), 3);
    }

    // ── save_to / load_from ──

    #[test]
    fn save_to_load_from_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config {
            step: 12,
            delay_ms: 20,
            enabled: false,
            delegate: "qmk_hid".into(),
            default_color: "#336699".into(),
            layout_colors: HashMap::from([
                ("en".into(), "green".into()),
                ("ru".into(), "purple".into()),
            ]),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let (loaded, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(loaded.step, 12);
        assert_eq!(loaded.delay_ms, 20);
        assert!(!loaded.enabled);
        assert_eq!(loaded.delegate, "qmk_hid");
        assert_eq!(loaded.default_color, "#336699");
        assert_eq!(loaded.layout_colors, config.layout_colors);
    }

    #[test]
    fn save_to_includes_header_comment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        Config::default().save_to(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(
            contents.starts_with("# KeyHue configuration"),
            "saved file should start with header comment"
        );
    }

    #[test]
    fn save_to_cleans_up_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        Config::default().save_to(&path).unwrap();
        assert!(!dir.path().join("config.toml.tmp").exists());
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = Config::load_from(&dir.path().join("nonexistent.toml"));
        assert!(warnings.is_empty());
        assert_eq!(config.step, 8);
    }

    #[test]
    fn load_from_invalid_toml_returns_defaults_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is { not valid toml").unwrap();

        let (config, warnings) = Config::load_from(&path);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("config parse error"));
        assert_eq!(config.default_color, "red");
    }
}
