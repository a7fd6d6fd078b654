//! Unified error type for the keyhue-lib crate.
//!
//! [`KeyhueError`] wraps module-specific errors (`ColorError`, `DeviceError`,
//! `ToolError`) and a string-carrying `Config` kind. `From` impls allow `?`
//! to propagate across module boundaries seamlessly.

use std::fmt;

use crate::color::ColorError;
use crate::config::ValidationError;
use crate::hid::DeviceError;
use crate::process::ToolError;

/// Unified error type for keyhue-lib operations.
#[derive(Debug)]
pub enum KeyhueError {
    /// Color expression parsing error (unknown format, value out of range).
    Color(ColorError),
    /// Raw HID communication error (no matching interface, transfer I/O).
    Device(DeviceError),
    /// Delegate tool error (missing binary, timeout, non-zero exit).
    Tool(ToolError),
    /// Standard I/O error (file read/write, config persistence).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
}

impl fmt::Display for KeyhueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyhueError::Color(e) => write!(f, "{e}"),
            KeyhueError::Device(e) => write!(f, "{e}"),
            KeyhueError::Tool(e) => write!(f, "{e}"),
            KeyhueError::Io(e) => write!(f, "I/O error: {e}"),
            KeyhueError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for KeyhueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KeyhueError::Color(e) => Some(e),
            KeyhueError::Device(e) => Some(e),
            KeyhueError::Tool(e) => Some(e),
            KeyhueError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ColorError> for KeyhueError {
    fn from(e: ColorError) -> Self {
        KeyhueError::Color(e)
    }
}

impl From<DeviceError> for KeyhueError {
    fn from(e: DeviceError) -> Self {
        KeyhueError::Device(e)
    }
}

impl From<ToolError> for KeyhueError {
    fn from(e: ToolError) -> Self {
        KeyhueError::Tool(e)
    }
}

impl From<std::io::Error> for KeyhueError {
    fn from(e: std::io::Error) -> Self {
        KeyhueError::Io(e)
    }
}

impl From<ValidationError> for KeyhueError {
    fn from(e: ValidationError) -> Self {
        KeyhueError::Config(e.to_string())
    }
}

/// Crate-level Result alias using [`KeyhueError`].
pub type Result<T> = std::result::Result<T, KeyhueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_color_error() {
        let e: KeyhueError = ColorError::Format("unknown color format: mauve".into()).into();
        assert!(matches!(e, KeyhueError::Color(ColorError::Format(_))));
    }

    #[test]
    fn from_device_error() {
        let e: KeyhueError = DeviceError::Io("write failed".into()).into();
        assert!(matches!(e, KeyhueError::Device(DeviceError::Io(_))));
    }

    #[test]
    fn from_tool_error() {
        let e: KeyhueError = ToolError::Missing("qmk_hid".into()).into();
        assert!(matches!(e, KeyhueError::Tool(ToolError::Missing(_))));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: KeyhueError = io_err.into();
        assert!(matches!(e, KeyhueError::Io(_)));
    }

    #[test]
    fn display_color_error() {
        let e = KeyhueError::Color(ColorError::Range("hsv hue value 400 is out of range".into()));
        assert_eq!(e.to_string(), "hsv hue value 400 is out of range");
    }

    #[test]
    fn display_config_error() {
        let e = KeyhueError::Config("invalid input".into());
        assert_eq!(e.to_string(), "Config error: invalid input");
    }

    #[test]
    fn source_chains_device_error() {
        let e = KeyhueError::Device(DeviceError::Io("timeout".into()));
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("timeout"));
    }

    #[test]
    fn source_none_for_config() {
        let e = KeyhueError::Config("test".into());
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn question_mark_propagation_color_to_keyhue() {
        fn inner() -> std::result::Result<(), ColorError> {
            Err(ColorError::Format("unknown color format: plaid".into()))
        }
        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(err, KeyhueError::Color(ColorError::Format(_))));
    }

    #[test]
    fn question_mark_propagation_io_to_keyhue() {
        fn inner() -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "nope"))
        }
        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(err, KeyhueError::Io(_)));
    }
}
