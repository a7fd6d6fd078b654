//! KeyHue — keyboard-layout driven RGB color sync for QMK/VIA keyboards.

pub mod channel;
pub mod color;
pub mod config;
pub mod error;
pub mod hid;
pub mod process;
pub mod protocol;
pub mod sender;
pub mod shutdown;
pub mod steps;
pub mod watcher;

pub use error::KeyhueError;
