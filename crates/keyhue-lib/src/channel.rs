//! Device channel trait — the seam between the sender and the transport.
//!
//! [`DeviceChannel`] is the direct transport contract: boolean results,
//! failures logged by the implementation and surfaced as `false`/`None` so the
//! caller can fall back without unwinding. [`crate::hid::HidChannel`] is the
//! production implementation; [`mock::MockChannel`] backs the tests.

/// A channel that can push color state to a keyboard.
///
/// A failed write marks the channel disconnected; the next use goes through
/// `connect` again.
pub trait DeviceChannel {
    /// Open the transport. Returns `false` when no usable interface exists.
    fn connect(&mut self) -> bool;

    /// Close the transport. Safe to call when already disconnected.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Set `(hue, saturation)` on a channel. `false` on any transport error.
    fn set_color(&mut self, hue: u8, saturation: u8, channel: u8) -> bool;

    /// Read back the current `(hue, saturation)` of a channel.
    fn get_color(&mut self, channel: u8) -> Option<(u8, u8)>;

    /// Persist the channel's current state to EEPROM.
    fn save(&mut self, channel: u8) -> bool;
}

pub mod mock {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    use super::DeviceChannel;
    use crate::color::Color;
    use crate::process::{FallbackChannel, ToolError};

    /// Recorded state behind a [`MockChannel`]. Shared, so tests keep a clone
    /// of the channel handle and inspect traffic after moving the other clone
    /// into a sender.
    #[derive(Debug, Default)]
    pub struct MockChannelState {
        pub connected: bool,
        /// When set, `connect` refuses.
        pub fail_connect: bool,
        /// When set, writes fail and drop the connection.
        pub fail_writes: bool,
        /// Current device color, readable via `get_color`.
        pub color: Option<(u8, u8)>,
        /// Recorded `set_color` calls: (hue, saturation, channel).
        pub sent: Vec<(u8, u8, u8)>,
        /// Recorded `save` calls (channel index).
        pub saves: Vec<u8>,
        pub connects: u32,
        pub disconnects: u32,
    }

    /// In-memory channel for unit tests.
    #[derive(Debug, Clone, Default)]
    pub struct MockChannel {
        state: Arc<Mutex<MockChannelState>>,
    }

    impl MockChannel {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-connected channel with a starting color.
        pub fn connected_with(hue: u8, saturation: u8) -> Self {
            let channel = Self::new();
            {
                let mut st = channel.state();
                st.connected = true;
                st.color = Some((hue, saturation));
            }
            channel
        }

        pub fn state(&self) -> MutexGuard<'_, MockChannelState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl DeviceChannel for MockChannel {
        fn connect(&mut self) -> bool {
            let mut st = self.state();
            st.connects += 1;
            if st.fail_connect {
                return false;
            }
            st.connected = true;
            true
        }

        fn disconnect(&mut self) {
            let mut st = self.state();
            st.disconnects += 1;
            st.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.state().connected
        }

        fn set_color(&mut self, hue: u8, saturation: u8, channel: u8) -> bool {
            let mut st = self.state();
            if !st.connected {
                return false;
            }
            if st.fail_writes {
                st.connected = false;
                return false;
            }
            st.sent.push((hue, saturation, channel));
            st.color = Some((hue, saturation));
            true
        }

        fn get_color(&mut self, _channel: u8) -> Option<(u8, u8)> {
            let st = self.state();
            if !st.connected {
                return None;
            }
            st.color
        }

        fn save(&mut self, channel: u8) -> bool {
            let mut st = self.state();
            if !st.connected || st.fail_writes {
                return false;
            }
            st.saves.push(channel);
            true
        }
    }

    /// In-memory fallback for sender tests. Can be told to fail, and can hold
    /// an apply call open until the test releases it.
    #[derive(Debug, Default)]
    pub struct MockFallback {
        fail: AtomicBool,
        applied: Mutex<Vec<Color>>,
        gate: Mutex<bool>,
        released: Condvar,
    }

    impl MockFallback {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        /// Block subsequent `apply` calls until [`MockFallback::release`].
        pub fn hold(&self) {
            *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = true;
        }

        pub fn release(&self) {
            *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = false;
            self.released.notify_all();
        }

        /// Colors applied so far, in order.
        pub fn applied(&self) -> Vec<Color> {
            self.applied
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl FallbackChannel for MockFallback {
        fn apply(&self, color: &Color, running: &AtomicBool) -> Result<(), ToolError> {
            let mut held = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
            while *held {
                if !running.load(Ordering::SeqCst) {
                    return Err(ToolError::Cancelled);
                }
                let (guard, _) = self
                    .released
                    .wait_timeout(held, Duration::from_millis(20))
                    .unwrap_or_else(PoisonError::into_inner);
                held = guard;
            }
            drop(held);

            self.applied
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(color.clone());
            if self.fail.load(Ordering::SeqCst) {
                Err(ToolError::Failed {
                    tool: "mock".into(),
                    status: Some(1),
                    output: "forced failure".into(),
                })
            } else {
                Ok(())
            }
        }
    }
}
