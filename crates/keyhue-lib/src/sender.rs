//! Hue sender — gated, failure-aware color delivery.
//!
//! [`HueSender::send`] runs every request through a fixed gate order: dedup,
//! rate limit, error backoff. Accepted requests try the direct HID channel
//! first (one reconnect attempt inline); if that fails the request is handed
//! to a single fallback worker through a one-slot, last-writer-wins mailbox,
//! so the caller never blocks on a delegate process.
//!
//! State invariant: `consecutive_errors == 0` exactly when no backoff is
//! armed. A successful delivery on either channel resets both; a failed
//! fallback delivery arms the next backoff window and clears the dedup
//! anchor so the color is retried once the window passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::channel::DeviceChannel;
use crate::color::Color;
use crate::process::FallbackChannel;
use crate::shutdown::ShutdownGuard;

/// Worker wakeup interval while idle, bounding shutdown latency.
const WORKER_POLL: Duration = Duration::from_millis(200);

/// Escalating backoff windows in seconds, capped at the last entry.
const BACKOFF_SECS: [u64; 4] = [1, 2, 5, 10];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn backoff_delay(consecutive_errors: u32) -> Duration {
    let index = (consecutive_errors.saturating_sub(1) as usize).min(BACKOFF_SECS.len() - 1);
    Duration::from_secs(BACKOFF_SECS[index])
}

/// Outcome of a [`HueSender::send`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Color already on the keyboard; nothing was written.
    Deduped,
    /// Delivered synchronously over the direct HID channel.
    Sent,
    /// Queued for the fallback worker; result lands asynchronously.
    Dispatched,
    /// Rejected: too soon after the last accepted send. Retry next tick.
    RateLimited,
    /// Rejected: inside an error backoff window.
    Backoff,
    /// Rejected: sender is shutting down.
    ShutDown,
}

impl SendOutcome {
    /// Whether the request was satisfied or taken on for delivery.
    pub fn accepted(self) -> bool {
        matches!(
            self,
            SendOutcome::Deduped | SendOutcome::Sent | SendOutcome::Dispatched
        )
    }
}

/// Tunable gate parameters.
#[derive(Debug, Clone, Copy)]
pub struct SenderSettings {
    /// Minimum spacing between accepted sends.
    pub rate_limit: Duration,
    /// VIA channel index written to.
    pub channel_index: u8,
}

impl Default for SenderSettings {
    fn default() -> Self {
        SenderSettings {
            rate_limit: Duration::from_millis(50),
            channel_index: 0,
        }
    }
}

/// Point-in-time view of the sender, for status reporting.
#[derive(Debug, Clone)]
pub struct SenderStatus {
    pub connected: bool,
    pub last_color: Option<Color>,
    pub consecutive_errors: u32,
    pub backoff_remaining: Option<Duration>,
    pub pending: bool,
}

#[derive(Debug, Default)]
struct SenderState {
    last_color: Option<Color>,
    last_send: Option<Instant>,
    consecutive_errors: u32,
    backoff_until: Option<Instant>,
    /// One-slot mailbox for the fallback worker; a newer dispatch overwrites
    /// an undelivered older one.
    pending: Option<Color>,
    /// Bumped on every dispatch; the worker only commits a result whose
    /// generation is still current.
    generation: u64,
}

impl SenderState {
    fn record_success(&mut self, color: Color) {
        self.last_color = Some(color);
        self.last_send = Some(Instant::now());
        self.consecutive_errors = 0;
        self.backoff_until = None;
        // A delivered color supersedes anything queued or still in flight on
        // the fallback worker; its result must not land over this one.
        self.pending = None;
        self.generation += 1;
    }

    fn record_failure(&mut self) {
        self.consecutive_errors += 1;
        self.backoff_until = Some(Instant::now() + backoff_delay(self.consecutive_errors));
        // Clear the dedup anchor so the same color is retried after backoff.
        self.last_color = None;
    }
}

/// Everything the fallback worker shares with the sender handle.
struct Shared<F> {
    state: Mutex<SenderState>,
    work: Condvar,
    running: AtomicBool,
    fallback: F,
}

/// Color delivery engine over a direct channel with a process fallback.
pub struct HueSender<D, F> {
    direct: Mutex<D>,
    shared: Arc<Shared<F>>,
    settings: Mutex<SenderSettings>,
    worker: Mutex<Option<JoinHandle<()>>>,
    teardown: ShutdownGuard,
}

impl<D, F> HueSender<D, F>
where
    D: DeviceChannel,
    F: FallbackChannel + 'static,
{
    /// Build the sender and start its fallback worker.
    pub fn new(direct: D, fallback: F, settings: SenderSettings) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(SenderState::default()),
            work: Condvar::new(),
            running: AtomicBool::new(true),
            fallback,
        });
        let worker = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || worker_loop(shared))
        };
        HueSender {
            direct: Mutex::new(direct),
            shared,
            settings: Mutex::new(settings),
            worker: Mutex::new(Some(worker)),
            teardown: ShutdownGuard::new(),
        }
    }

    /// Request that the keyboard show `color`.
    ///
    /// Non-blocking: either the direct write happens inline or the request is
    /// queued. Rejections leave all state untouched.
    pub fn send(&self, color: &Color) -> SendOutcome {
        if !self.shared.running.load(Ordering::SeqCst) {
            return SendOutcome::ShutDown;
        }
        let settings = *lock(&self.settings);

        {
            let state = lock(&self.shared.state);
            if state.last_color.as_ref() == Some(color) {
                log::debug!("send {color}: already current, skipping");
                return SendOutcome::Deduped;
            }
            if let Some(last) = state.last_send {
                if last.elapsed() < settings.rate_limit {
                    log::debug!("send {color}: rate limited");
                    return SendOutcome::RateLimited;
                }
            }
            if let Some(until) = state.backoff_until {
                if Instant::now() < until {
                    log::debug!("send {color}: in backoff window");
                    return SendOutcome::Backoff;
                }
            }
        }

        let (hue, saturation) = color.hsv();
        let direct_ok = {
            let mut direct = lock(&self.direct);
            direct.set_color(hue, saturation, settings.channel_index)
                || (direct.connect() && direct.set_color(hue, saturation, settings.channel_index))
        };

        let mut state = lock(&self.shared.state);
        if direct_ok {
            log::info!("color {color} sent over HID");
            state.record_success(color.clone());
            SendOutcome::Sent
        } else {
            state.pending = Some(color.clone());
            state.generation += 1;
            log::debug!("direct send failed, dispatching {color} to delegate");
            drop(state);
            self.shared.work.notify_one();
            SendOutcome::Dispatched
        }
    }

    pub fn status(&self) -> SenderStatus {
        let connected = lock(&self.direct).is_connected();
        let state = lock(&self.shared.state);
        let now = Instant::now();
        SenderStatus {
            connected,
            last_color: state.last_color.clone(),
            consecutive_errors: state.consecutive_errors,
            backoff_remaining: state
                .backoff_until
                .filter(|until| *until > now)
                .map(|until| until - now),
            pending: state.pending.is_some(),
        }
    }

    /// Apply new gate parameters, e.g. after a config reload.
    pub fn update_settings(&self, settings: SenderSettings) {
        *lock(&self.settings) = settings;
    }

    /// Stop the worker, reclaim any in-flight delegate and close the direct
    /// channel. Idempotent and safe to call from several threads at once;
    /// teardown runs exactly once.
    pub fn shutdown(&self) {
        if !self.teardown.request() {
            return;
        }
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.work.notify_all();
        if let Some(handle) = lock(&self.worker).take() {
            let _ = handle.join();
        }
        lock(&self.direct).disconnect();
        log::info!("hue sender shut down");
    }
}

impl<D, F> Drop for HueSender<D, F> {
    fn drop(&mut self) {
        if !self.teardown.request() {
            return;
        }
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.work.notify_all();
        if let Some(handle) = lock(&self.worker).take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop<F: FallbackChannel>(shared: Arc<Shared<F>>) {
    loop {
        let (color, generation) = {
            let mut state = lock(&shared.state);
            loop {
                if !shared.running.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(color) = state.pending.take() {
                    break (color, state.generation);
                }
                let (guard, _) = shared
                    .work
                    .wait_timeout(state, WORKER_POLL)
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
            }
        };

        let result = shared.fallback.apply(&color, &shared.running);

        let mut state = lock(&shared.state);
        if !shared.running.load(Ordering::SeqCst) {
            return;
        }
        if state.generation != generation {
            // A newer request was dispatched while this one ran; its result
            // is stale either way.
            log::debug!("delegate result for {color} superseded, discarding");
            continue;
        }
        match result {
            Ok(()) => {
                log::info!("color {color} applied via delegate");
                state.record_success(color);
            }
            Err(e) => {
                log::error!("delegate send failed: {e}");
                state.record_failure();
                log::warn!(
                    "send errors: {}, backing off {:?}",
                    state.consecutive_errors,
                    backoff_delay(state.consecutive_errors)
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::mock::{MockChannel, MockFallback};

    fn settings(rate_limit_ms: u64) -> SenderSettings {
        SenderSettings {
            rate_limit: Duration::from_millis(rate_limit_ms),
            channel_index: 0,
        }
    }

    fn green() -> Color {
        Color::parse("green").unwrap()
    }

    fn blue() -> Color {
        Color::parse("blue").unwrap()
    }

    // ── backoff schedule ──

    #[test]
    fn backoff_escalates_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(5));
        assert_eq!(backoff_delay(4), Duration::from_secs(10));
        assert_eq!(backoff_delay(100), Duration::from_secs(10));
    }

    // ── gates ──

    #[test]
    fn direct_send_succeeds_after_inline_connect() {
        let channel = MockChannel::new();
        let inspect = channel.clone();
        let sender = HueSender::new(channel, MockFallback::new(), settings(0));

        assert_eq!(sender.send(&green()), SendOutcome::Sent);
        // Scope the state guard: shutdown() disconnects the mock, which
        // needs the same lock.
        {
            let st = inspect.state();
            assert_eq!(st.connects, 1);
            assert_eq!(st.sent, vec![(85, 255, 0)]);
        }
        sender.shutdown();
    }

    #[test]
    fn identical_color_is_deduped_with_zero_io() {
        let channel = MockChannel::new();
        let inspect = channel.clone();
        let sender = HueSender::new(channel, MockFallback::new(), settings(0));

        assert_eq!(sender.send(&green()), SendOutcome::Sent);
        assert_eq!(sender.send(&green()), SendOutcome::Deduped);
        assert_eq!(inspect.state().sent.len(), 1);
        sender.shutdown();
    }

    #[test]
    fn different_color_inside_window_is_rate_limited() {
        let channel = MockChannel::new();
        let inspect = channel.clone();
        let sender = HueSender::new(channel, MockFallback::new(), settings(10_000));

        assert_eq!(sender.send(&green()), SendOutcome::Sent);
        assert_eq!(sender.send(&blue()), SendOutcome::RateLimited);
        // Rejection leaves state untouched: still deduping on green.
        assert_eq!(sender.send(&green()), SendOutcome::Deduped);
        assert_eq!(inspect.state().sent.len(), 1);
        sender.shutdown();
    }

    #[test]
    fn rate_limit_clears_after_window() {
        let channel = MockChannel::new();
        let sender = HueSender::new(channel, MockFallback::new(), settings(30));

        assert_eq!(sender.send(&green()), SendOutcome::Sent);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(sender.send(&blue()), SendOutcome::Sent);
        sender.shutdown();
    }

    #[test]
    fn status_reflects_sent_color() {
        let sender = HueSender::new(MockChannel::new(), MockFallback::new(), settings(0));
        sender.send(&green());
        let status = sender.status();
        assert!(status.connected);
        assert_eq!(status.last_color, Some(green()));
        assert_eq!(status.consecutive_errors, 0);
        assert!(status.backoff_remaining.is_none());
        sender.shutdown();
    }

    #[test]
    fn update_settings_changes_rate_limit() {
        let sender = HueSender::new(MockChannel::new(), MockFallback::new(), settings(10_000));
        assert_eq!(sender.send(&green()), SendOutcome::Sent);
        assert_eq!(sender.send(&blue()), SendOutcome::RateLimited);
        sender.update_settings(settings(0));
        assert_eq!(sender.send(&blue()), SendOutcome::Sent);
        sender.shutdown();
    }

    #[test]
    fn send_after_shutdown_is_rejected() {
        let sender = HueSender::new(MockChannel::new(), MockFallback::new(), settings(0));
        sender.shutdown();
        assert_eq!(sender.send(&green()), SendOutcome::ShutDown);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let channel = MockChannel::new();
        let inspect = channel.clone();
        let sender = HueSender::new(channel, MockFallback::new(), settings(0));
        sender.send(&green());
        sender.shutdown();
        sender.shutdown();
        assert_eq!(inspect.state().disconnects, 1);
    }

    #[test]
    fn concurrent_shutdowns_tear_down_once() {
        let channel = MockChannel::new();
        let inspect = channel.clone();
        let sender = Arc::new(HueSender::new(channel, MockFallback::new(), settings(0)));
        sender.send(&green());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sender = Arc::clone(&sender);
                std::thread::spawn(move || sender.shutdown())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(inspect.state().disconnects, 1);
    }
}
