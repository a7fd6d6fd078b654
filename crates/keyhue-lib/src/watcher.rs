//! Layout watcher — polls the active keyboard layout and drives the sender.
//!
//! The watcher thread ticks at the configured poll interval: read the layout
//! tag, resolve it to a color expression, report to the status sink and hand
//! the color to the sender. All sleeps are chunked against the running flag
//! so stop() returns quickly regardless of the interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::channel::DeviceChannel;
use crate::color::Color;
use crate::config::Config;
use crate::process::FallbackChannel;
use crate::sender::{HueSender, SenderSettings};

/// Pause after a bad color expression before polling again.
const ERROR_COOLDOWN: Duration = Duration::from_secs(1);

/// Provider of the currently active keyboard layout tag, e.g. "en-US".
pub trait LayoutSource: Send + Sync {
    /// `None` when the layout cannot be determined.
    fn current_layout(&self) -> Option<String>;
}

/// Consumer of watcher state, e.g. a log line or a tray tooltip.
pub trait StatusSink: Send + Sync {
    fn update(&self, layout: Option<&str>, color: &str);
}

/// Handle to the running watcher thread.
pub struct LayoutWatcher {
    running: Arc<AtomicBool>,
    config: Arc<RwLock<Config>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LayoutWatcher {
    /// Start the watcher thread.
    pub fn spawn<D, F, L, S>(
        sender: Arc<HueSender<D, F>>,
        layout: L,
        status: S,
        config: Config,
    ) -> LayoutWatcher
    where
        D: DeviceChannel + Send + 'static,
        F: FallbackChannel + 'static,
        L: LayoutSource + 'static,
        S: StatusSink + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let config = Arc::new(RwLock::new(config));
        let thread = {
            let running = Arc::clone(&running);
            let config = Arc::clone(&config);
            thread::spawn(move || watch_loop(sender, layout, status, config, running))
        };
        LayoutWatcher {
            running,
            config,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Swap in a new configuration; takes effect on the next tick.
    pub fn update_config(&self, config: Config) {
        let mut guard = self
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = config;
    }

    /// Stop the watcher and wait for its thread.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = lock(&self.thread).take() {
            let _ = handle.join();
        }
    }
}

fn watch_loop<D, F, L, S>(
    sender: Arc<HueSender<D, F>>,
    layout: L,
    status: S,
    config: Arc<RwLock<Config>>,
    running: Arc<AtomicBool>,
) where
    D: DeviceChannel + Send + 'static,
    F: FallbackChannel + 'static,
    L: LayoutSource,
    S: StatusSink,
{
    log::info!("layout watcher started");
    while running.load(Ordering::SeqCst) {
        let (interval, enabled, rate_limit) = {
            let cfg = config.read().unwrap_or_else(PoisonError::into_inner);
            (
                Duration::from_millis(cfg.poll_interval_ms),
                cfg.enabled,
                Duration::from_millis(cfg.rate_limit_ms),
            )
        };
        sender.update_settings(SenderSettings {
            rate_limit,
            channel_index: 0,
        });

        let tag = layout.current_layout();
        let expression = {
            let cfg = config.read().unwrap_or_else(PoisonError::into_inner);
            cfg.color_for_layout(tag.as_deref())
        };
        status.update(tag.as_deref(), &expression);

        if enabled {
            match Color::parse(&expression) {
                Ok(color) => {
                    let outcome = sender.send(&color);
                    log::trace!("tick: layout {tag:?} -> {expression}, {outcome:?}");
                }
                Err(e) => {
                    log::error!("configured color \"{expression}\" is invalid: {e}");
                    sleep_while(&running, ERROR_COOLDOWN);
                    continue;
                }
            }
        }

        sleep_while(&running, interval);
    }
    log::info!("layout watcher stopped");
}

/// Sleep up to `duration`, waking early when `running` clears.
fn sleep_while(running: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(100)));
    }
}
