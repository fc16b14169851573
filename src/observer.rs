//! Periodic change polling for a [`Configuration`].
//!
//! A [`ChangeObserver`] keeps a baseline snapshot of
//! [`Configuration::properties`], compares it with a fresh snapshot on every
//! tick and publishes the difference to its listeners as a
//! [`ConfigurationChange`].

use crate::change::ConfigurationChange;
use crate::config::Configuration;
use crate::error::{ConfigError, ConfigResult};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Callback invoked with every non-empty change.
pub type ChangeListener = Arc<dyn Fn(&ConfigurationChange) + Send + Sync>;

/// How listeners are invoked when a change is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// On the publishing thread, one listener after the other.
    #[default]
    Sync,
    /// One detached thread per listener.
    Async,
}

/// Timing and dispatch settings of a [`ChangeObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverSettings {
    pub period: Duration,
    pub initial_delay: Duration,
    pub dispatch: Dispatch,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(2000),
            initial_delay: Duration::from_millis(5000),
            dispatch: Dispatch::Sync,
        }
    }
}

struct Shared {
    configuration: Configuration,
    baseline: Mutex<HashMap<String, String>>,
    listeners: ArcSwap<Vec<ChangeListener>>,
    dispatch: Dispatch,
}

impl Shared {
    fn check_for_changes(&self) -> Option<ConfigurationChange> {
        let current = self.configuration.properties();
        let change = {
            let mut baseline = self.baseline.lock().unwrap_or_else(|e| e.into_inner());
            let change = ConfigurationChange::builder()
                .compare(&baseline, &current)
                .build();
            *baseline = current;
            change
        };

        if change.is_empty() {
            return None;
        }
        debug!(
            version = %change.version(),
            changes = change.len(),
            "configuration change detected"
        );
        self.fire(&change);
        Some(change)
    }

    fn fire(&self, change: &ConfigurationChange) {
        let listeners = self.listeners.load_full();
        match self.dispatch {
            Dispatch::Sync => {
                for listener in listeners.iter() {
                    notify(listener, change);
                }
            }
            Dispatch::Async => {
                for listener in listeners.iter() {
                    let listener = Arc::clone(listener);
                    let change = change.clone();
                    thread::spawn(move || notify(&listener, &change));
                }
            }
        }
    }
}

fn notify(listener: &ChangeListener, change: &ConfigurationChange) {
    if panic::catch_unwind(AssertUnwindSafe(|| listener(change))).is_err() {
        warn!(version = %change.version(), "change listener panicked");
    }
}

struct Running {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Polls a configuration for changes, either on demand or on a timer thread.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use tamaya::{ChangeObserver, Configuration, MapPropertySource};
///
/// let source = Arc::new(MapPropertySource::new("runtime").with_ordinal(100));
/// let config = Configuration::builder().add_shared_source(source.clone()).build().unwrap();
/// let observer = ChangeObserver::new(config);
///
/// source.set("feature.enabled", "true");
/// let change = observer.check_for_changes().unwrap();
/// assert!(change.is_key_affected("feature.enabled"));
/// assert!(observer.check_for_changes().is_none());
/// ```
pub struct ChangeObserver {
    shared: Arc<Shared>,
    settings: ObserverSettings,
    running: Mutex<Option<Running>>,
}

impl ChangeObserver {
    /// Creates an observer with default settings, taking the current
    /// properties as baseline.
    pub fn new(configuration: Configuration) -> Self {
        Self::with_settings(configuration, ObserverSettings::default())
    }

    pub fn with_settings(configuration: Configuration, settings: ObserverSettings) -> Self {
        let baseline = configuration.properties();
        Self {
            shared: Arc::new(Shared {
                configuration,
                baseline: Mutex::new(baseline),
                listeners: ArcSwap::from_pointee(Vec::new()),
                dispatch: settings.dispatch,
            }),
            settings,
            running: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &ObserverSettings {
        &self.settings
    }

    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&ConfigurationChange) + Send + Sync + 'static,
    {
        let listener: ChangeListener = Arc::new(listener);
        self.shared.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&listener));
            next
        });
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.load().len()
    }

    /// Takes one snapshot, compares it with the baseline and publishes the
    /// difference if there is one. The new snapshot becomes the baseline.
    pub fn check_for_changes(&self) -> Option<ConfigurationChange> {
        self.shared.check_for_changes()
    }

    /// Publishes a change to all listeners without touching the baseline.
    pub fn fire(&self, change: &ConfigurationChange) {
        self.shared.fire(change);
    }

    /// Starts the timer thread.
    ///
    /// The first poll happens after `initial_delay`, then every `period`.
    ///
    /// # Errors
    /// Returns [`ConfigError::Observer`] if the observer is already running
    /// or the thread cannot be spawned.
    pub fn start(&self) -> ConfigResult<()> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return Err(ConfigError::Observer("observer is already running".to_string()));
        }

        let (stop, stop_receiver) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let initial_delay = self.settings.initial_delay;
        let period = self.settings.period;

        let handle = thread::Builder::new()
            .name("tamaya-change-observer".to_string())
            .spawn(move || {
                let mut wait = initial_delay;
                loop {
                    match stop_receiver.recv_timeout(wait) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            shared.check_for_changes();
                            wait = period;
                        }
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| ConfigError::Observer(format!("failed to spawn observer thread: {e}")))?;

        *running = Some(Running { stop, handle });
        Ok(())
    }

    /// Stops the timer thread and waits for it to finish. Does nothing if the
    /// observer is not running.
    pub fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(Running { stop, handle }) = running {
            let _ = stop.send(());
            if handle.join().is_err() {
                warn!("change observer thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl Drop for ChangeObserver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_source::MapPropertySource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn observed() -> (Arc<MapPropertySource>, Configuration) {
        let source = Arc::new(MapPropertySource::new("runtime").with_ordinal(100).with_value("a", "1"));
        let config = Configuration::builder()
            .add_shared_source(source.clone())
            .build()
            .unwrap();
        (source, config)
    }

    fn fast(dispatch: Dispatch) -> ObserverSettings {
        ObserverSettings {
            period: Duration::from_millis(20),
            initial_delay: Duration::from_millis(0),
            dispatch,
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = ObserverSettings::default();
        assert_eq!(settings.period, Duration::from_millis(2000));
        assert_eq!(settings.initial_delay, Duration::from_millis(5000));
        assert_eq!(settings.dispatch, Dispatch::Sync);
    }

    #[test]
    fn test_no_change_without_modification() {
        let (_, config) = observed();
        let observer = ChangeObserver::new(config);
        assert!(observer.check_for_changes().is_none());
    }

    #[test]
    fn test_check_for_changes_notifies_listeners() {
        let (source, config) = observed();
        let observer = ChangeObserver::new(config);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        observer.add_listener(move |change| {
            sink.lock().unwrap().push(change.clone());
        });

        source.set("a", "2");
        source.set("b", "3");
        let change = observer.check_for_changes().unwrap();
        assert_eq!(change.updated().len(), 1);
        assert_eq!(change.added().len(), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].version(), change.version());
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let (source, config) = observed();
        let observer = ChangeObserver::new(config);
        let calls = Arc::new(AtomicUsize::new(0));
        observer.add_listener(|_| panic!("listener failure"));
        let counter = Arc::clone(&calls);
        observer.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        source.remove("a");
        let change = observer.check_for_changes().unwrap();
        assert_eq!(change.removed().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fire_publishes_manual_change() {
        let (_, config) = observed();
        let observer = ChangeObserver::new(config);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        observer.add_listener(move |change| {
            assert!(change.is_key_affected("manual"));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        observer.fire(&ConfigurationChange::builder().added("manual", "x").build());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timer_thread_detects_changes() {
        let (source, config) = observed();
        let observer = ChangeObserver::with_settings(config, fast(Dispatch::Sync));
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        observer.add_listener(move |change| {
            let _ = tx.lock().unwrap().send(change.clone());
        });

        observer.start().unwrap();
        assert!(observer.is_running());
        source.set("a", "changed");

        let change = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            change.change("a").unwrap().new_value.as_deref(),
            Some("changed")
        );

        observer.stop();
        assert!(!observer.is_running());
    }

    #[test]
    fn test_async_dispatch() {
        let (source, config) = observed();
        let observer = ChangeObserver::with_settings(config, fast(Dispatch::Async));
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        observer.add_listener(move |change| {
            let _ = tx.lock().unwrap().send(change.len());
        });

        source.set("c", "new");
        observer.check_for_changes().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    }

    #[test]
    fn test_start_twice_fails() {
        let (_, config) = observed();
        let observer = ChangeObserver::with_settings(config, fast(Dispatch::Sync));
        observer.start().unwrap();
        let err = observer.start().unwrap_err();
        assert!(matches!(err, ConfigError::Observer(_)));
        observer.stop();
        observer.stop();
    }
}
