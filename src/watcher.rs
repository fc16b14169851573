//! File system watching for file-backed property sources.
//!
//! A [`FileWatcher`] reloads every registered [`FilePropertySource`] when one
//! of the watched files changes and then runs the registered callbacks. Pair
//! it with a [`ChangeObserver`](crate::observer::ChangeObserver) to turn
//! file edits into [`ConfigurationChange`](crate::change::ConfigurationChange)
//! events.

use crate::error::{ConfigError, ConfigResult};
use crate::file_source::FilePropertySource;
use crate::source::PropertySource;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Callback run after every file system event, with the names of the
/// sources whose content changed (possibly none).
pub type ConfigChangeCallback = Arc<dyn Fn(&[String]) + Send + Sync>;

type EventReceiver = mpsc::Receiver<notify::Result<Event>>;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Handlers {
    sources: Mutex<Vec<Arc<FilePropertySource>>>,
    callbacks: Mutex<Vec<ConfigChangeCallback>>,
}

impl Handlers {
    fn handle(&self, event: &Event) -> Vec<String> {
        debug!(kind = ?event.kind, paths = ?event.paths, "file system event");
        let sources = self.sources.lock().unwrap_or_else(|e| e.into_inner()).clone();

        let mut changed = Vec::new();
        for source in sources {
            match source.reload() {
                Ok(true) => changed.push(source.name().to_string()),
                Ok(false) => {}
                Err(error) => warn!(
                    source = source.name(),
                    error = %error,
                    "failed to reload property source, keeping previous content"
                ),
            }
        }

        let callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner()).clone();
        for callback in callbacks {
            callback(&changed);
        }
        changed
    }
}

struct Worker {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Manages file system watching for configuration files.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    receiver: Arc<Mutex<EventReceiver>>,
    watched_files: Vec<PathBuf>,
    handlers: Arc<Handlers>,
    worker: Option<Worker>,
}

impl FileWatcher {
    /// Creates a new file watcher for the specified path.
    ///
    /// # Errors
    /// Returns [`ConfigError::FileWatch`] if the path does not exist or the
    /// platform watcher cannot be created.
    pub fn new<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let mut watcher = Self::new_empty()?;
        watcher.watch_file(path)?;
        Ok(watcher)
    }

    /// Creates a new file watcher without watching any files initially.
    pub fn new_empty() -> ConfigResult<Self> {
        let (sender, receiver) = mpsc::channel();
        let watcher = notify::recommended_watcher(sender)?;

        Ok(Self {
            watcher,
            receiver: Arc::new(Mutex::new(receiver)),
            watched_files: Vec::new(),
            handlers: Arc::new(Handlers::default()),
            worker: None,
        })
    }

    /// Adds a file to be watched.
    pub fn watch_file<P: AsRef<Path>>(&mut self, path: P) -> ConfigResult<()> {
        let path_buf = path.as_ref().to_path_buf();

        if !path_buf.exists() {
            return Err(ConfigError::file_watch(format!(
                "Cannot watch non-existent file: {}",
                path_buf.display()
            )));
        }
        if self.watched_files.contains(&path_buf) {
            return Ok(());
        }

        self.watcher.watch(&path_buf, RecursiveMode::NonRecursive)?;
        self.watched_files.push(path_buf);
        Ok(())
    }

    /// Watches the file behind `source` and reloads the source whenever a
    /// watched file changes.
    pub fn watch_source(&mut self, source: Arc<FilePropertySource>) -> ConfigResult<()> {
        self.watch_file(source.file_path())?;
        self.handlers
            .sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(source);
        Ok(())
    }

    /// Removes a file from being watched, together with any source backed by it.
    pub fn unwatch_file<P: AsRef<Path>>(&mut self, path: P) -> ConfigResult<()> {
        let path_buf = path.as_ref().to_path_buf();

        self.watcher.unwatch(&path_buf)?;
        self.watched_files.retain(|p| p != &path_buf);
        self.handlers
            .sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|source| source.file_path() != path_buf);
        Ok(())
    }

    /// Gets the list of currently watched files.
    pub fn watched_files(&self) -> &[PathBuf] {
        &self.watched_files
    }

    /// Registers a callback to be called after file changes are processed.
    pub fn on_config_change<F>(&self, callback: F)
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        self.handlers
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Starts processing file system events on a background thread.
    ///
    /// Calling this while already watching is a no-op.
    pub fn start_watching(&mut self) -> ConfigResult<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (stop, stop_receiver) = mpsc::channel::<()>();
        let receiver = Arc::clone(&self.receiver);
        let handlers = Arc::clone(&self.handlers);

        let handle = thread::Builder::new()
            .name("tamaya-file-watcher".to_string())
            .spawn(move || loop {
                match stop_receiver.try_recv() {
                    Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
                    Err(mpsc::TryRecvError::Empty) => {}
                }

                let next = receiver
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .recv_timeout(POLL_INTERVAL);
                match next {
                    Ok(Ok(event)) => {
                        handlers.handle(&event);
                    }
                    Ok(Err(error)) => warn!(error = %error, "file watch error"),
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| ConfigError::file_watch(format!("failed to spawn watcher thread: {e}")))?;

        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    /// Stops the background thread and waits for it to exit.
    pub fn stop_watching(&mut self) {
        if let Some(Worker { stop, handle }) = self.worker.take() {
            let _ = stop.send(());
            if handle.join().is_err() {
                warn!("file watcher thread panicked");
            }
        }
    }

    /// Returns whether the background thread is active.
    pub fn is_watching(&self) -> bool {
        self.worker.is_some()
    }

    /// Waits up to `timeout` for one file system event and processes it.
    ///
    /// Returns `Ok(true)` if an event was processed. Meant for manual
    /// polling; with [`start_watching`](Self::start_watching) active the
    /// background thread usually consumes events first.
    pub fn check_for_changes(&self, timeout: Duration) -> ConfigResult<bool> {
        let next = self
            .receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .recv_timeout(timeout);
        match next {
            Ok(Ok(event)) => {
                self.handlers.handle(&event);
                Ok(true)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(false),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(ConfigError::file_watch("Watcher disconnected"))
            }
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop_watching();
    }
}
