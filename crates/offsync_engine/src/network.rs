//! Connectivity tracking.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// The environment became online.
    Online,
    /// The environment became offline.
    Offline,
}

/// What the environment can tell us about connectivity, checked once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityCapability {
    /// The environment reports connectivity; `online` is its current state.
    Available {
        /// Connectivity at construction time.
        online: bool,
    },
    /// The environment has no connectivity signals; the observer stays online.
    Unavailable,
}

/// Callback invoked on each connectivity transition.
pub type ConnectivityListener = Arc<dyn Fn(Connectivity) + Send + Sync>;

/// Handle returned by [`NetworkObserver::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Tracks whether the process is online and notifies listeners on transitions.
///
/// Signals are edge-triggered: a signal that does not change the current
/// state notifies nobody. In an environment without signals the observer
/// reports online forever and ignores signals.
pub struct NetworkObserver {
    online: AtomicBool,
    signals: bool,
    listeners: Mutex<Vec<(ListenerId, ConnectivityListener)>>,
    next_listener: AtomicU64,
    attached: AtomicBool,
    signal_task: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkObserver {
    /// Creates an observer from the environment's capability.
    pub fn new(capability: ConnectivityCapability) -> Self {
        let (online, signals) = match capability {
            ConnectivityCapability::Available { online } => (online, true),
            ConnectivityCapability::Unavailable => (true, false),
        };
        Self {
            online: AtomicBool::new(online),
            signals,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            attached: AtomicBool::new(false),
            signal_task: Mutex::new(None),
        }
    }

    /// Creates an observer that starts online.
    pub fn online() -> Self {
        Self::new(ConnectivityCapability::Available { online: true })
    }

    /// Creates an observer that starts offline.
    pub fn offline() -> Self {
        Self::new(ConnectivityCapability::Available { online: false })
    }

    /// Returns the current connectivity.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Returns true if the environment delivers connectivity signals.
    pub fn has_signals(&self) -> bool {
        self.signals
    }

    /// Registers a listener for connectivity transitions.
    pub fn subscribe(&self, listener: ConnectivityListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Removes a listener. Unknown IDs are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
    }

    /// The environment's "became online" signal.
    ///
    /// Returns true if the state changed and listeners were notified.
    pub fn signal_online(&self) -> bool {
        self.signal(true)
    }

    /// The environment's "became offline" signal.
    ///
    /// Returns true if the state changed and listeners were notified.
    pub fn signal_offline(&self) -> bool {
        self.signal(false)
    }

    fn signal(&self, online: bool) -> bool {
        if !self.signals {
            tracing::trace!(online, "ignoring connectivity signal without signal support");
            return false;
        }
        if self.online.swap(online, Ordering::SeqCst) == online {
            return false;
        }

        let transition = if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };
        tracing::info!(?transition, "connectivity changed");

        // Listeners may call back into the observer
        let listeners: Vec<ConnectivityListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(transition);
        }
        true
    }

    /// Follows an environment signal stream, where `true` means online.
    ///
    /// The current value is applied immediately; each later change is
    /// forwarded to [`NetworkObserver::signal_online`] or
    /// [`NetworkObserver::signal_offline`]. A stream can be attached once per
    /// observer.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyAttached`] on a second call, and
    /// [`SyncError::NoRuntime`] outside a tokio runtime.
    pub fn attach(self: &Arc<Self>, mut signals: watch::Receiver<bool>) -> SyncResult<()> {
        let handle = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        if self.attached.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyAttached);
        }

        let current = *signals.borrow_and_update();
        self.signal(current);

        let observer: Weak<Self> = Arc::downgrade(self);
        let task = handle.spawn(async move {
            while signals.changed().await.is_ok() {
                let online = *signals.borrow_and_update();
                match observer.upgrade() {
                    Some(observer) => {
                        observer.signal(online);
                    }
                    None => break,
                }
            }
            tracing::debug!("connectivity signal stream ended");
        });
        *self.signal_task.lock() = Some(task);
        Ok(())
    }

    /// Removes every listener and stops following an attached signal stream.
    pub fn detach(&self) {
        self.listeners.lock().clear();
        if let Some(task) = self.signal_task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for NetworkObserver {
    fn drop(&mut self) {
        if let Some(task) = self.signal_task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for NetworkObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkObserver")
            .field("online", &self.is_online())
            .field("signals", &self.signals)
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}
