//! Filesystem change notifications used to wake the tail loop early.
//!
//! The tail always polls; a [`ChangeWatcher`] only shortens the wait when
//! the OS reports activity in the file's directory. Spurious wake-ups are
//! harmless, the loop simply finds nothing new and goes back to waiting.

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Notify;

/// Keeps a platform watcher alive and turns its callbacks into an awaitable
/// signal.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
    signal: Arc<Notify>,
}

impl ChangeWatcher {
    /// Watch the directory containing `path` (non-recursive). Watching the
    /// directory rather than the file keeps notifications flowing across
    /// rename-and-recreate rotation.
    pub fn new(path: &Path) -> notify::Result<Self> {
        let signal = Arc::new(Notify::new());
        let tx = Arc::clone(&signal);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    // Stores a permit when nobody is waiting yet.
                    tx.notify_one();
                }
            }
        })?;

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            signal,
        })
    }

    /// Resolve on the next reported change (or immediately if one arrived
    /// since the last call).
    pub async fn changed(&self) {
        self.signal.notified().await;
    }
}
