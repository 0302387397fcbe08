//! Polling file tail.
//!
//! [`FileTail::open`] opens the path and seeks to the current end, so only
//! lines appended afterwards are read. [`FileTail::run`] then loops:
//!
//! 1. Read up to the next `\n`. A complete line is stripped of `\n` / `\r\n`,
//!    reported as handled, and pushed onto the raw-line queue (blocking while
//!    the queue is full).
//! 2. At end of file, keep any partial line buffered, check for rotation,
//!    then wait for the poll interval (or a change notification) and retry.
//!
//! # Rotation
//!
//! With `follow_rotation` on, every end-of-file pause also `stat`s the path:
//!
//! - **Truncated** (length below the read offset): rewind to offset 0.
//! - **Replaced** (a different inode now lives at the path, unix only): the
//!   old handle has just been read to its end, so reopen the path and read
//!   the new file from the start.
//! - **Missing** (between rename and recreate): keep the old handle.
//!
//! A read error other than end of file ends the source with
//! [`FeedError::Read`]; a broken handle does not heal by retrying.

use crate::watch::ChangeWatcher;
use logship_core::{EventReporter, RawLine};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reading {} failed: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Tail behaviour knobs, usually taken from `[input]` in the config.
#[derive(Debug, Clone)]
pub struct TailOptions {
    pub poll_interval: Duration,
    pub follow_rotation: bool,
    pub watch: bool,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_micros(500),
            follow_rotation: true,
            watch: true,
        }
    }
}

impl From<&logship_core::config::InputConfig> for TailOptions {
    fn from(cfg: &logship_core::config::InputConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            follow_rotation: cfg.follow_rotation,
            watch: cfg.watch,
        }
    }
}

/// Identity of the file behind a path, used to spot replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    #[cfg(unix)]
    fn of(meta: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(_meta: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

/// What an end-of-file rotation check found.
#[derive(Debug, PartialEq, Eq)]
enum Rotation {
    None,
    Truncated,
    Replaced,
}

/// Follows one file and yields the lines appended to it.
pub struct FileTail {
    path: PathBuf,
    reader: BufReader<File>,
    /// Byte offset of the next read in the current file.
    offset: u64,
    identity: Option<FileId>,
    /// Bytes of a line whose newline has not been written yet.
    pending: Vec<u8>,
    options: TailOptions,
    watcher: Option<ChangeWatcher>,
}

impl FileTail {
    /// Open `path` and position at its end. Existing content is skipped.
    pub async fn open(path: impl AsRef<Path>, options: TailOptions) -> Result<Self, FeedError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| FeedError::Open {
            path: path.clone(),
            source,
        };

        let mut file = File::open(&path).await.map_err(open_err)?;
        let offset = file.seek(SeekFrom::End(0)).await.map_err(open_err)?;
        let identity = file.metadata().await.ok().and_then(|m| FileId::of(&m));

        let watcher = if options.watch {
            match ChangeWatcher::new(&path) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "change notifications unavailable; polling only");
                    None
                }
            }
        } else {
            None
        };

        debug!(path = %path.display(), offset, "opened input at end of file");

        Ok(Self {
            path,
            reader: BufReader::new(file),
            offset,
            identity,
            pending: Vec::new(),
            options,
            watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read offset in the file currently being followed.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Wait for the next complete line. Returns `Ok(None)` once `cancel`
    /// fires while waiting for more data.
    pub async fn next_line(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<RawLine>, FeedError> {
        loop {
            let read = self.reader.read_until(b'\n', &mut self.pending).await;
            let n = read.map_err(|source| self.read_err(source))?;
            self.offset += n as u64;

            if self.pending.last() == Some(&b'\n') {
                let mut line = std::mem::take(&mut self.pending);
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(line));
            }

            // End of file, possibly with a partial line held in `pending`.
            if self.options.follow_rotation && self.check_rotation().await? != Rotation::None {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = self.wait_for_data() => {}
            }
        }
    }

    /// Tail until cancelled, pushing every line onto `tx`.
    ///
    /// Each line is counted as handled before it is queued. Stops early
    /// when every receiver of `tx` is gone.
    pub async fn run(
        mut self,
        tx: flume::Sender<RawLine>,
        events: EventReporter,
        cancel: CancellationToken,
    ) -> Result<(), FeedError> {
        info!(path = %self.path.display(), offset = self.offset, "tailing input");

        while let Some(line) = self.next_line(&cancel).await? {
            events.line_handled();

            tokio::select! {
                sent = tx.send_async(line) => {
                    if sent.is_err() {
                        debug!("raw-line queue has no consumers left");
                        break;
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }

        info!(path = %self.path.display(), "input source stopped");
        Ok(())
    }

    async fn wait_for_data(&self) {
        let poll = tokio::time::sleep(self.options.poll_interval);
        match &self.watcher {
            Some(watcher) => {
                tokio::select! {
                    _ = poll => {}
                    _ = watcher.changed() => {}
                }
            }
            None => poll.await,
        }
    }

    async fn check_rotation(&mut self) -> Result<Rotation, FeedError> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            // Mid-rotation: keep reading the old handle until the path reappears.
            Err(_) => return Ok(Rotation::None),
        };

        let current = FileId::of(&meta);
        if current.is_some() && current != self.identity {
            let file = match File::open(&self.path).await {
                Ok(file) => file,
                Err(e) => {
                    debug!(path = %self.path.display(), error = %e, "replacement not openable yet");
                    return Ok(Rotation::None);
                }
            };
            if !self.pending.is_empty() {
                warn!(
                    path = %self.path.display(),
                    bytes = self.pending.len(),
                    "discarding unterminated line from rotated file"
                );
            }
            info!(path = %self.path.display(), "input file replaced; following new file");
            self.reader = BufReader::new(file);
            self.identity = current;
            self.offset = 0;
            self.pending.clear();
            return Ok(Rotation::Replaced);
        }

        if meta.len() < self.offset {
            warn!(
                path = %self.path.display(),
                previous_offset = self.offset,
                current_size = meta.len(),
                "input file truncated; reading from start"
            );
            let rewound = self.reader.seek(SeekFrom::Start(0)).await;
            rewound.map_err(|source| self.read_err(source))?;
            self.offset = 0;
            self.pending.clear();
            return Ok(Rotation::Truncated);
        }

        Ok(Rotation::None)
    }

    fn read_err(&self, source: std::io::Error) -> FeedError {
        FeedError::Read {
            path: self.path.clone(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
