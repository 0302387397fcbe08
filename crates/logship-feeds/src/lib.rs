//! logship-feeds — line sources for logship.
//!
//! A source follows its input, pushes each new [`RawLine`](logship_core::RawLine)
//! onto the bounded raw-line queue, and reports every line it reads to the
//! monitor. Pushing blocks while the queue is full, so a slow parser pool
//! slows the read loop instead of losing lines.
//!
//! Only a single-file polling tail is provided ([`file::FileTail`]).

pub mod file;
pub mod watch;

pub use file::{FeedError, FileTail, TailOptions};
