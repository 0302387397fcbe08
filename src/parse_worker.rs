//! Parser worker loop.
//!
//! Any number of these pull from the same raw-line queue. Once more than one
//! runs, records reach the record queue in whatever order the workers finish
//! them; line order is only kept with a single worker.

use logship_core::{parse_line, EventReporter, LogRecord, RawLine};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    pub parsed: u64,
    pub dropped: u64,
}

/// Parse lines until the raw queue is closed and empty, or until nobody is
/// left to take records.
pub async fn run_parser(
    id: usize,
    rx: flume::Receiver<RawLine>,
    tx: flume::Sender<LogRecord>,
    events: EventReporter,
) -> ParserStats {
    let mut stats = ParserStats::default();

    while let Ok(line) = rx.recv_async().await {
        let record = match parse_line(&line) {
            Ok(record) => record,
            Err(e) => {
                stats.dropped += 1;
                events.parse_error();
                warn!(
                    parser = id,
                    error = %e,
                    line = %String::from_utf8_lossy(&line),
                    "dropping unparseable line"
                );
                continue;
            }
        };

        if tx.send_async(record).await.is_err() {
            warn!(parser = id, "record queue closed, parser stopping");
            break;
        }
        stats.parsed += 1;
    }

    debug!(parser = id, parsed = stats.parsed, dropped = stats.dropped, "parser finished");
    stats
}
