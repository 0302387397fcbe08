//! Event reporting channel between pipeline stages and the monitor.
//!
//! Stages hold a cloneable [`EventReporter`] and fire [`PipelineEvent`]s into
//! an unbounded channel. Sending never waits, so a slow monitor cannot stall
//! ingestion. The monitor owns the matching [`EventReceiver`] and is the only
//! place the counts are kept.

use crate::types::PipelineEvent;
use tokio::sync::mpsc;

/// Receiving half, owned by the monitor.
pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Create a reporter/receiver pair.
pub fn event_channel() -> (EventReporter, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventReporter { tx }, rx)
}

/// Sending half, cloned into every stage that reports events.
#[derive(Debug, Clone)]
pub struct EventReporter {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl EventReporter {
    /// Report one event. A closed monitor is not an error for the caller.
    pub fn report(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn line_handled(&self) {
        self.report(PipelineEvent::LineHandled);
    }

    pub fn parse_error(&self) {
        self.report(PipelineEvent::ParseError);
    }

    /// A reporter whose events go nowhere. Useful when a stage runs without
    /// a monitor attached.
    pub fn detached() -> Self {
        let (reporter, _rx) = event_channel();
        reporter
    }
}
