//! Typed publish/subscribe interface (spec §9 redesign guidance), replacing
//! the source's analytics/whitelist event-emitter pattern with a small named
//! set of events and a sink trait implementations can back with channels or
//! callback lists.

use crate::scoring::Verdict;

#[derive(Debug, Clone)]
pub enum Event {
    ReportGenerated { summary: String },
    EntryAdded { id: String },
    EntriesExpired { count: usize },
    DetectionEvent { correlation_id: String, suspicion_score: u32, is_suspicious: bool },
    ErrorEvent { component: String, message: String },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Default sink; production wiring swaps this for something that forwards
/// to a channel, metrics counter, or log line.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: Event) {}
}

pub struct ChannelSink {
    sender: std::sync::mpsc::Sender<Event>,
}

impl ChannelSink {
    pub fn new() -> (Self, std::sync::mpsc::Receiver<Event>) {
        let (sender, receiver) = std::sync::mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

pub fn detection_event(verdict: &Verdict, correlation_id: &str) -> Event {
    Event::DetectionEvent {
        correlation_id: correlation_id.to_string(),
        suspicion_score: verdict.suspicion_score,
        is_suspicious: verdict.is_suspicious,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_delivers_emitted_events() {
        let (sink, receiver) = ChannelSink::new();
        sink.emit(Event::EntryAdded { id: "entry-1".to_string() });
        match receiver.recv().unwrap() {
            Event::EntryAdded { id } => assert_eq!(id, "entry-1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn noop_sink_never_panics() {
        NoopSink.emit(Event::EntriesExpired { count: 3 });
    }
}
