use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::time::Duration;

use super::alerts::engine::{EngineOutput, TriggerEngine};
use super::log_io;
use super::model::LogEvent;

/// Drives an engine over one ordered batch of events. The virtual clock
/// moves in lockstep with event timestamps, so deferred fires interleave
/// with later events exactly as they would live.
pub struct ReplaySession {
    engine: TriggerEngine,
    events: VecDeque<LogEvent>,
    current_sim_time: Duration,
    last_event_time: Option<Duration>,
}

impl ReplaySession {
    pub fn new(engine: TriggerEngine, events: Vec<LogEvent>) -> Self {
        let current_sim_time = engine.now();
        Self {
            engine,
            events: events.into(),
            current_sim_time,
            last_event_time: None,
        }
    }

    pub fn from_capture(engine: TriggerEngine, path: impl AsRef<Path>) -> io::Result<Self> {
        let events = log_io::read_capture(path)?;
        Ok(Self::new(engine, events))
    }

    /// Time of the next unprocessed event.
    pub fn peek_time(&self) -> Option<Duration> {
        self.events.front().map(|e| e.timestamp)
    }

    /// Move the virtual clock forward by `delta`, processing every event and
    /// fire due by then.
    pub fn step(&mut self, delta: Duration) -> EngineOutput {
        self.current_sim_time += delta;
        let mut out = EngineOutput::default();

        while let Some(next_time) = self.peek_time() {
            if next_time > self.current_sim_time {
                break;
            }
            if let Some(event) = self.events.pop_front() {
                out.extend(self.feed(&event));
            }
        }
        out.extend(self.engine.advance_to(self.current_sim_time));
        out
    }

    /// Process every remaining event, then flush fires still pending.
    pub fn run_to_end(&mut self) -> EngineOutput {
        let mut out = EngineOutput::default();
        while let Some(event) = self.events.pop_front() {
            out.extend(self.feed(&event));
        }
        out.extend(self.engine.flush_pending());
        self.current_sim_time = self.current_sim_time.max(self.engine.now());
        out
    }

    fn feed(&mut self, event: &LogEvent) -> EngineOutput {
        if let Some(last) = self.last_event_time {
            if event.timestamp < last {
                log::warn!(
                    "Out-of-order event at {:?} after {:?}; the engine clock does not rewind",
                    event.timestamp,
                    last
                );
            }
        }
        self.last_event_time = Some(event.timestamp);
        self.current_sim_time = self.current_sim_time.max(event.timestamp);
        self.engine.handle_event(event)
    }

    pub fn current_sim_time(&self) -> Duration {
        self.current_sim_time
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    pub fn is_finished(&self) -> bool {
        self.events.is_empty() && self.engine.pending_fires() == 0
    }

    pub fn engine(&self) -> &TriggerEngine {
        &self.engine
    }

    pub fn into_engine(self) -> TriggerEngine {
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::{TextRequest, TriggerDefinition, TriggerSet, ZoneFilter};
    use crate::core::config::EngineConfig;
    use crate::core::model::EventType;
    use crate::core::output::TextSpec;
    use std::fs;
    use tempfile::tempdir;

    fn engine() -> TriggerEngine {
        let mut engine = TriggerEngine::new(EngineConfig::default());
        engine
            .add_trigger_set(
                TriggerSet::new("Replay", ZoneFilter::Any).trigger(
                    TriggerDefinition::new("Delayed Cleave", EventType::StartsUsing)
                        .field("id", "5EA1")
                        .delay(5u32)
                        .alert_text(TextRequest::new(TextSpec::literal("Cleave"))),
                ),
            )
            .unwrap();
        engine
    }

    fn cast(at: u64) -> LogEvent {
        LogEvent::new(Duration::from_secs(at), EventType::StartsUsing).with_field("id", "5EA1")
    }

    #[test]
    fn test_step_releases_fires_on_virtual_clock() {
        let mut session = ReplaySession::new(engine(), vec![cast(10), cast(30)]);
        assert_eq!(session.peek_time(), Some(Duration::from_secs(10)));

        let out = session.step(Duration::from_secs(12));
        assert!(out.alerts.is_empty());
        assert_eq!(session.remaining(), 1);

        let out = session.step(Duration::from_secs(3));
        assert_eq!(out.alerts.len(), 1);
        assert_eq!(out.alerts[0].timestamp, Duration::from_secs(15));
        assert_eq!(session.current_sim_time(), Duration::from_secs(15));
    }

    #[test]
    fn test_run_to_end_flushes_pending() {
        let mut session = ReplaySession::new(engine(), vec![cast(10), cast(30)]);
        let out = session.run_to_end();

        let times: Vec<_> = out.alerts.iter().map(|a| a.timestamp).collect();
        assert_eq!(times, vec![Duration::from_secs(15), Duration::from_secs(35)]);
        assert!(session.is_finished());
        assert_eq!(session.current_sim_time(), Duration::from_secs(35));
    }

    #[test]
    fn test_from_capture() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pull.jsonl");
        fs::write(
            &path,
            "{\"t\": 1, \"type\": \"starts_using\", \"fields\": {\"id\": \"5EA1\"}}\n\
             {\"t\": 2, \"type\": \"starts_using\", \"fields\": {\"id\": \"0000\"}}\n",
        )
        .unwrap();

        let mut session = ReplaySession::from_capture(engine(), &path).unwrap();
        assert_eq!(session.remaining(), 2);
        let out = session.run_to_end();
        assert_eq!(out.alerts.len(), 1);
        assert_eq!(out.alerts[0].text, "Cleave");
    }
}
