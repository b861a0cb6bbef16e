use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::alerts::engine::{EngineOutput, TriggerEngine};
use super::log_io::CaptureTailer;
use super::model::{Alert, LogEvent, ZoneId};

/// Messages from the ingestion side to the live engine task.
#[derive(Debug)]
pub enum LiveCommand {
    Event(LogEvent),
    ActivateZone(ZoneId),
    Shutdown,
}

/// Maps log time onto the wall clock: log time advances with real time
/// elapsed since the last event was seen.
#[derive(Debug, Default)]
struct LiveClock {
    last_event_timestamp: Option<Duration>,
    last_event_wallclock: Option<Instant>,
}

impl LiveClock {
    fn observe(&mut self, timestamp: Duration) {
        self.last_event_timestamp = Some(match self.last_event_timestamp {
            Some(prev) => prev.max(timestamp),
            None => timestamp,
        });
        self.last_event_wallclock = Some(Instant::now());
    }

    /// Projected log time right now.
    fn now(&self) -> Option<Duration> {
        match (self.last_event_timestamp, self.last_event_wallclock) {
            (Some(timestamp), Some(seen_at)) => Some(timestamp + seen_at.elapsed()),
            (Some(timestamp), None) => Some(timestamp),
            (None, _) => None,
        }
    }

    /// Wall-clock instant at which log time reaches `at`.
    fn deadline_for(&self, at: Duration) -> Option<Instant> {
        match (self.last_event_timestamp, self.last_event_wallclock) {
            (Some(timestamp), Some(seen_at)) => Some(seen_at + at.saturating_sub(timestamp)),
            _ => None,
        }
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Forward alerts; false once nobody is listening.
async fn deliver(alerts: &mpsc::Sender<Alert>, out: EngineOutput) -> bool {
    for alert in out.alerts {
        if alerts.send(alert).await.is_err() {
            return false;
        }
    }
    true
}

/// Run an engine against a live command stream until the channel closes,
/// `Shutdown` arrives or the alert receiver goes away. Deferred fires are
/// released by a wall-clock timer.
pub async fn run_live(
    mut engine: TriggerEngine,
    mut commands: mpsc::Receiver<LiveCommand>,
    alerts: mpsc::Sender<Alert>,
) -> TriggerEngine {
    let mut clock = LiveClock::default();

    loop {
        let wake = engine
            .next_fire_time()
            .and_then(|at| clock.deadline_for(at));

        tokio::select! {
            command = commands.recv() => match command {
                Some(LiveCommand::Event(event)) => {
                    clock.observe(event.timestamp);
                    let out = engine.handle_event(&event);
                    if !deliver(&alerts, out).await {
                        break;
                    }
                }
                Some(LiveCommand::ActivateZone(zone)) => engine.activate_zone(zone),
                Some(LiveCommand::Shutdown) | None => break,
            },
            () = sleep_until_some(wake) => {
                if let Some(now) = clock.now() {
                    let out = engine.advance_to(now);
                    if !deliver(&alerts, out).await {
                        break;
                    }
                }
            }
        }
    }

    log::info!("Live session stopped with {} pending fires", engine.pending_fires());
    engine
}

/// Channels and task of a spawned live session.
pub struct LiveHandle {
    pub commands: mpsc::Sender<LiveCommand>,
    pub alerts: mpsc::Receiver<Alert>,
    pub task: JoinHandle<TriggerEngine>,
}

pub fn spawn_live(engine: TriggerEngine, buffer: usize) -> LiveHandle {
    let (command_tx, command_rx) = mpsc::channel(buffer);
    let (alert_tx, alert_rx) = mpsc::channel(buffer);
    let task = tokio::spawn(run_live(engine, command_rx, alert_tx));
    LiveHandle {
        commands: command_tx,
        alerts: alert_rx,
        task,
    }
}

/// Poll a growing capture and forward its events until the engine task
/// stops listening.
pub async fn tail_capture(
    mut capture: CaptureTailer,
    commands: mpsc::Sender<LiveCommand>,
    poll_interval: Duration,
) -> io::Result<()> {
    let mut ticker = time::interval(poll_interval);
    log::info!("Started tracking {:?}", capture.path());

    loop {
        ticker.tick().await;
        for event in capture.read_new_events()? {
            if commands.send(LiveCommand::Event(event)).await.is_err() {
                return Ok(());
            }
        }
        if commands.is_closed() {
            return Ok(());
        }
    }
}

/// Hand a live session's alerts to `sink` until the engine stops, the tail
/// task ends or `stop` resolves. A failed tail task is an error; either way
/// the engine is shut down and handed back.
pub async fn supervise(
    live: LiveHandle,
    mut tail: JoinHandle<io::Result<()>>,
    stop: impl Future<Output = ()>,
    mut sink: impl FnMut(Alert) -> io::Result<()>,
) -> io::Result<TriggerEngine> {
    let LiveHandle {
        commands,
        mut alerts,
        task,
    } = live;
    tokio::pin!(stop);
    let mut outcome = Ok(());
    let mut tail_finished = false;

    loop {
        tokio::select! {
            alert = alerts.recv() => match alert {
                Some(alert) => {
                    if let Err(e) = sink(alert) {
                        outcome = Err(e);
                        break;
                    }
                }
                None => break,
            },
            joined = &mut tail => {
                tail_finished = true;
                outcome = joined.unwrap_or_else(|e| Err(io::Error::other(e)));
                match &outcome {
                    Ok(()) => log::info!("Capture tailing stopped"),
                    Err(e) => log::error!("Capture tailing failed: {}", e),
                }
                break;
            }
            () = &mut stop => {
                log::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    if !tail_finished {
        tail.abort();
    }
    // Unblocks an engine stuck delivering; it may also be gone already.
    drop(alerts);
    let _ = commands.send(LiveCommand::Shutdown).await;
    let engine = task.await.map_err(io::Error::other)?;
    outcome.map(|()| engine)
}
