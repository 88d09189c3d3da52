//! Upstream poller and change detector.
//!
//! Turns periodic snapshot fetches into a sparse stream of [`TrackEvent`]s
//! and adapts its own cadence to upstream failures. Exactly one poller runs
//! per producer process; any number of consumers attach through
//! [`Poller::subscribe`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::ErrorCode;
use crate::track::Track;
use crate::upstream::UpstreamError;

/// Source of "now playing" snapshots.
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Fetches the current snapshot.
    async fn fetch(&self) -> Result<Track, UpstreamError>;

    /// Fetches the most recently finished track.
    async fn recently_played(&self) -> Result<Track, UpstreamError> {
        Err(UpstreamError::NoHistory)
    }
}

/// Event emitted when a poll observes something worth reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEvent {
    /// The track identity changed; carries the full new snapshot.
    Change(Arc<Track>),
    /// The playing flag flipped while the track stayed the same.
    Status(bool),
    /// Playback progress of the current snapshot, in milliseconds.
    Progress(u64),
}

/// Linear backoff for the poll interval.
///
/// Each failure adds one step, up to `max_steps` above the default. The only
/// way back down is [`record_playing`](Self::record_playing).
#[derive(Debug, Clone)]
pub struct PollRate {
    default: Duration,
    step: Duration,
    max_steps: u32,
    steps: u32,
}

impl PollRate {
    pub fn new(default: Duration, step: Duration, max_steps: u32) -> Self {
        Self {
            default,
            step,
            max_steps,
            steps: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.poll_interval(), config.poll_step(), config.poll_max_steps)
    }

    /// Interval until the next poll.
    pub fn current(&self) -> Duration {
        self.default + self.step * self.steps
    }

    pub fn default_interval(&self) -> Duration {
        self.default
    }

    /// Slows polling down after a failed fetch. Returns the new interval.
    pub fn record_failure(&mut self) -> Duration {
        self.steps = (self.steps + 1).min(self.max_steps);
        self.current()
    }

    /// Returns to the default interval while something is playing.
    pub fn record_playing(&mut self) {
        self.steps = 0;
    }
}

/// Compares two consecutive snapshots.
///
/// A cold start (no previous snapshot) produces nothing. Otherwise an
/// identity change yields [`TrackEvent::Change`], a play/pause flip on the
/// same track yields [`TrackEvent::Status`], and any snapshot carrying
/// progress yields [`TrackEvent::Progress`], in that order.
pub fn detect_changes(prev: Option<&Track>, next: &Arc<Track>) -> Vec<TrackEvent> {
    let Some(prev) = prev else {
        return Vec::new();
    };

    let mut events = Vec::with_capacity(2);
    if !prev.same_track(next) {
        events.push(TrackEvent::Change(Arc::clone(next)));
    } else if prev.is_playing != next.is_playing {
        events.push(TrackEvent::Status(next.is_playing));
    }
    if let Some(progress) = next.progress() {
        events.push(TrackEvent::Progress(progress));
    }
    events
}

/// Polls a [`TrackSource`] and fans change events out to subscribers.
pub struct Poller {
    source: Arc<dyn TrackSource>,
    rate: Mutex<PollRate>,
    current: RwLock<Option<Arc<Track>>>,
    events: broadcast::Sender<TrackEvent>,
}

impl Poller {
    pub fn new(source: Arc<dyn TrackSource>, config: &Config) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            source,
            rate: Mutex::new(PollRate::from_config(config)),
            current: RwLock::new(None),
            events,
        }
    }

    /// Attaches a new consumer to the event feed.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackEvent> {
        self.events.subscribe()
    }

    /// Last successfully fetched snapshot.
    pub fn current(&self) -> Option<Arc<Track>> {
        self.current.read().clone()
    }

    /// Current poll interval.
    pub fn interval(&self) -> Duration {
        self.rate.lock().current()
    }

    /// Passes a history query straight to the source, outside the poll cadence.
    pub async fn recently_played(&self) -> Result<Track, UpstreamError> {
        self.source.recently_played().await
    }

    /// Runs one poll: fetch, compare, store, publish.
    ///
    /// Returns the events that were published. A failed fetch publishes
    /// nothing, keeps the previous snapshot and slows polling down.
    pub async fn tick(&self) -> Vec<TrackEvent> {
        let next = match self.source.fetch().await {
            Ok(track) => Arc::new(track),
            Err(e) => {
                let interval = self.rate.lock().record_failure();
                log::warn!(
                    "[Poller] Fetch failed ({}), next poll in {:?}: {}",
                    e.code(),
                    interval,
                    e
                );
                return Vec::new();
            }
        };

        let events = {
            let mut current = self.current.write();
            let events = detect_changes(current.as_deref(), &next);
            *current = Some(Arc::clone(&next));
            events
        };

        if next.is_playing {
            self.rate.lock().record_playing();
        }

        for event in &events {
            tracing::debug!(?event, "track_event");
            if let TrackEvent::Change(track) = event {
                log::info!("[Poller] Now playing: {} ({})", track.title, track.id);
            }
            // Err only means nobody is listening right now.
            let _ = self.events.send(event.clone());
        }
        events
    }

    /// Polls until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        log::info!("[Poller] Started, interval {:?}", self.interval());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.tick() => {}
            }

            let interval = self.interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        log::info!("[Poller] Stopped");
    }

    /// Fetches a snapshot, retrying until one is obtained.
    ///
    /// Failures feed the same backoff as the poll loop and each retry waits
    /// for the current interval, so this may take arbitrarily long. Returns
    /// `None` only when `cancel` fires first.
    pub async fn fetch_until_success(&self, cancel: &CancellationToken) -> Option<Arc<Track>> {
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return None,
                result = self.source.fetch() => result,
            };

            match result {
                Ok(track) => {
                    if track.is_playing {
                        self.rate.lock().record_playing();
                    }
                    return Some(Arc::new(track));
                }
                Err(e) => {
                    let interval = self.rate.lock().record_failure();
                    log::warn!("[Poller] Point fetch failed, retrying in {:?}: {}", interval, e);
                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{failure, ScriptedSource};
    use super::*;
    use crate::track::fixtures::{idle, playing};

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn backoff_grows_by_one_step_and_caps() {
        let mut rate = PollRate::new(secs(5), secs(1), 3);
        assert_eq!(rate.current(), secs(5));
        assert_eq!(rate.record_failure(), secs(6));
        assert_eq!(rate.record_failure(), secs(7));
        assert_eq!(rate.record_failure(), secs(8));
        assert_eq!(rate.record_failure(), secs(8));

        rate.record_playing();
        assert_eq!(rate.current(), secs(5));
    }

    #[test]
    fn cold_start_reports_nothing() {
        assert!(detect_changes(None, &Arc::new(playing("a", 1000))).is_empty());
    }

    #[test]
    fn idle_track_change_has_no_progress() {
        let events = detect_changes(Some(&playing("a", 10)), &Arc::new(idle("b")));
        assert_eq!(events, vec![TrackEvent::Change(Arc::new(idle("b")))]);
    }

    #[test]
    fn play_state_flip_on_the_same_track_reports_status() {
        let events = detect_changes(Some(&idle("a")), &Arc::new(playing("a", 300)));
        assert_eq!(events, vec![TrackEvent::Status(true), TrackEvent::Progress(300)]);

        let events = detect_changes(Some(&playing("a", 300)), &Arc::new(idle("a")));
        assert_eq!(events, vec![TrackEvent::Status(false)]);
    }

    #[tokio::test]
    async fn ticks_report_progress_and_changes() {
        let source = ScriptedSource::new([
            Ok(playing("a", 1000)),
            Ok(playing("a", 6000)),
            Ok(playing("b", 100)),
        ]);
        let poller = Poller::new(source, &Config::default());
        let mut rx = poller.subscribe();

        assert!(poller.tick().await.is_empty());
        assert_eq!(poller.tick().await, vec![TrackEvent::Progress(6000)]);
        assert_eq!(
            poller.tick().await,
            vec![
                TrackEvent::Change(Arc::new(playing("b", 100))),
                TrackEvent::Progress(100)
            ]
        );

        assert_eq!(rx.recv().await.unwrap(), TrackEvent::Progress(6000));
        assert!(matches!(rx.recv().await.unwrap(), TrackEvent::Change(t) if t.id == "b"));
        assert_eq!(rx.recv().await.unwrap(), TrackEvent::Progress(100));
        assert_eq!(poller.current().unwrap().id, "b");
    }

    #[tokio::test]
    async fn failures_back_off_and_keep_the_last_snapshot() {
        let source = ScriptedSource::new([
            Ok(idle("a")),
            failure(),
            failure(),
            failure(),
            failure(),
        ]);
        let poller = Poller::new(source, &Config::default());

        poller.tick().await;
        let mut intervals = Vec::new();
        for _ in 0..4 {
            assert!(poller.tick().await.is_empty());
            intervals.push(poller.interval());
        }

        assert_eq!(intervals, vec![secs(6), secs(7), secs(8), secs(8)]);
        assert_eq!(poller.current().unwrap().id, "a");
    }

    #[tokio::test]
    async fn playing_snapshot_restores_the_default_interval() {
        let source = ScriptedSource::new([failure(), failure(), Ok(idle("a")), Ok(playing("a", 5))]);
        let poller = Poller::new(source, &Config::default());

        poller.tick().await;
        poller.tick().await;
        poller.tick().await;
        assert_eq!(poller.interval(), secs(7));

        poller.tick().await;
        assert_eq!(poller.interval(), secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn point_fetch_retries_until_success() {
        let source = ScriptedSource::new([failure(), failure(), Ok(playing("a", 42))]);
        let poller = Poller::new(source.clone(), &Config::default());

        let started = tokio::time::Instant::now();
        let track = poller
            .fetch_until_success(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(track.id, "a");
        assert_eq!(source.calls(), 3);
        assert!(started.elapsed() >= secs(6 + 7));
        assert_eq!(poller.interval(), secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn point_fetch_gives_up_when_cancelled() {
        let source = ScriptedSource::new([failure(), failure(), failure()]);
        let poller = Arc::new(Poller::new(source.clone(), &Config::default()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let poller = Arc::clone(&poller);
            let cancel = cancel.clone();
            async move { poller.fetch_until_success(&cancel).await }
        });

        tokio::time::sleep(secs(1)).await;
        assert_eq!(source.calls(), 1);
        cancel.cancel();

        assert_eq!(task.await.unwrap(), None);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_publishes_until_cancelled() {
        let source = ScriptedSource::new([Ok(playing("a", 0)), Ok(playing("b", 0))]);
        let poller = Arc::new(Poller::new(source, &Config::default()));
        let mut rx = poller.subscribe();
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let poller = Arc::clone(&poller);
            let cancel = cancel.clone();
            async move { poller.run(cancel).await }
        });

        assert!(matches!(rx.recv().await.unwrap(), TrackEvent::Change(t) if t.id == "b"));
        cancel.cancel();
        task.await.unwrap();
    }
}
