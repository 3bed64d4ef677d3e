// THEORY:
// The `LocationService` connects a pipeline to a live sensor. Sensors deliver
// frames at their own cadence whether or not the previous frame has been handled,
// so the service never queues: a frame arriving while another is being processed
// is dropped on the spot. Processing latency can therefore never compound.
//
// Key architectural principles:
// 1.  **Skip-if-busy gate**: A single atomic flag, taken with a compare-exchange at
//     the start of handling and released by a guard on every exit path, errors
//     included.
// 2.  **Blocking work off the runtime**: The pipeline is CPU bound, so the async
//     runner hands each accepted frame to `spawn_blocking` and keeps pulling from
//     the frame stream while it runs. Frames pulled meanwhile hit the gate.
// 3.  **Observers, not callbacks**: Detected points and classified locations are
//     published per frame on broadcast channels; the stable location is a watch
//     value, so late subscribers still see the current room.
// 4.  **Cooperative timer**: A ticker polls the debouncer between frames, so a
//     pending location is confirmed on time even when no motion (and so no frame
//     worth reporting) arrives. The ticker never waits for the pipeline lock: the
//     runner's task must stay free to pull (and drop) frames.

use crate::core_modules::depth_frame::DepthFrame;
use crate::core_modules::loi::{Loi, LoiPoint};
use crate::error::{LocationError, Result};
use crate::pipeline::{FrameReport, LocationChange, LocationPipeline, PipelineConfig};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;

const EVENT_CAPACITY: usize = 64;
const DEFAULT_TICK: Duration = Duration::from_millis(50);

/// What happened to a submitted frame.
#[derive(Debug)]
pub enum FrameOutcome {
    Processed(FrameReport),
    /// Another frame was still being processed.
    Skipped,
}

/// Frame counts for one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub processed: u64,
    pub skipped: u64,
    pub rejected: u64,
}

/// Holds the busy flag until dropped.
struct GateGuard {
    busy: Arc<AtomicBool>,
}

impl GateGuard {
    fn try_enter(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                busy: Arc::clone(busy),
            })
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct LocationService {
    pipeline: Arc<Mutex<LocationPipeline>>,
    busy: Arc<AtomicBool>,
    points_tx: broadcast::Sender<Vec<LoiPoint>>,
    lois_tx: broadcast::Sender<Vec<Loi>>,
    location_tx: Arc<watch::Sender<Option<String>>>,
    tick: Duration,
}

impl LocationService {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Ok(Self::with_pipeline(LocationPipeline::new(config)?))
    }

    pub fn with_pipeline(pipeline: LocationPipeline) -> Self {
        let (points_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (lois_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (location_tx, _) = watch::channel(pipeline.current_location().map(str::to_string));
        Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            busy: Arc::new(AtomicBool::new(false)),
            points_tx,
            lois_tx,
            location_tx: Arc::new(location_tx),
            tick: DEFAULT_TICK,
        }
    }

    /// Sets how often `run` checks for an expired confirmation window.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    /// Detected points, one message per frame that found any.
    pub fn subscribe_points(&self) -> broadcast::Receiver<Vec<LoiPoint>> {
        self.points_tx.subscribe()
    }

    /// Classified locations, one message per frame that matched any volume.
    pub fn subscribe_lois(&self) -> broadcast::Receiver<Vec<Loi>> {
        self.lois_tx.subscribe()
    }

    /// The confirmed location; changes only on confirmed transitions.
    pub fn watch_location(&self) -> watch::Receiver<Option<String>> {
        self.location_tx.subscribe()
    }

    pub fn pipeline(&self) -> Arc<Mutex<LocationPipeline>> {
        Arc::clone(&self.pipeline)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Handles a frame on the calling thread, or skips it if another frame is in
    /// flight. Suitable for calling straight from a sensor callback.
    pub fn on_frame(&self, frame: &DepthFrame) -> Result<FrameOutcome> {
        let Some(_guard) = GateGuard::try_enter(&self.busy) else {
            log::debug!("pipeline busy, dropping frame");
            return Ok(FrameOutcome::Skipped);
        };
        self.process(frame).map(FrameOutcome::Processed)
    }

    /// Like [`on_frame`](Self::on_frame), running the pipeline on the blocking pool.
    pub async fn submit(&self, frame: DepthFrame) -> Result<FrameOutcome> {
        let Some(guard) = GateGuard::try_enter(&self.busy) else {
            log::debug!("pipeline busy, dropping frame");
            return Ok(FrameOutcome::Skipped);
        };
        let service = self.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            service.process(&frame)
        })
        .await
        .map_err(|_| LocationError::ServiceStopped)?
        .map(FrameOutcome::Processed)
    }

    /// Confirms a pending location whose window has elapsed.
    pub fn poll(&self) -> Option<LocationChange> {
        let change = self.pipeline.lock().poll(Instant::now());
        if let Some(change) = &change {
            self.publish_change(change);
        }
        change
    }

    /// Like [`poll`](Self::poll), but skips the check instead of waiting while the
    /// pipeline is in use. A frame being processed polls the debouncer itself.
    fn try_poll(&self) -> Option<LocationChange> {
        if self.is_busy() {
            return None;
        }
        let change = self.pipeline.try_lock()?.poll(Instant::now());
        if let Some(change) = &change {
            self.publish_change(change);
        }
        change
    }

    /// Consumes `frames` until the stream ends. Frames arriving while one is in
    /// flight are dropped; mis-sized frames are logged and dropped.
    pub async fn run<S>(&self, mut frames: S) -> Result<ServiceStats>
    where
        S: Stream<Item = DepthFrame> + Unpin,
    {
        let mut stats = ServiceStats::default();
        let mut in_flight: JoinSet<Result<FrameReport>> = JoinSet::new();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = frames.next() => {
                    let Some(frame) = frame else { break };
                    let Some(guard) = GateGuard::try_enter(&self.busy) else {
                        log::debug!("pipeline busy, dropping frame");
                        stats.skipped += 1;
                        continue;
                    };
                    let service = self.clone();
                    in_flight.spawn_blocking(move || {
                        let _guard = guard;
                        service.process(&frame)
                    });
                }
                Some(done) = in_flight.join_next() => {
                    Self::record(&mut stats, done)?;
                }
                _ = ticker.tick() => {
                    self.try_poll();
                }
            }
        }

        while let Some(done) = in_flight.join_next().await {
            Self::record(&mut stats, done)?;
        }
        log::info!(
            "frame stream ended: {} processed, {} skipped, {} rejected",
            stats.processed,
            stats.skipped,
            stats.rejected
        );
        Ok(stats)
    }

    fn record(
        stats: &mut ServiceStats,
        done: std::result::Result<Result<FrameReport>, tokio::task::JoinError>,
    ) -> Result<()> {
        match done.map_err(|_| LocationError::ServiceStopped)? {
            Ok(_) => stats.processed += 1,
            Err(err) => {
                log::warn!("dropping frame: {err}");
                stats.rejected += 1;
            }
        }
        Ok(())
    }

    fn process(&self, frame: &DepthFrame) -> Result<FrameReport> {
        let report = self.pipeline.lock().process_frame(frame)?;
        if !report.loi_points.is_empty() {
            let _ = self.points_tx.send(report.loi_points.clone());
        }
        if !report.lois.is_empty() {
            let _ = self.lois_tx.send(report.lois.clone());
        }
        if let Some(change) = &report.location_change {
            self.publish_change(change);
        }
        Ok(report)
    }

    fn publish_change(&self, change: &LocationChange) {
        self.location_tx.send_replace(Some(change.current.clone()));
    }
}
