//! Background inference
//!
//! [`BackgroundClassifier`] keeps only the windower on the pushing thread.
//! Each emitted window is copied into a latest-wins slot (the triple buffer
//! from [`crate::state`]) and a worker thread converts, classifies and
//! publishes whatever window is newest when it comes round.
//!
//! ```text
//!   render thread                         worker thread
//!   ─────────────                         ─────────────
//!   Windower ──copy──▶ [window slot] ───▶ read newest
//!                                         convert, classify, publish
//! ```
//!
//! A window published over one the worker has not read yet replaces it, so
//! a slow model always catches up on the most recent audio. Replaced windows
//! are counted as dropped in [`PipelineStats`].
//!
//! The inference session reaches the worker over a one-slot `rtrb` ring
//! after the thread has started, so a failed spawn leaves it with the
//! classifier.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use aq_core::StreamConfig;
use aq_dsp::Windower;
use aq_ml::{ClassificationEngine, InferenceBackend, InferenceEngine};
use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use rtrb::{Consumer, PushError, RingBuffer};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{PipelineState, StreamClassifier};
use crate::publisher::{ResultPublisher, SnapshotReader};
use crate::stage::ClassifyStage;
use crate::state::{TripleReader, TripleWriter, triple_buffer};
use crate::stats::{PipelineStats, StatsSnapshot};

/// Worker wakes at least this often to check for shutdown
const IDLE_PARK: Duration = Duration::from_millis(50);

/// One emitted window, numbered from 1 after each prepare
struct PendingWindow {
    index: u64,
    samples: Vec<f32>,
}

struct WorkerShared {
    shutdown: AtomicBool,
    /// Index of the last window the worker finished with
    completed: AtomicU64,
}

/// Classifier that runs inference on a dedicated thread
pub struct BackgroundClassifier<B: InferenceBackend + 'static = InferenceEngine> {
    windower: Windower,
    /// Render side of the window slot
    handoff: Option<TripleWriter<PendingWindow>>,
    /// Present while no worker is running
    stage: Option<ClassifyStage<B>>,
    /// Yields the stage back on join, `None` if it never left this side
    worker: Option<JoinHandle<Option<ClassifyStage<B>>>>,
    shared: Arc<WorkerShared>,
    /// Index of the last window handed over
    pushed: u64,
    stream: Option<StreamConfig>,
    state: PipelineState,
    stats: Arc<PipelineStats>,
}

impl BackgroundClassifier<InferenceEngine> {
    /// Load the model named in `config` and build an unprepared classifier
    pub fn from_config(config: &PipelineConfig) -> PipelineResult<(Self, SnapshotReader)> {
        config.validate()?;
        let engine = ClassificationEngine::load(config.model.clone())?;
        Self::new(engine, config.threshold)
    }
}

impl<B: InferenceBackend + 'static> BackgroundClassifier<B> {
    pub fn new(
        engine: ClassificationEngine<B>,
        threshold: f32,
    ) -> PipelineResult<(Self, SnapshotReader)> {
        let (publisher, reader) = ResultPublisher::new(threshold)?;
        let stats = Arc::new(PipelineStats::new());

        let classifier = Self {
            windower: Windower::new(),
            handoff: None,
            stage: Some(ClassifyStage::new(engine, publisher, Arc::clone(&stats))),
            worker: None,
            shared: Arc::new(WorkerShared {
                shutdown: AtomicBool::new(false),
                completed: AtomicU64::new(0),
            }),
            pushed: 0,
            stream: None,
            state: PipelineState::Uninitialized,
            stats,
        };

        Ok((classifier, reader))
    }

    /// Prepare for an already validated stream configuration.
    ///
    /// Fails with [`PipelineError::SessionLost`] once a worker panic has
    /// taken the inference session down with it.
    pub fn prepare_stream(&mut self, stream: StreamConfig) -> PipelineResult<()> {
        self.state = PipelineState::Uninitialized;
        self.stream = None;

        self.stop_worker()?;
        self.handoff = None;

        let Some(mut stage) = self.stage.take() else {
            return Err(PipelineError::SessionLost);
        };

        let prepared = self
            .windower
            .prepare(stream.fifo_size())
            .and_then(|()| stage.prepare(&stream));
        if let Err(e) = prepared {
            self.windower.release();
            stage.release();
            self.stage = Some(stage);
            return Err(e.into());
        }

        let fifo_size = stream.fifo_size();
        let (handoff, windows) = triple_buffer(|| PendingWindow {
            index: 0,
            samples: vec![0.0; fifo_size],
        });

        self.stats.reset();
        self.pushed = 0;
        self.shared.completed.store(0, Ordering::Relaxed);
        self.shared.shutdown.store(false, Ordering::Release);

        let (mut stage_tx, stage_rx) = RingBuffer::<ClassifyStage<B>>::new(1);
        let shared = Arc::clone(&self.shared);
        let stats = Arc::clone(&self.stats);
        let spawned = thread::Builder::new()
            .name("aq-classifier".into())
            .spawn(move || worker_loop(stage_rx, windows, shared, stats));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.windower.release();
                stage.release();
                self.stage = Some(stage);
                return Err(PipelineError::WorkerSpawn(e.to_string()));
            }
        };

        if let Err(PushError::Full(mut stage)) = stage_tx.push(stage) {
            // Worker gives up once the sender is gone
            drop(stage_tx);
            let _ = handle.join();
            self.windower.release();
            stage.release();
            self.stage = Some(stage);
            return Err(PipelineError::WorkerSpawn(
                "inference session handoff failed".into(),
            ));
        }
        handle.thread().unpark();

        log::info!(
            "Background classifier prepared: {} Hz, window {} samples, hop {}",
            stream.sample_rate,
            fifo_size,
            stream.hop_size()
        );

        self.worker = Some(handle);
        self.handoff = Some(handoff);
        self.stream = Some(stream);
        self.state = PipelineState::Prepared;
        Ok(())
    }

    /// Push one sample. Returns true if a window was handed to the worker.
    ///
    /// Only copies into the window slot; never waits on the worker.
    #[inline]
    pub fn push(&mut self, sample: f32) -> bool {
        if !self.state.accepts_samples() {
            return false;
        }
        self.state = PipelineState::Streaming;

        let Some(window) = self.windower.push(sample) else {
            return false;
        };
        self.stats.record_window();

        let Some(handoff) = self.handoff.as_mut() else {
            return false;
        };

        self.pushed += 1;
        let slot = handoff.input_mut();
        slot.index = self.pushed;
        slot.samples.copy_from_slice(window);
        handoff.publish();

        if let Some(worker) = &self.worker {
            worker.thread().unpark();
        }
        true
    }

    /// Block until the worker has caught up with the newest window.
    ///
    /// For offline use; returns false on timeout or when the worker is gone.
    /// Never call this from an audio callback.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.shared.completed.load(Ordering::Acquire) < self.pushed {
            if !self.is_worker_running() || Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn is_worker_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Live counters, shareable with a monitoring thread
    pub fn stats_handle(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Signal the worker, join it and take the stage back
    fn stop_worker(&mut self) -> PipelineResult<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };

        self.shared.shutdown.store(true, Ordering::Release);
        handle.thread().unpark();

        match handle.join() {
            Ok(Some(stage)) => {
                self.stage = Some(stage);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(_) => {
                log::error!("Classification worker panicked, inference session lost");
                Err(PipelineError::WorkerPanicked)
            }
        }
    }
}

/// Wait for the stage to arrive; `None` if the sender went away without it
fn receive_stage<B: InferenceBackend>(
    stage_rx: &mut Consumer<ClassifyStage<B>>,
) -> Option<ClassifyStage<B>> {
    loop {
        if let Ok(stage) = stage_rx.pop() {
            return Some(stage);
        }
        if stage_rx.is_abandoned() {
            // The push can land just before the sender is dropped
            return stage_rx.pop().ok();
        }
        thread::park_timeout(IDLE_PARK);
    }
}

fn worker_loop<B: InferenceBackend>(
    mut stage_rx: Consumer<ClassifyStage<B>>,
    mut windows: TripleReader<PendingWindow>,
    shared: Arc<WorkerShared>,
    stats: Arc<PipelineStats>,
) -> Option<ClassifyStage<B>> {
    let mut stage = receive_stage(&mut stage_rx)?;
    log::debug!("Classification worker started");

    let mut last_index = 0;
    loop {
        if windows.has_update() {
            let window = windows.read();
            let replaced = window.index.saturating_sub(last_index + 1);
            if replaced > 0 {
                stats.record_dropped(replaced);
            }
            last_index = window.index;

            stage.process(&window.samples);
            shared.completed.store(last_index, Ordering::Release);
            continue;
        }

        if shared.shutdown.load(Ordering::Acquire) {
            // A window published right before shutdown still gets classified
            if windows.has_update() {
                continue;
            }
            break;
        }
        thread::park_timeout(IDLE_PARK);
    }

    log::debug!("Classification worker exiting");
    Some(stage)
}

impl<B: InferenceBackend + 'static> StreamClassifier for BackgroundClassifier<B> {
    fn prepare(
        &mut self,
        sample_rate: f64,
        block_size: usize,
        detection_rate_hz: f64,
    ) -> PipelineResult<()> {
        let stream = match StreamConfig::new(sample_rate, block_size, detection_rate_hz) {
            Ok(stream) => stream,
            Err(e) => {
                self.state = PipelineState::Uninitialized;
                return Err(e.into());
            }
        };
        self.prepare_stream(stream)
    }

    fn process_block(&mut self, block: &[f32]) -> usize {
        let before = self.windower.windows_emitted();
        for &sample in block {
            self.push(sample);
        }
        (self.windower.windows_emitted() - before) as usize
    }

    fn release(&mut self) -> PipelineResult<()> {
        let stopped = self.stop_worker();

        self.handoff = None;
        self.windower.release();
        if let Some(stage) = self.stage.as_mut() {
            stage.release();
        }
        self.stream = None;
        self.state = PipelineState::Released;
        log::debug!("Background classifier released");

        stopped
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn stream(&self) -> Option<&StreamConfig> {
        self.stream.as_ref()
    }
}

impl<B: InferenceBackend + 'static> Drop for BackgroundClassifier<B> {
    fn drop(&mut self) {
        if let Err(e) = self.stop_worker() {
            log::warn!("Background classifier shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_ml::{MlResult, ModelOutputs};

    struct PeakBackend;

    impl InferenceBackend for PeakBackend {
        fn run(&mut self, waveform: &[f32], outputs: &mut ModelOutputs) -> MlResult<()> {
            let peak = waveform.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
            outputs.scores.fill(0.0);
            outputs.scores[0] = peak;
            Ok(())
        }
    }

    struct CrashingBackend;

    impl InferenceBackend for CrashingBackend {
        fn run(&mut self, _waveform: &[f32], _outputs: &mut ModelOutputs) -> MlResult<()> {
            panic!("backend crashed");
        }
    }

    #[test]
    fn test_worker_publishes() {
        let engine = ClassificationEngine::with_backend(PeakBackend);
        let (mut c, mut reader) = BackgroundClassifier::new(engine, 0.5).unwrap();
        c.prepare(16000.0, 512, 16000.0).unwrap();
        assert!(c.is_worker_running());

        assert_eq!(c.process_block(&vec![0.9; 7680]), 1);
        assert!(c.wait_idle(Duration::from_secs(10)));

        let snap = reader.snapshot();
        assert_eq!(snap.sequence, 1);
        assert_eq!(snap.above_threshold(), &[0]);
    }

    #[test]
    fn test_release_joins_worker() {
        let engine = ClassificationEngine::with_backend(PeakBackend);
        let (mut c, _reader) = BackgroundClassifier::new(engine, 0.5).unwrap();
        c.prepare(16000.0, 512, 16000.0).unwrap();
        c.release().unwrap();

        assert!(!c.is_worker_running());
        assert_eq!(c.state(), PipelineState::Released);
        assert!(!c.push(1.0));

        // The stage came back, so the classifier can be prepared again
        c.prepare(16000.0, 512, 16000.0).unwrap();
        assert!(c.is_worker_running());
    }

    #[test]
    fn test_worker_panic_loses_session() {
        let engine = ClassificationEngine::with_backend(CrashingBackend);
        let (mut c, _reader) = BackgroundClassifier::new(engine, 0.5).unwrap();
        c.prepare(16000.0, 512, 16000.0).unwrap();

        c.process_block(&vec![0.1; 7680]);
        assert!(!c.wait_idle(Duration::from_secs(10)));
        assert!(matches!(c.release(), Err(PipelineError::WorkerPanicked)));

        // Every later prepare names the real problem
        for _ in 0..2 {
            assert!(matches!(
                c.prepare(16000.0, 512, 16000.0),
                Err(PipelineError::SessionLost)
            ));
            assert_eq!(c.state(), PipelineState::Uninitialized);
        }
    }
}
