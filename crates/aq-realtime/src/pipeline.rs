//! Inline classification pipeline
//!
//! [`AudioClassifier`] runs the whole chain on the thread that pushes
//! samples: windower, rate converter, engine, publisher. The only unbounded
//! step is inference, which happens once per hop.

use std::sync::Arc;

use aq_core::{AqError, StreamConfig};
use aq_dsp::Windower;
use aq_ml::{ClassificationEngine, InferenceBackend, InferenceEngine};

use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::publisher::{ResultPublisher, SnapshotReader};
use crate::stage::{ClassifyStage, FrameOutcome};
use crate::stats::{PipelineStats, StatsSnapshot};

/// Lifecycle of a classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Never prepared, or the last prepare failed
    #[default]
    Uninitialized,
    /// Buffers sized, no samples yet
    Prepared,
    /// Samples flowing
    Streaming,
    /// Buffers and resampler dropped; prepare again to resume
    Released,
}

impl PipelineState {
    /// Whether pushed samples are processed
    pub fn accepts_samples(&self) -> bool {
        matches!(self, Self::Prepared | Self::Streaming)
    }
}

/// Common surface of the inline and background classifiers
pub trait StreamClassifier {
    /// Size all buffers for a host stream. Resets everything except the
    /// inference session.
    fn prepare(
        &mut self,
        sample_rate: f64,
        block_size: usize,
        detection_rate_hz: f64,
    ) -> PipelineResult<()>;

    /// Feed one host block (one channel). Returns windows emitted.
    fn process_block(&mut self, block: &[f32]) -> usize;

    /// Drop buffers and the resampler
    fn release(&mut self) -> PipelineResult<()>;

    fn state(&self) -> PipelineState;

    fn stats(&self) -> StatsSnapshot;

    /// Stream parameters of the current prepare
    fn stream(&self) -> Option<&StreamConfig>;
}

/// Classifier that runs inference inline
pub struct AudioClassifier<B: InferenceBackend = InferenceEngine> {
    windower: Windower,
    stage: ClassifyStage<B>,
    stream: Option<StreamConfig>,
    state: PipelineState,
    stats: Arc<PipelineStats>,
}

impl AudioClassifier<InferenceEngine> {
    /// Load the model named in `config` and build an unprepared classifier
    pub fn from_config(config: &PipelineConfig) -> PipelineResult<(Self, SnapshotReader)> {
        config.validate()?;
        let engine = ClassificationEngine::load(config.model.clone())?;
        Self::new(engine, config.threshold)
    }
}

impl<B: InferenceBackend> AudioClassifier<B> {
    /// Wrap a loaded engine. The reader can be moved to another thread.
    pub fn new(
        engine: ClassificationEngine<B>,
        threshold: f32,
    ) -> PipelineResult<(Self, SnapshotReader)> {
        let (publisher, reader) = ResultPublisher::new(threshold)?;
        let stats = Arc::new(PipelineStats::new());

        let classifier = Self {
            windower: Windower::new(),
            stage: ClassifyStage::new(engine, publisher, Arc::clone(&stats)),
            stream: None,
            state: PipelineState::Uninitialized,
            stats,
        };

        Ok((classifier, reader))
    }

    /// Prepare for an already validated stream configuration
    pub fn prepare_stream(&mut self, stream: StreamConfig) -> PipelineResult<()> {
        self.state = PipelineState::Uninitialized;
        self.stream = None;

        if let Err(e) = self.try_prepare(&stream) {
            self.windower.release();
            self.stage.release();
            return Err(e);
        }

        log::info!(
            "Classifier prepared: {} Hz, window {} samples, hop {} ({:.0} ms)",
            stream.sample_rate,
            stream.fifo_size(),
            stream.hop_size(),
            stream.hop_interval_secs() * 1000.0
        );

        self.stream = Some(stream);
        self.state = PipelineState::Prepared;
        Ok(())
    }

    fn try_prepare(&mut self, stream: &StreamConfig) -> PipelineResult<()> {
        self.windower.prepare(stream.fifo_size())?;
        self.stage.prepare(stream)?;

        if self.windower.fifo_size() != self.stage.input_len() {
            return Err(AqError::SizeMismatch {
                context: "window vs rate converter input",
                expected: self.stage.input_len(),
                got: self.windower.fifo_size(),
            }
            .into());
        }

        self.stats.reset();
        Ok(())
    }

    /// Push one sample.
    ///
    /// Returns what happened to the window if this sample completed one.
    /// Ignored unless prepared.
    #[inline]
    pub fn push(&mut self, sample: f32) -> Option<FrameOutcome> {
        if !self.state.accepts_samples() {
            return None;
        }
        self.state = PipelineState::Streaming;

        let window = self.windower.push(sample)?;
        self.stats.record_window();
        Some(self.stage.process(window))
    }

    /// Feed a block; returns the number of frames published
    pub fn process_samples(&mut self, block: &[f32]) -> usize {
        block
            .iter()
            .filter_map(|&s| self.push(s))
            .filter(FrameOutcome::is_published)
            .count()
    }

    pub fn set_threshold(&mut self, threshold: f32) -> PipelineResult<()> {
        self.stage.publisher_mut().set_threshold(threshold)?;
        Ok(())
    }

    pub fn threshold(&self) -> f32 {
        self.stage.threshold()
    }

    pub fn engine(&self) -> &ClassificationEngine<B> {
        self.stage.engine()
    }

    pub fn engine_mut(&mut self) -> &mut ClassificationEngine<B> {
        self.stage.engine_mut()
    }

    /// Live counters, shareable with a monitoring thread
    pub fn stats_handle(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Samples still needed before the next window
    pub fn samples_until_window(&self) -> usize {
        self.windower.samples_until_window()
    }
}

impl<B: InferenceBackend> StreamClassifier for AudioClassifier<B> {
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
        self.process_samples(block);
        (self.windower.windows_emitted() - before) as usize
    }

    fn release(&mut self) -> PipelineResult<()> {
        self.windower.release();
        self.stage.release();
        self.stream = None;
        self.state = PipelineState::Released;
        log::debug!("Classifier released");
        Ok(())
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
