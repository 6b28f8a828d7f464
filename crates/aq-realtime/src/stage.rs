//! Convert, classify, publish
//!
//! The per-window half of the pipeline, shared by the inline and the
//! background classifier. It runs on whichever thread owns it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aq_core::{AqResult, StreamConfig};
use aq_dsp::RateConverter;
use aq_ml::{ClassificationEngine, InferenceBackend};

use crate::publisher::ResultPublisher;
use crate::stats::PipelineStats;

/// What happened to one emitted window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Classified and published under this sequence number
    Published { sequence: u64 },
    /// Rate conversion failed, nothing published
    ConversionFailed,
    /// Inference failed, previous snapshot still visible
    InferenceFailed,
}

impl FrameOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

pub(crate) struct ClassifyStage<B: InferenceBackend> {
    converter: RateConverter,
    engine: ClassificationEngine<B>,
    publisher: ResultPublisher,
    /// Converted window, engine input length
    resampled: Vec<f32>,
    stats: Arc<PipelineStats>,
    /// Inference time allowed before the next window arrives
    hop_budget: Duration,
    failure_logged: bool,
    overrun_logged: bool,
}

impl<B: InferenceBackend> ClassifyStage<B> {
    pub(crate) fn new(
        engine: ClassificationEngine<B>,
        publisher: ResultPublisher,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            converter: RateConverter::new(),
            engine,
            publisher,
            resampled: Vec::new(),
            stats,
            hop_budget: Duration::ZERO,
            failure_logged: false,
            overrun_logged: false,
        }
    }

    /// Size everything for `stream` and publish an empty snapshot
    pub(crate) fn prepare(&mut self, stream: &StreamConfig) -> AqResult<()> {
        let input_len = self.engine.input_len();
        self.converter.prepare(stream.fifo_size(), input_len)?;

        self.resampled.clear();
        self.resampled.resize(input_len, 0.0);
        self.hop_budget = Duration::from_secs_f64(stream.hop_interval_secs());
        self.failure_logged = false;
        self.overrun_logged = false;
        self.publisher.reset();

        Ok(())
    }

    /// Handle one host-rate window
    pub(crate) fn process(&mut self, window: &[f32]) -> FrameOutcome {
        if let Err(e) = self.converter.convert(window, &mut self.resampled) {
            self.stats.record_conversion_failure();
            self.log_failure("rate conversion", &e.to_string());
            return FrameOutcome::ConversionFailed;
        }

        let start = Instant::now();
        let result = self.engine.classify(&self.resampled);
        let elapsed = start.elapsed();

        let scores = match result {
            Ok(scores) => scores,
            Err(e) => {
                self.stats.record_inference_failure();
                self.log_failure("inference", &e.to_string());
                return FrameOutcome::InferenceFailed;
            }
        };

        if self.stats.record_inference_time(elapsed, self.hop_budget) && !self.overrun_logged {
            log::warn!(
                "Inference took {:.1} ms, longer than the {:.1} ms hop interval",
                elapsed.as_secs_f64() * 1000.0,
                self.hop_budget.as_secs_f64() * 1000.0
            );
            self.overrun_logged = true;
        }

        match self.publisher.update(scores) {
            Ok(sequence) => {
                self.stats.record_published();
                log::debug!("Published frame {}", sequence);
                FrameOutcome::Published { sequence }
            }
            Err(e) => {
                self.stats.record_inference_failure();
                self.log_failure("publish", &e.to_string());
                FrameOutcome::InferenceFailed
            }
        }
    }

    /// Drop the resampler and the converted window
    pub(crate) fn release(&mut self) {
        self.converter.release();
        self.resampled = Vec::new();
    }

    /// First failure of a run is a warning, the rest only show up in stats
    fn log_failure(&mut self, step: &str, reason: &str) {
        if self.failure_logged {
            log::debug!("Frame skipped, {} failed: {}", step, reason);
        } else {
            log::warn!("Frame skipped, {} failed: {}", step, reason);
            self.failure_logged = true;
        }
    }

    /// Host-rate window length the converter expects (0 before prepare)
    pub(crate) fn input_len(&self) -> usize {
        self.converter.input_len()
    }

    pub(crate) fn engine(&self) -> &ClassificationEngine<B> {
        &self.engine
    }

    pub(crate) fn engine_mut(&mut self) -> &mut ClassificationEngine<B> {
        &mut self.engine
    }

    pub(crate) fn publisher_mut(&mut self) -> &mut ResultPublisher {
        &mut self.publisher
    }

    pub(crate) fn threshold(&self) -> f32 {
        self.publisher.threshold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::SnapshotReader;
    use aq_core::CLASSIFIER_WINDOW_LEN;
    use aq_ml::{MlResult, ModelOutputs};

    struct HotBackend;

    impl InferenceBackend for HotBackend {
        fn run(&mut self, _waveform: &[f32], outputs: &mut ModelOutputs) -> MlResult<()> {
            outputs.scores.fill(0.1);
            outputs.scores[77] = 0.9;
            Ok(())
        }
    }

    fn prepared_stage() -> (ClassifyStage<HotBackend>, SnapshotReader, Arc<PipelineStats>) {
        let (publisher, reader) = ResultPublisher::new(0.5).unwrap();
        let stats = Arc::new(PipelineStats::new());
        let engine = ClassificationEngine::with_backend(HotBackend);
        let mut stage = ClassifyStage::new(engine, publisher, Arc::clone(&stats));
        stage
            .prepare(&StreamConfig::at_model_rate(16000.0, 512).unwrap())
            .unwrap();
        (stage, reader, stats)
    }

    #[test]
    fn test_publishes_window() {
        let (mut stage, mut reader, stats) = prepared_stage();
        assert_eq!(stage.input_len(), CLASSIFIER_WINDOW_LEN);

        let outcome = stage.process(&vec![0.2; CLASSIFIER_WINDOW_LEN]);
        assert_eq!(outcome, FrameOutcome::Published { sequence: 1 });
        assert_eq!(reader.snapshot().above_threshold(), &[77]);
        assert_eq!(stats.snapshot().frames_published, 1);
    }

    #[test]
    fn test_conversion_failure_keeps_snapshot() {
        let (mut stage, mut reader, stats) = prepared_stage();
        stage.process(&vec![0.2; CLASSIFIER_WINDOW_LEN]);
        let before = reader.latest();
        assert_eq!(before.sequence, 1);

        // A window of the wrong length is refused by the converter
        let outcome = stage.process(&vec![0.2; CLASSIFIER_WINDOW_LEN / 2]);
        assert_eq!(outcome, FrameOutcome::ConversionFailed);
        assert!(!outcome.is_published());

        let snap = stats.snapshot();
        assert_eq!(snap.conversion_failures, 1);
        assert_eq!(snap.inference_failures, 0);
        assert_eq!(snap.frames_published, 1);
        assert_eq!(stage.engine().inference_count(), 1);

        assert!(!reader.has_update());
        assert_eq!(reader.latest(), before);

        // Next good window carries on from the same sequence
        let outcome = stage.process(&vec![0.2; CLASSIFIER_WINDOW_LEN]);
        assert_eq!(outcome, FrameOutcome::Published { sequence: 2 });
    }

    #[test]
    fn test_released_stage_fails_conversion() {
        let (mut stage, mut reader, stats) = prepared_stage();
        stage.release();
        reader.snapshot();

        let outcome = stage.process(&vec![0.2; CLASSIFIER_WINDOW_LEN]);
        assert_eq!(outcome, FrameOutcome::ConversionFailed);
        assert_eq!(stats.snapshot().conversion_failures, 1);
        assert!(!reader.has_update());
    }
}
