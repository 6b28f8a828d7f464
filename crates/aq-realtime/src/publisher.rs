//! Result publishing
//!
//! [`ResultPublisher`] turns a score vector into a [`ThresholdResult`] and
//! hands the whole thing to a [`SnapshotReader`] on another thread through the
//! triple buffer in [`crate::state`]. Every slot is sized up front, so
//! `update` does not allocate.

use aq_core::{AqError, AqResult, DEFAULT_SCORE_THRESHOLD, NUM_CLASSES};

use crate::state::{TripleReader, TripleWriter, triple_buffer};

/// Index of the first maximum score, ignoring NaN.
///
/// Returns 0 for an empty or all-NaN slice.
pub fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    let mut found = false;

    for (i, &s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        if !found || s > best_score {
            best = i;
            best_score = s;
            found = true;
        }
    }

    best
}

/// Write the ascending indices with `score > threshold` into `out`.
///
/// `out` is cleared first. It does not reallocate when its capacity covers
/// `scores.len()`.
pub fn indices_above(scores: &[f32], threshold: f32, out: &mut Vec<usize>) {
    out.clear();
    out.extend(
        scores
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s > threshold)
            .map(|(i, _)| i),
    );
}

/// Arg-max class and the classes over the threshold, for one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdResult {
    pub argmax_index: usize,
    /// Ascending class indices
    pub above_threshold: Vec<usize>,
}

impl ThresholdResult {
    /// Empty result with room for every class
    pub fn with_capacity(num_classes: usize) -> Self {
        Self {
            argmax_index: 0,
            above_threshold: Vec::with_capacity(num_classes),
        }
    }

    /// Compute from scratch
    pub fn from_scores(scores: &[f32], threshold: f32) -> Self {
        let mut result = Self::with_capacity(scores.len());
        result.recompute(scores, threshold);
        result
    }

    /// Overwrite with the result for `scores`. Nothing from the previous
    /// frame survives.
    pub fn recompute(&mut self, scores: &[f32], threshold: f32) {
        self.argmax_index = argmax(scores);
        indices_above(scores, threshold, &mut self.above_threshold);
    }

    fn clear(&mut self) {
        self.argmax_index = 0;
        self.above_threshold.clear();
    }
}

/// One published frame
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationSnapshot {
    /// Frames published since the last reset, 0 before the first
    pub sequence: u64,
    /// Incremented by every reset, so readers can tell a restart apart
    pub epoch: u64,
    pub result: ThresholdResult,
    /// Scores the result was derived from
    pub scores: Vec<f32>,
}

impl ClassificationSnapshot {
    fn empty() -> Self {
        Self {
            sequence: 0,
            epoch: 0,
            result: ThresholdResult::with_capacity(NUM_CLASSES),
            scores: vec![0.0; NUM_CLASSES],
        }
    }

    #[inline]
    pub fn argmax_index(&self) -> usize {
        self.result.argmax_index
    }

    #[inline]
    pub fn above_threshold(&self) -> &[usize] {
        &self.result.above_threshold
    }

    /// Nothing classified yet in this epoch
    pub fn is_empty(&self) -> bool {
        self.sequence == 0
    }
}

/// Writer side, owned by whichever thread runs inference
pub struct ResultPublisher {
    writer: TripleWriter<ClassificationSnapshot>,
    threshold: f32,
    sequence: u64,
    epoch: u64,
}

impl ResultPublisher {
    /// Create a publisher and the matching reader.
    ///
    /// Fails for a threshold outside `[0, 1]`.
    pub fn new(threshold: f32) -> AqResult<(Self, SnapshotReader)> {
        validate_threshold(threshold)?;
        Ok(Self::build(threshold))
    }

    /// Publisher with [`DEFAULT_SCORE_THRESHOLD`]
    pub fn with_default_threshold() -> (Self, SnapshotReader) {
        Self::build(DEFAULT_SCORE_THRESHOLD)
    }

    fn build(threshold: f32) -> (Self, SnapshotReader) {
        let (writer, reader) = triple_buffer(ClassificationSnapshot::empty);
        let publisher = Self {
            writer,
            threshold,
            sequence: 0,
            epoch: 0,
        };
        (publisher, SnapshotReader { reader })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Change the threshold; applies from the next `update`
    pub fn set_threshold(&mut self, threshold: f32) -> AqResult<()> {
        validate_threshold(threshold)?;
        self.threshold = threshold;
        Ok(())
    }

    /// Derive the result for `scores` and publish it.
    ///
    /// Returns the sequence number of the published frame.
    pub fn update(&mut self, scores: &[f32]) -> AqResult<u64> {
        if scores.len() != NUM_CLASSES {
            return Err(AqError::SizeMismatch {
                context: "published scores",
                expected: NUM_CLASSES,
                got: scores.len(),
            });
        }

        self.sequence += 1;
        let (sequence, epoch, threshold) = (self.sequence, self.epoch, self.threshold);

        let slot = self.writer.input_mut();
        slot.sequence = sequence;
        slot.epoch = epoch;
        slot.scores.copy_from_slice(scores);
        slot.result.recompute(scores, threshold);

        self.writer.publish();
        Ok(sequence)
    }

    /// Publish an empty snapshot under a new epoch and restart the sequence
    pub fn reset(&mut self) {
        self.sequence = 0;
        self.epoch += 1;

        let epoch = self.epoch;
        let slot = self.writer.input_mut();
        slot.sequence = 0;
        slot.epoch = epoch;
        slot.scores.fill(0.0);
        slot.result.clear();

        self.writer.publish();
    }

    /// Sequence number of the last published frame
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

fn validate_threshold(threshold: f32) -> AqResult<()> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(AqError::InvalidParam(format!(
            "score threshold {threshold} outside [0, 1]"
        )))
    }
}

/// Reader side, for the UI or any other consumer thread
pub struct SnapshotReader {
    reader: TripleReader<ClassificationSnapshot>,
}

impl SnapshotReader {
    /// Most recent published snapshot
    pub fn snapshot(&mut self) -> &ClassificationSnapshot {
        self.reader.read()
    }

    /// Owned copy of the most recent snapshot
    pub fn latest(&mut self) -> ClassificationSnapshot {
        self.reader.read().clone()
    }

    /// Whether a frame was published since the last `snapshot`
    pub fn has_update(&self) -> bool {
        self.reader.has_update()
    }
}
