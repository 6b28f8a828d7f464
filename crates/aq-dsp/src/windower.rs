//! Overlapping window extraction for streaming classification
//!
//! Samples go into a fixed circular buffer one at a time. Every `hop_size`
//! samples (half the buffer) the buffer is unrolled into time order and handed
//! out as a window, so consecutive windows share exactly half their samples.

use aq_core::{AqError, AqResult};

/// Circular sample buffer that emits 50%-overlapping windows
#[derive(Debug, Default)]
pub struct Windower {
    /// Circular buffer holding the most recent `fifo_size` samples
    fifo: Vec<f32>,
    /// Unrolled window, oldest sample first
    window: Vec<f32>,
    /// Next write position
    pos: usize,
    /// Samples since the last emission
    count: usize,
    /// Samples between emissions
    hop_size: usize,
    /// Windows produced since prepare
    windows_emitted: u64,
}

impl Windower {
    /// Create an unprepared windower (all pushes are ignored until prepare)
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate buffers for `fifo_size` samples and reset all state.
    ///
    /// `fifo_size` must be even and non-zero.
    pub fn prepare(&mut self, fifo_size: usize) -> AqResult<()> {
        if fifo_size == 0 {
            return Err(AqError::InvalidParam("window size must be non-zero".into()));
        }
        if fifo_size % 2 != 0 {
            return Err(AqError::InvalidParam(format!(
                "window size must be even, got {fifo_size}"
            )));
        }

        // Fresh zeroed buffers, nothing carries over from the previous epoch
        self.fifo.clear();
        self.fifo.resize(fifo_size, 0.0);
        self.window.clear();
        self.window.resize(fifo_size, 0.0);
        self.hop_size = fifo_size / 2;
        self.pos = 0;
        self.count = 0;
        self.windows_emitted = 0;

        log::debug!(
            "Windower prepared: {} samples, hop {}",
            fifo_size,
            self.hop_size
        );

        Ok(())
    }

    /// Push one sample.
    ///
    /// Returns the unrolled window when a hop boundary is crossed. The slice
    /// borrows the internal output buffer and is overwritten on the next
    /// emission.
    #[inline]
    pub fn push(&mut self, sample: f32) -> Option<&[f32]> {
        let size = self.fifo.len();
        if size == 0 {
            return None;
        }

        self.fifo[self.pos] = sample;
        self.pos = (self.pos + 1) % size;
        self.count += 1;

        if self.count < self.hop_size {
            return None;
        }
        self.count = 0;

        // `pos` is one past the newest sample, so it indexes the oldest one
        let (newer, older) = self.fifo.split_at(self.pos);
        self.window[..older.len()].copy_from_slice(older);
        self.window[older.len()..].copy_from_slice(newer);

        self.windows_emitted += 1;
        Some(&self.window)
    }

    /// Zero the buffer and counters, keeping the current size
    pub fn reset(&mut self) {
        self.fifo.fill(0.0);
        self.window.fill(0.0);
        self.pos = 0;
        self.count = 0;
        self.windows_emitted = 0;
    }

    /// Release buffers; the windower ignores input until prepared again
    pub fn release(&mut self) {
        self.fifo = Vec::new();
        self.window = Vec::new();
        self.hop_size = 0;
        self.pos = 0;
        self.count = 0;
    }

    /// Window length in samples (0 before prepare)
    #[inline]
    pub fn fifo_size(&self) -> usize {
        self.fifo.len()
    }

    /// Samples between emissions
    #[inline]
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Whether prepare has been called
    #[inline]
    pub fn is_prepared(&self) -> bool {
        !self.fifo.is_empty()
    }

    /// Windows emitted since prepare
    pub fn windows_emitted(&self) -> u64 {
        self.windows_emitted
    }

    /// Samples still needed before the next emission
    pub fn samples_until_window(&self) -> usize {
        self.hop_size - self.count
    }
}
