//! Host stream configuration and derived window sizes

use serde::{Deserialize, Serialize};

use crate::{AqError, AqResult, CLASSIFIER_WINDOW_LEN, MODEL_SAMPLE_RATE};

/// Compute the host-rate window length that resamples to exactly
/// [`CLASSIFIER_WINDOW_LEN`] samples at [`MODEL_SAMPLE_RATE`].
///
/// The result is always even so the hop divides it exactly.
#[inline]
pub fn fifo_size_for(sample_rate: f64) -> usize {
    let size = (CLASSIFIER_WINDOW_LEN as f64 * sample_rate / MODEL_SAMPLE_RATE).round() as usize;
    if size % 2 != 0 { size + 1 } else { size }
}

/// Parameters delivered by the host at prepare time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Host sample rate in Hz
    pub sample_rate: f64,
    /// Maximum samples per host block
    pub block_size: usize,
    /// Detection rate requested by the host.
    ///
    /// Validated and kept, but windows are always sized and converted for
    /// the model's own 16 kHz input.
    pub detection_rate_hz: f64,
}

impl StreamConfig {
    /// Validate and build a stream configuration
    pub fn new(sample_rate: f64, block_size: usize, detection_rate_hz: f64) -> AqResult<Self> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(AqError::InvalidSampleRate(sample_rate));
        }
        if !detection_rate_hz.is_finite() || detection_rate_hz <= 0.0 {
            return Err(AqError::InvalidSampleRate(detection_rate_hz));
        }
        if block_size == 0 {
            return Err(AqError::InvalidParam("host block size must be non-zero".into()));
        }

        let config = Self {
            sample_rate,
            block_size,
            detection_rate_hz,
        };

        if config.fifo_size() < 2 {
            return Err(AqError::InvalidParam(format!(
                "sample rate {sample_rate} Hz yields an empty analysis window"
            )));
        }

        Ok(config)
    }

    /// Config at the model's own rate
    pub fn at_model_rate(sample_rate: f64, block_size: usize) -> AqResult<Self> {
        Self::new(sample_rate, block_size, MODEL_SAMPLE_RATE)
    }

    /// Window length at host rate (always even)
    #[inline]
    pub fn fifo_size(&self) -> usize {
        fifo_size_for(self.sample_rate)
    }

    /// New samples between window emissions
    #[inline]
    pub fn hop_size(&self) -> usize {
        self.fifo_size() / 2
    }

    /// Output/input length ratio of the rate converter
    #[inline]
    pub fn resample_ratio(&self) -> f64 {
        CLASSIFIER_WINDOW_LEN as f64 / self.fifo_size() as f64
    }

    /// Wall-clock time between window emissions
    #[inline]
    pub fn hop_interval_secs(&self) -> f64 {
        self.hop_size() as f64 / self.sample_rate
    }

    /// Host block duration in milliseconds
    #[inline]
    pub fn block_latency_ms(&self) -> f64 {
        self.block_size as f64 / self.sample_rate * 1000.0
    }
}
