//! Fixed-length sample rate conversion
//!
//! Converts each host-rate window into exactly the number of samples the
//! classifier expects. Conversion runs in streaming mode: the sinc filter state
//! carries over from one window to the next and is never flushed.
//!
//! A fresh sinc resampler holds back part of its first chunk while its history
//! fills. `prepare` runs one silent window through it, so the first real window
//! already comes out at full length instead of with a zero-padded tail.

use aq_core::{AqError, AqResult};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    calculate_cutoff,
};

/// Sinc filter length (taps per side pair)
const SINC_LEN: usize = 256;

/// Interpolation table oversampling
const OVERSAMPLING: usize = 256;

/// Window applied to the sinc kernel
const SINC_WINDOW: WindowFunction = WindowFunction::BlackmanHarris2;

/// Window-to-window rate converter with a fixed input and output length
#[derive(Default)]
pub struct RateConverter {
    /// Sinc resampler, `None` when bypassed or unprepared
    resampler: Option<SincFixedIn<f32>>,
    /// Resampler output, allocated at prepare
    output_buffer: Vec<Vec<f32>>,
    /// Output/input length ratio
    ratio: f64,
    /// Expected input length
    input_len: usize,
    /// Produced output length
    output_len: usize,
}

impl RateConverter {
    /// Create an unprepared converter
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure for `input_len` samples in, `output_len` samples out.
    ///
    /// Any previous resampler is dropped before the new one is built.
    pub fn prepare(&mut self, input_len: usize, output_len: usize) -> AqResult<()> {
        self.release();

        if input_len == 0 || output_len == 0 {
            return Err(AqError::InvalidParam(format!(
                "rate converter lengths must be non-zero (in {input_len}, out {output_len})"
            )));
        }

        let ratio = output_len as f64 / input_len as f64;

        if input_len != output_len {
            let params = SincInterpolationParameters {
                sinc_len: SINC_LEN,
                f_cutoff: calculate_cutoff(SINC_LEN, SINC_WINDOW),
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: OVERSAMPLING,
                window: SINC_WINDOW,
            };

            let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, input_len, 1)
                .map_err(|e| AqError::Resample(e.to_string()))?;

            self.output_buffer = resampler.output_buffer_allocate(true);

            // Silence matches the zero-filled window history
            let silence = vec![0.0f32; input_len];
            let wave_in = [silence.as_slice()];
            resampler
                .process_into_buffer(&wave_in[..], &mut self.output_buffer, None)
                .map_err(|e| AqError::Resample(e.to_string()))?;

            log::info!(
                "Rate converter prepared: {} -> {} samples (ratio {:.6}, delay {} frames)",
                input_len,
                output_len,
                ratio,
                resampler.output_delay()
            );

            self.resampler = Some(resampler);
        } else {
            log::info!("Rate converter bypassed: {} samples", input_len);
        }

        self.ratio = ratio;
        self.input_len = input_len;
        self.output_len = output_len;

        Ok(())
    }

    /// Convert one window.
    ///
    /// `input` must hold exactly `input_len` samples and `output` exactly
    /// `output_len`. At ratio 1.0 the input is copied unchanged.
    pub fn convert(&mut self, input: &[f32], output: &mut [f32]) -> AqResult<()> {
        if self.input_len == 0 {
            return Err(AqError::NotPrepared("RateConverter"));
        }
        if input.len() != self.input_len {
            return Err(AqError::SizeMismatch {
                context: "rate converter input",
                expected: self.input_len,
                got: input.len(),
            });
        }
        if output.len() != self.output_len {
            return Err(AqError::SizeMismatch {
                context: "rate converter output",
                expected: self.output_len,
                got: output.len(),
            });
        }

        let Some(resampler) = self.resampler.as_mut() else {
            output.copy_from_slice(input);
            return Ok(());
        };

        let wave_in = [input];
        let (_, written) = resampler
            .process_into_buffer(&wave_in[..], &mut self.output_buffer, None)
            .map_err(|e| AqError::Resample(e.to_string()))?;

        let produced = &self.output_buffer[0];
        let n = written.min(produced.len()).min(output.len());
        output[..n].copy_from_slice(&produced[..n]);
        output[n..].fill(0.0);

        Ok(())
    }

    /// Drop the resampler and return to the unprepared state
    pub fn release(&mut self) {
        self.resampler = None;
        self.output_buffer = Vec::new();
        self.ratio = 0.0;
        self.input_len = 0;
        self.output_len = 0;
    }

    /// True when input and output lengths match and samples are copied
    pub fn is_bypass(&self) -> bool {
        self.input_len != 0 && self.resampler.is_none()
    }

    /// Output/input length ratio
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn input_len(&self) -> usize {
        self.input_len
    }

    pub fn output_len(&self) -> usize {
        self.output_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bypass_is_exact() {
        let mut converter = RateConverter::new();
        converter.prepare(512, 512).unwrap();
        assert!(converter.is_bypass());
        assert_eq!(converter.ratio(), 1.0);

        let input: Vec<f32> = (0..512).map(|i| (i as f32 * 0.013).sin()).collect();
        let mut output = vec![0.0; 512];
        converter.convert(&input, &mut output).unwrap();
        assert_eq!(input, output);
    }

    #[test]
    fn test_convert_before_prepare_fails() {
        let mut converter = RateConverter::new();
        let mut output = vec![0.0; 8];
        assert!(matches!(
            converter.convert(&[0.0; 8], &mut output),
            Err(AqError::NotPrepared(_))
        ));
    }

    #[test]
    fn test_rejects_zero_lengths() {
        let mut converter = RateConverter::new();
        assert!(converter.prepare(0, 16).is_err());
        assert!(converter.prepare(16, 0).is_err());
    }

    #[test]
    fn test_size_mismatch() {
        let mut converter = RateConverter::new();
        converter.prepare(960, 320).unwrap();
        let mut output = vec![0.0; 320];
        assert!(converter.convert(&[0.0; 100], &mut output).is_err());
        let mut short = vec![0.0; 10];
        assert!(converter.convert(&[0.0; 960], &mut short).is_err());
    }

    #[test]
    fn test_downsample_produces_fixed_length() {
        let mut converter = RateConverter::new();
        converter.prepare(4608, 1536).unwrap();
        assert!(!converter.is_bypass());

        let input: Vec<f32> = (0..4608).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let mut output = vec![0.0; 1536];
        for _ in 0..4 {
            converter.convert(&input, &mut output).unwrap();
            assert_eq!(output.len(), 1536);
            assert!(output.iter().all(|s| s.is_finite()));
        }
    }

    #[test]
    fn test_first_window_has_no_padded_tail() {
        // 44.1 kHz window down to the classifier length
        let mut converter = RateConverter::new();
        converter.prepare(42336, 15360).unwrap();

        let input = vec![0.25; 42336];
        let mut output = vec![0.0; 15360];
        converter.convert(&input, &mut output).unwrap();

        for &s in &output[15360 - 256..] {
            approx::assert_abs_diff_eq!(s, 0.25, epsilon = 0.02);
        }
    }

    #[test]
    fn test_reprepare_switches_mode() {
        let mut converter = RateConverter::new();
        converter.prepare(4608, 1536).unwrap();
        converter.prepare(1536, 1536).unwrap();
        assert!(converter.is_bypass());
        converter.release();
        assert!(!converter.is_bypass());
        assert_eq!(converter.input_len(), 0);
    }
}
