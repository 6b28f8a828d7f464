//! aq-dsp: Windowing and rate conversion for the classification pipeline
//!
//! - [`Windower`]: circular buffer emitting 50%-overlapping windows
//! - [`RateConverter`]: fixed-length sinc conversion to the model rate
//!
//! Neither type allocates after `prepare`.

mod resample;
mod windower;

pub use resample::RateConverter;
pub use windower::Windower;
