//! # AQUA Real-Time Pipeline
//!
//! Streaming audio classification for host audio callbacks:
//! - Sample-by-sample windowing with 50% overlap
//! - Rate conversion to the model rate and one inference per hop
//! - Lock-free snapshot publishing to a consumer thread
//! - Optional background worker fed through a lock-free ring
//!
//! ## Threads
//!
//! The classifier is owned by the thread that pushes samples. The
//! [`SnapshotReader`] returned at construction is the only handle another
//! thread needs; it never blocks the writer.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod publisher;
mod stage;
pub mod state;
pub mod stats;
pub mod worker;

pub use config::*;
pub use error::*;
pub use pipeline::*;
pub use publisher::*;
pub use stage::FrameOutcome;
pub use state::*;
pub use stats::*;
pub use worker::*;
