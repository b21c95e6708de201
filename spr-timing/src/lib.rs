pub mod timer;

pub use timer::{FrameTimingStats, HighPrecisionTimer, ManualTimer, Timer, ns_to_ms};
