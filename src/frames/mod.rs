// src/frames/mod.rs
//
// Frame addressing, range handling, availability probing and the catalog
// of frames that survived probing.

mod address;
mod catalog;
mod probe;
mod range;

pub use address::{frame_time, DisplayTime, FrameAddress, FrameAddressing, TimePoint};
pub use catalog::FrameCatalog;
pub use probe::{
    batch_progress, probe_frames, PreloadStatus, ProbeOutcome, ProbeRequest, ProbeSummary,
};
pub use range::{
    default_base_time, floor_to_interval, parse_time_param, Clock, FixedClock, RangeExtent,
    SystemClock, TimeRange,
};
