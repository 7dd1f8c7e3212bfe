//! Update pipeline
//!
//! Ties camera, settings, and model events to load cycles. Bursty input is
//! coalesced per channel, then a background task runs culling and fetching
//! one cycle at a time and fans results out to subscribers.

mod coalescer;
mod update_pipeline;

pub use coalescer::{
    CameraInput, ChannelCoalescer, FilterUpdate, ReadyUpdates, SettingsUpdate, CAMERA_THROTTLE,
    SETTINGS_DEBOUNCE,
};
pub use update_pipeline::UpdatePipeline;
