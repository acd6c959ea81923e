//! Local media acquisition.
//!
//! The capture device sits behind the [`MediaDevices`] seam so the
//! session core can run against synthetic capture in tests and demos.

pub mod devices;
pub mod source;

pub use devices::{MediaDevices, SyntheticDevices};
pub use source::{LocalMediaSource, LocalTrack, MediaKind};
