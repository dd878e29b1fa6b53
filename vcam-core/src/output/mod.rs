//! Producer-side output
//!
//! [`VirtualCamera`] is the session a producer holds; [`FramePacer`] spaces
//! its frame delivery to the configured rate.

mod camera;
mod pacing;

pub use camera::VirtualCamera;
pub use pacing::FramePacer;
