//! Gaze-driven dwell menus for a head-mounted camera
//!
//! A smoothed gaze pointer selects menu entries by hovering over them for a
//! fixed time. Selections and recognized voice phrases become device commands,
//! and each one leaves a short confirmation on screen.

pub mod clock;
pub mod command;
pub mod config;
pub mod device;
pub mod dwell;
pub mod error;
pub mod feedback;
pub mod geometry;
pub mod interaction;
pub mod logging;
pub mod menu;
pub mod pointer;
pub mod render;
pub mod scenario;
pub mod state;
pub mod stats;
pub mod voice;

pub use error::{Error, Result};
