//! # Audio Module
//!
//! Per-guild playback for Guild Jukebox.
//!
//! ## Architecture
//!
//! ### [`controller`] - Playback State Machine
//! - Enqueue, skip, pause, resume and stop for every guild
//! - Auto-advance driven by track completion events
//!
//! ### [`session`] / [`registry`] - Guild State
//! - FIFO queue, current track and voice handle of one guild
//! - One session per guild, dropped once playback ends
//!
//! ### [`transport`] - Voice Seam
//! - Traits the controller drives; [`songbird_transport`] implements them
//!   on top of Songbird
//!
//! Everything here is owned by the runtime task (see [`crate::runtime`]);
//! other threads reach it only through the command bridge.

pub mod controller;
pub mod registry;
pub mod session;
pub mod songbird_transport;
pub mod track;
pub mod transport;
