//! hlspack - on-demand HLS packaging
//!
//! Repackages source video files into segmented HLS packages (primary
//! playlist, optional per-track audio playlists and subtitles) by driving
//! ffmpeg, and serves the resulting package tree.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod layout;
pub mod media;
pub mod pipeline;
pub mod repository;
pub mod server;
pub mod subtitle;
pub mod workflow;
