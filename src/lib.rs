//! Playlist entry to audio catalog matching: shared modules for both binaries.

pub mod batch;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod parser;
pub mod progress;
pub mod ranking;
pub mod safety;
pub mod scoring;
