//! feedwall: an infinitely scrolling media wall.
//!
//! Items come from feeds (a local directory, remote JSON feeds, an
//! aggregator) interleaved by weight, are laid out in balanced columns and
//! only the visible ones hold one of a bounded set of playback handles.

pub mod config;
pub mod feed;
pub mod gallery;
pub mod layout;
pub mod models;
pub mod scroll;
pub mod sources;
pub mod video;
