//! Headless playback handles.
//!
//! A handle stands in for one costly playback element. The engine only ever
//! creates, resets and drops handles; everything else is driven by the
//! injected binder.

use tracing::{debug, trace, warn};

/// Something the resource pool can hand out.
pub trait PlaybackHandle {
    fn id(&self) -> u64;
    /// Stop playback, clear the source and rewind.
    fn reset(&mut self);
}

pub trait HandleFactory {
    type Handle: PlaybackHandle;
    fn create(&mut self, id: u64) -> Self::Handle;
}

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Seek direction for relative seeks
#[derive(Debug, Clone, Copy)]
pub enum SeekDirection {
    Forward,
    Backward,
}

/// Where a bound handle is drawn, in gallery coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Region {
    pub column: usize,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Playback model without a decoder behind it.
#[derive(Debug)]
pub struct VideoHandle {
    id: u64,
    source: Option<String>,
    state: PlaybackState,
    position: f64,
    muted: bool,
    looped: bool,
    controls: bool,
    region: Option<Region>,
    last_error: Option<String>,
}

impl VideoHandle {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            source: None,
            state: PlaybackState::Stopped,
            position: 0.0,
            muted: true,
            looped: true,
            controls: false,
            region: None,
            last_error: None,
        }
    }

    /// Point the handle at a new source. Playback stays stopped until `play`.
    pub fn load(&mut self, url: &str) {
        if url.is_empty() {
            self.fail("empty source");
            return;
        }
        self.source = Some(url.to_string());
        self.state = PlaybackState::Stopped;
        self.position = 0.0;
        self.last_error = None;
        debug!(handle = self.id, url, "Loaded source");
    }

    pub fn play(&mut self) {
        if self.source.is_none() {
            warn!(handle = self.id, "Play requested with no source loaded");
            return;
        }
        self.state = PlaybackState::Playing;
        trace!(handle = self.id, "Playing");
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            trace!(handle = self.id, "Paused");
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Playing;
        }
    }

    pub fn toggle_pause(&mut self) {
        match self.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused => self.resume(),
            PlaybackState::Stopped => {}
        }
    }

    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
    }

    pub fn seek_absolute(&mut self, position: f64) {
        self.position = position.max(0.0);
    }

    pub fn seek_relative(&mut self, seconds: f64, direction: SeekDirection) {
        let offset = match direction {
            SeekDirection::Forward => seconds,
            SeekDirection::Backward => -seconds,
        };
        self.seek_absolute(self.position + offset);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }

    pub fn set_looped(&mut self, looped: bool) {
        self.looped = looped;
    }

    pub fn set_controls(&mut self, controls: bool) {
        self.controls = controls;
    }

    pub fn place(&mut self, region: Region) {
        self.region = Some(region);
    }

    pub fn clear_region(&mut self) {
        self.region = None;
    }

    /// Record a load failure and drop the source.
    pub fn fail(&mut self, reason: &str) {
        warn!(handle = self.id, reason, "Playback failed");
        self.source = None;
        self.state = PlaybackState::Stopped;
        self.last_error = Some(reason.to_string());
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_looped(&self) -> bool {
        self.looped
    }

    pub fn has_controls(&self) -> bool {
        self.controls
    }

    pub fn region(&self) -> Option<Region> {
        self.region
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl PlaybackHandle for VideoHandle {
    fn id(&self) -> u64 {
        self.id
    }

    fn reset(&mut self) {
        self.stop();
        self.source = None;
        self.position = 0.0;
        self.region = None;
        self.last_error = None;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VideoHandleFactory;

impl HandleFactory for VideoHandleFactory {
    type Handle = VideoHandle;

    fn create(&mut self, id: u64) -> VideoHandle {
        debug!(handle = id, "Creating video handle");
        VideoHandle::new(id)
    }
}
