//! Per-item playback state for visible gallery cells.

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::scroll::{ScrollElement, VisibleElement};
use crate::video::{PlaybackHandle, Region, VideoHandle};

/// Share of a cell that must be on screen for it to play.
pub const VISIBILITY_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to load {src}: {reason}")]
pub struct RenderableLoadError {
    pub src: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackOptions {
    pub muted: bool,
    pub looped: bool,
    pub controls: bool,
}

impl PlaybackOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            muted: true,
            looped: true,
            controls: settings.show_controls_in_gallery_view,
        }
    }
}

/// Attaches handles to whatever draws them. The engine never draws.
pub trait RenderBinder<H: PlaybackHandle> {
    fn bind(
        &mut self,
        handle: &mut H,
        src: &str,
        region: Region,
        options: PlaybackOptions,
    ) -> Result<(), RenderableLoadError>;
    fn set_playing(&mut self, handle: &mut H, playing: bool);
    fn unbind(&mut self, handle: &mut H);
}

/// Drives `VideoHandle`s directly and logs what it does.
#[derive(Debug, Default)]
pub struct LoggingBinder {
    pub binds: usize,
    pub unbinds: usize,
}

impl RenderBinder<VideoHandle> for LoggingBinder {
    fn bind(
        &mut self,
        handle: &mut VideoHandle,
        src: &str,
        region: Region,
        options: PlaybackOptions,
    ) -> Result<(), RenderableLoadError> {
        let scheme = src.split_once("://").map(|(s, _)| s);
        if !matches!(scheme, Some("file" | "http" | "https")) {
            handle.fail("unsupported source");
            return Err(RenderableLoadError {
                src: src.to_string(),
                reason: "unsupported source".into(),
            });
        }
        handle.load(src);
        handle.set_muted(options.muted);
        handle.set_looped(options.looped);
        handle.set_controls(options.controls);
        handle.place(region);
        self.binds += 1;
        debug!(handle = handle.id(), src, column = region.column, top = region.top, "Bound handle");
        Ok(())
    }

    fn set_playing(&mut self, handle: &mut VideoHandle, playing: bool) {
        if playing {
            handle.play();
        } else {
            handle.pause();
        }
        info!(handle = handle.id(), playing, src = handle.source().unwrap_or(""), "Playback toggled");
    }

    fn unbind(&mut self, handle: &mut VideoHandle) {
        handle.stop();
        handle.clear_region();
        self.unbinds += 1;
        debug!(handle = handle.id(), "Unbound handle");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellState {
    /// Waiting for a handle to bind to.
    Loading,
    Ready { playing: bool },
    /// The source failed to load. Only this cell is affected.
    Error(String),
    /// The item has nothing to play or show.
    Placeholder,
}

/// Playback controller for one visible item.
#[derive(Debug, Clone)]
pub struct Cell {
    index: usize,
    src: Option<String>,
    is_video: bool,
    state: CellState,
    bound: Option<u64>,
}

impl Cell {
    pub fn new(index: usize, element: &ScrollElement) -> Self {
        let src = element.data.primary_src().map(str::to_string);
        let state = if src.is_none() {
            CellState::Placeholder
        } else {
            CellState::Loading
        };
        Self {
            index,
            src,
            is_video: element.data.is_video(),
            state,
            bound: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> &CellState {
        &self.state
    }

    pub fn is_placeholder(&self) -> bool {
        self.state == CellState::Placeholder
    }

    pub fn bound_handle(&self) -> Option<u64> {
        self.bound
    }

    /// Forgets the bound handle after the renderer let go of it.
    pub fn detach(&mut self) {
        if self.bound.take().is_some() {
            if let CellState::Ready { .. } = self.state {
                self.state = CellState::Loading;
            }
        }
    }

    /// Brings the cell in line with the latest frame.
    ///
    /// Binds the source the first time a handle shows up, then plays while
    /// more than half of the cell is on screen and autoplay is on.
    pub fn update<H: PlaybackHandle, B: RenderBinder<H> + ?Sized>(
        &mut self,
        visible: &VisibleElement,
        handle: Option<&mut H>,
        binder: &mut B,
        settings: &Settings,
    ) {
        if !self.is_video || matches!(self.state, CellState::Error(_) | CellState::Placeholder) {
            return;
        }
        let Some(src) = self.src.clone() else {
            return;
        };
        let Some(handle) = handle else {
            if self.bound.take().is_some() {
                debug!(index = self.index, "Cell lost its handle");
                self.state = CellState::Loading;
            }
            return;
        };

        if self.bound != Some(handle.id()) {
            let region = Region {
                column: visible.column,
                top: visible.top,
                width: visible.width,
                height: visible.height,
            };
            match binder.bind(handle, &src, region, PlaybackOptions::from_settings(settings)) {
                Ok(()) => {
                    self.bound = Some(handle.id());
                    self.state = CellState::Ready { playing: false };
                }
                Err(e) => {
                    warn!(index = self.index, error = %e, "Cell failed to load");
                    self.bound = None;
                    self.state = CellState::Error(e.to_string());
                    return;
                }
            }
        }

        let want_playing = settings.autoplay && visible.visibility > VISIBILITY_THRESHOLD;
        if let CellState::Ready { playing } = self.state {
            if playing != want_playing {
                binder.set_playing(handle, want_playing);
                self.state = CellState::Ready {
                    playing: want_playing,
                };
            }
        }
    }
}
