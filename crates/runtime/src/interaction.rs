use foundation::math::Vec2;
use tracing::debug;

use crate::frame::DrawContext;
use crate::host::GestureKind;

/// View anchor used to place geometry for a frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewAnchor {
    /// View center in zoom-0 map-space pixels.
    pub center: Vec2,
    pub zoom: f64,
    /// Top-left canvas corner in zoom-0 map-space pixels.
    pub offset: Vec2,
}

impl ViewAnchor {
    pub fn new(center: Vec2, zoom: f64, offset: Vec2) -> Self {
        Self {
            center,
            zoom,
            offset,
        }
    }

    pub fn from_context(ctx: &DrawContext) -> Self {
        Self::new(ctx.center, ctx.zoom, ctx.offset)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    Interacting,
}

/// Freezes the view anchor for the duration of a gesture.
///
/// The host animates the canvas itself while a pan/zoom/drag is in flight, so
/// the overlay keeps drawing against the anchor captured at gesture start and
/// snaps to the live view once the gesture ends.
///
/// Nesting contract:
/// - Only the first start of a nested sequence captures a snapshot.
/// - Any end releases it (a held/not-held flag, not a counter), so two starts
///   followed by one end return to `Idle`.
/// - An end without a held snapshot is a no-op.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InteractionCache {
    snapshot: Option<ViewAnchor>,
    redraw_requested: bool,
}

impl InteractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InteractionState {
        if self.snapshot.is_some() {
            InteractionState::Interacting
        } else {
            InteractionState::Idle
        }
    }

    pub fn is_interacting(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Returns `true` if this call captured the snapshot.
    pub fn start_gesture(&mut self, kind: GestureKind, live: ViewAnchor) -> bool {
        if self.snapshot.is_some() {
            debug!(?kind, "gesture start while interacting; keeping snapshot");
            return false;
        }
        debug!(?kind, zoom = live.zoom, "gesture start; anchor captured");
        self.snapshot = Some(live);
        true
    }

    /// Returns `true` if this call released a snapshot.
    pub fn end_gesture(&mut self, kind: GestureKind) -> bool {
        if self.snapshot.take().is_none() {
            debug!(?kind, "gesture end without start; ignored");
            return false;
        }
        debug!(?kind, "gesture end; anchor released");
        self.redraw_requested = true;
        true
    }

    /// The anchor to draw with this frame.
    ///
    /// Must be called fresh every frame; the result is never cached.
    pub fn anchor(&self, live: ViewAnchor) -> ViewAnchor {
        self.snapshot.unwrap_or(live)
    }

    pub fn snapshot(&self) -> Option<ViewAnchor> {
        self.snapshot
    }

    pub fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }

    /// Consumes a pending redraw request.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.redraw_requested)
    }
}
