use foundation::math::LatLng;
use gpu::{LayerId, RenderableLayer};
use scene::Feature;
use tracing::trace;

use crate::layer::GlLayer;
use crate::settings::LayerKind;

/// Pointer position and the map zoom it was observed at.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PointerEvent {
    pub lat_lng: LatLng,
    pub zoom: f64,
}

impl PointerEvent {
    pub fn new(lat_lng: LatLng, zoom: f64) -> Self {
        Self { lat_lng, zoom }
    }
}

/// Returning `Some(false)` tells the host the event was not consumed.
pub type ClickHandler<P> = Box<dyn FnMut(&PointerEvent, &Feature<P>) -> Option<bool>>;
pub type HoverHandler<P> = Box<dyn FnMut(&PointerEvent, &Feature<P>) -> Option<bool>>;
pub type HoverOffHandler<P> = Box<dyn FnMut(&PointerEvent, &Feature<P>)>;

/// Result of one hover dispatch across all layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoverReport {
    /// Hover handler results, in layer order.
    pub results: Vec<bool>,
    pub entered: Vec<(LayerId, usize)>,
    pub left: Vec<(LayerId, usize)>,
}

impl HoverReport {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.entered.is_empty() && self.left.is_empty()
    }
}

/// Explicit collection of live layers. Click and hover dispatch walk it in
/// kind order, then insertion order.
pub struct LayerRegistry<P> {
    layers: Vec<GlLayer<P>>,
    next_id: u64,
}

impl<P> Default for LayerRegistry<P> {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            next_id: 1,
        }
    }
}

impl<P> std::fmt::Debug for LayerRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.layers.iter()).finish()
    }
}

impl<P> LayerRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves an id for a layer about to be constructed.
    pub fn next_id(&mut self) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add(&mut self, layer: GlLayer<P>) -> LayerId {
        let id = layer.id();
        self.next_id = self.next_id.max(id.0 + 1);
        self.layers.push(layer);
        id
    }

    pub fn get(&self, id: LayerId) -> Option<&GlLayer<P>> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut GlLayer<P>> {
        self.layers.iter_mut().find(|l| l.id() == id)
    }

    pub fn remove(&mut self, id: LayerId) -> Option<GlLayer<P>> {
        let position = self.layers.iter().position(|l| l.id() == id)?;
        Some(self.layers.remove(position))
    }

    pub fn iter(&self) -> impl Iterator<Item = &GlLayer<P>> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn renderables(&self) -> Vec<&dyn RenderableLayer> {
        self.layers.iter().map(|l| l as &dyn RenderableLayer).collect()
    }

    /// Dispatches a click.
    ///
    /// Kinds are tried in `LayerKind::ALL` order. Within a kind the closest
    /// feature across active layers wins (the earliest layer on a tie), and
    /// it must lie within its layer's click radius. The first kind with a hit
    /// ends dispatch: its handler's result is returned, `Some(true)` when the
    /// handler is missing or returns nothing. `None` means nothing was hit.
    pub fn try_click(&mut self, event: &PointerEvent) -> Option<bool> {
        for kind in LayerKind::ALL {
            let Some((slot, index)) = self.closest_hit(kind, event) else {
                continue;
            };
            let layer = &mut self.layers[slot];
            trace!(layer = layer.id().0, kind = kind.as_str(), index, "click hit");
            return Some(layer.fire_click(event, index).unwrap_or(true));
        }
        None
    }

    fn closest_hit(&self, kind: LayerKind, event: &PointerEvent) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (slot, layer) in self.layers.iter().enumerate() {
            if layer.kind() != kind || !layer.is_active() {
                continue;
            }
            let Some(hit) = layer.pick(event.lat_lng) else {
                continue;
            };
            let distance = hit.screen_distance(event.zoom);
            if distance > layer.settings().click_radius(hit.metadata.size) {
                continue;
            }
            if best.is_none_or(|(_, _, d)| distance < d) {
                best = Some((slot, hit.metadata.index, distance));
            }
        }
        best.map(|(slot, index, _)| (slot, index))
    }

    /// Dispatches a pointer move to every active layer.
    pub fn try_hover(&mut self, event: &PointerEvent) -> HoverReport {
        let mut report = HoverReport::default();
        for layer in self.layers.iter_mut().filter(|l| l.is_active()) {
            let id = layer.id();
            let update = layer.update_hover(event);
            report.results.extend(update.result);
            report.entered.extend(update.delta.entered.into_iter().map(|i| (id, i)));
            report.left.extend(update.delta.left.into_iter().map(|i| (id, i)));
        }
        report
    }
}
