/// Fixed draw order within a frame.
///
/// Later passes draw over earlier ones: label backgrounds must cover icon
/// edges and glyphs must cover backgrounds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DrawPass {
    Shapes,
    Lines,
    Points,
    LabelBackgrounds,
    LabelGlyphs,
}

impl DrawPass {
    pub const ALL: [DrawPass; 5] = [
        DrawPass::Shapes,
        DrawPass::Lines,
        DrawPass::Points,
        DrawPass::LabelBackgrounds,
        DrawPass::LabelGlyphs,
    ];
}

/// One scheduled draw: which layer and which of its batches.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScheduledDraw {
    pub pass: DrawPass,
    pub layer: usize,
    pub batch: usize,
}

/// Orders batches from all layers into pass order.
///
/// Ordering contract:
/// - Passes run in `DrawPass` order.
/// - Within a pass, layers keep registration order and batches keep the
///   order their layer listed them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenderGraph {
    draws: Vec<ScheduledDraw>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pass: DrawPass, layer: usize, batch: usize) {
        self.draws.push(ScheduledDraw { pass, layer, batch });
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Draws in execution order.
    pub fn ordered(&self) -> Vec<ScheduledDraw> {
        let mut out = self.draws.clone();
        // Stable: preserves push order inside each pass.
        out.sort_by_key(|d| d.pass);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{DrawPass, RenderGraph};
    use pretty_assertions::assert_eq;

    #[test]
    fn orders_by_pass_then_push_order() {
        let mut graph = RenderGraph::new();
        graph.push(DrawPass::LabelGlyphs, 0, 2);
        graph.push(DrawPass::Points, 0, 0);
        graph.push(DrawPass::LabelBackgrounds, 0, 1);
        graph.push(DrawPass::Shapes, 1, 0);
        graph.push(DrawPass::Points, 2, 0);

        let order: Vec<(DrawPass, usize)> = graph.ordered().iter().map(|d| (d.pass, d.layer)).collect();
        assert_eq!(
            order,
            vec![
                (DrawPass::Shapes, 1),
                (DrawPass::Points, 0),
                (DrawPass::Points, 2),
                (DrawPass::LabelBackgrounds, 0),
                (DrawPass::LabelGlyphs, 0),
            ]
        );
    }
}
