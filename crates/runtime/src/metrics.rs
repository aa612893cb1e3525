use std::collections::BTreeMap;

/// Counters tracked by the render loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Counter {
    FramesDrawn,
    FramesSkipped,
    BufferUploads,
    TextureUploads,
    DrawCalls,
}

impl Counter {
    pub fn as_str(self) -> &'static str {
        match self {
            Counter::FramesDrawn => "frames_drawn",
            Counter::FramesSkipped => "frames_skipped",
            Counter::BufferUploads => "buffer_uploads",
            Counter::TextureUploads => "texture_uploads",
            Counter::DrawCalls => "draw_calls",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Histogram {
    pub count: u64,
    pub sum: i64,
    pub min: i64,
    pub max: i64,
}

impl Histogram {
    pub fn record(&mut self, value: i64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }
}

/// Deterministic frame metrics.
///
/// Keyed by `Counter` in sorted maps so snapshots have stable ordering and
/// never depend on wall-clock time.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameMetrics {
    counters: BTreeMap<Counter, u64>,
    /// Draw calls issued per drawn frame.
    draws_per_frame: Histogram,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub counters: Vec<(&'static str, u64)>,
    pub draws_per_frame: Histogram,
}

impl FrameMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.counters.clear();
        self.draws_per_frame = Histogram::default();
    }

    pub fn counter(&self, counter: Counter) -> u64 {
        self.counters.get(&counter).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, counter: Counter, by: u64) {
        *self.counters.entry(counter).or_insert(0) += by;
    }

    pub fn record_frame(&mut self, draw_calls: u64) {
        self.inc(Counter::FramesDrawn, 1);
        self.inc(Counter::DrawCalls, draw_calls);
        self.draws_per_frame.record(draw_calls as i64);
    }

    pub fn draws_per_frame(&self) -> Histogram {
        self.draws_per_frame
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.iter().map(|(k, v)| (k.as_str(), *v)).collect(),
            draws_per_frame: self.draws_per_frame,
        }
    }
}
