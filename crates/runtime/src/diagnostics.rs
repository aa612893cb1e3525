use tracing::warn;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticKind {
    /// A feature was skipped during a build (bad coordinates).
    MalformedFeature,
    /// An icon image or font atlas failed to load; the layer stays inert.
    AssetLoadFailure,
    /// GPU context loss, shader failure or draw failure.
    GpuFault,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::MalformedFeature => "malformed_feature",
            DiagnosticKind::AssetLoadFailure => "asset_load_failure",
            DiagnosticKind::GpuFault => "gpu_fault",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub frame_index: u64,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Ordered channel for recoverable problems.
///
/// Every entry is also logged through `tracing`, but callers that need to
/// react (or assert in tests) read them back from here.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    frame_index: u64,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags subsequent entries with `frame_index`.
    pub fn set_frame(&mut self, frame_index: u64) {
        self.frame_index = frame_index;
    }

    pub fn emit(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        warn!(kind = kind.as_str(), frame = self.frame_index, "{message}");
        self.entries.push(Diagnostic {
            frame_index: self.frame_index,
            kind,
            message,
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::{DiagnosticKind, Diagnostics};

    #[test]
    fn records_entries_with_frame_index() {
        let mut diag = Diagnostics::new();
        diag.set_frame(2);
        diag.emit(DiagnosticKind::MalformedFeature, "feature 3: latitude is NaN");
        assert_eq!(diag.entries().len(), 1);
        assert_eq!(diag.entries()[0].frame_index, 2);
        assert_eq!(diag.count(DiagnosticKind::MalformedFeature), 1);
        assert_eq!(diag.count(DiagnosticKind::GpuFault), 0);
    }

    #[test]
    fn drain_clears_entries() {
        let mut diag = Diagnostics::new();
        diag.emit(DiagnosticKind::GpuFault, "context lost");
        let drained = diag.drain();
        assert_eq!(drained.len(), 1);
        assert!(diag.is_empty());
    }
}
