//! Block detection.
//!
//! The target's error pages are not a stable contract, so detection is a
//! replaceable predicate over a snapshot of the page rather than strings
//! baked into the state machine.

/// What a detector gets to look at.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub title: String,
    pub html: String,
}

/// Decides whether a loaded page is a soft-block or rate-limit response.
pub trait BlockDetector: Send + Sync {
    /// `Some(reason)` when the page looks like a block.
    fn detect(&self, page: &PageSnapshot) -> Option<String>;
}

/// Marker-substring detector.
///
/// The default markers are coarse: "Error" in the title or a
/// bare "429" anywhere in the markup. Both can false-positive on unrelated
/// pages; swap in a narrower detector with [`ErrorPageSignature::new`].
#[derive(Debug, Clone)]
pub struct ErrorPageSignature {
    title_markers: Vec<String>,
    body_markers: Vec<String>,
}

impl Default for ErrorPageSignature {
    fn default() -> Self {
        Self::new(
            ["Error", "429"],
            ["429", "Too Many Requests", "unusual traffic"],
        )
    }
}

impl ErrorPageSignature {
    pub fn new<T, B>(title_markers: T, body_markers: B) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        Self {
            title_markers: title_markers.into_iter().map(Into::into).collect(),
            body_markers: body_markers.into_iter().map(Into::into).collect(),
        }
    }
}

impl BlockDetector for ErrorPageSignature {
    fn detect(&self, page: &PageSnapshot) -> Option<String> {
        if let Some(m) = self.title_markers.iter().find(|m| page.title.contains(m.as_str())) {
            return Some(format!("title contains {m:?}"));
        }
        self.body_markers
            .iter()
            .find(|m| page.html.contains(m.as_str()))
            .map(|m| format!("page contains {m:?}"))
    }
}

/// Detector that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverBlocked;

impl BlockDetector for NeverBlocked {
    fn detect(&self, _page: &PageSnapshot) -> Option<String> {
        None
    }
}
