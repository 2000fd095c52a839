//! Envelope range index.
//!
//! [`EnvelopeIndex`] keeps entries in a single vector sorted by `min_x`. A
//! query binary-searches for the last entry whose `min_x` can still reach the
//! query window (`min_x <= query.max_x`) and then applies the full envelope
//! intersection test to that prefix. This is cheap to build, which matters
//! because transaction overlays rebuild it after every mutation.

use crate::geometry::Envelope;

/// Bounding-box range query over a set of items.
pub trait SpatialIndex<T> {
    /// Items whose envelope intersects `envelope` (inclusive edges), in index
    /// order.
    fn query(&self, envelope: &Envelope) -> Vec<&T>;

    /// Number of indexed items.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sorted-vector envelope index.
#[derive(Debug, Clone)]
pub struct EnvelopeIndex<T> {
    entries: Vec<(Envelope, T)>,
}

impl<T> EnvelopeIndex<T> {
    /// Build from `(envelope, item)` pairs. Empty envelopes are dropped since
    /// they intersect nothing.
    pub fn build(items: impl IntoIterator<Item = (Envelope, T)>) -> Self {
        let mut entries: Vec<(Envelope, T)> =
            items.into_iter().filter(|(e, _)| !e.is_empty()).collect();
        entries.sort_by(|a, b| a.0.min_x.total_cmp(&b.0.min_x));
        tracing::trace!(entries = entries.len(), "built envelope index");
        Self { entries }
    }

    /// Envelope covering every indexed item.
    pub fn bounds(&self) -> Envelope {
        let mut env = Envelope::EMPTY;
        for (e, _) in &self.entries {
            env.expand_to_include(e);
        }
        env
    }
}

impl<T> Default for EnvelopeIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> SpatialIndex<T> for EnvelopeIndex<T> {
    fn query(&self, envelope: &Envelope) -> Vec<&T> {
        if envelope.is_empty() || self.entries.is_empty() {
            return Vec::new();
        }
        let end = self
            .entries
            .partition_point(|(e, _)| e.min_x <= envelope.max_x);
        self.entries[..end]
            .iter()
            .filter(|(e, _)| e.intersects(envelope))
            .map(|(_, item)| item)
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
