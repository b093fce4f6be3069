use models::{Presentation, Transaction};

/// Result of offering a transaction to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Applied,
    Rejected,
}

/// The single mutable slot behind presence: the newest qualifying
/// transaction and the last presentation handed to the sinks.
///
/// `last.created_at` never moves backwards. `generation` counts recorded
/// changes, so a dispatch can tell whether its presentation is still current.
/// Callers serialize access (the reconciler keeps this behind one lock).
#[derive(Debug, Default)]
pub struct CachedState {
    last: Option<Transaction>,
    rendered: Option<Presentation>,
    generation: u64,
}

impl CachedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic merge: only a strictly newer transaction replaces the
    /// cached one. Ties keep the first writer.
    pub fn offer(&mut self, tx: Transaction) -> Offer {
        if let Some(current) = &self.last {
            if tx.created_at <= current.created_at {
                return Offer::Rejected;
            }
        }
        self.last = Some(tx);
        Offer::Applied
    }

    pub fn latest(&self) -> Option<&Transaction> {
        self.last.as_ref()
    }

    pub fn rendered(&self) -> Option<&Presentation> {
        self.rendered.as_ref()
    }

    /// Stores `presentation` as the last rendered output. Returns true when
    /// it differs from what was there before.
    pub fn record(&mut self, presentation: Presentation) -> bool {
        if self.rendered.as_ref() == Some(&presentation) {
            return false;
        }
        self.rendered = Some(presentation);
        self.generation += 1;
        true
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
