//! Tracks the outcome of every outbound delivery

use std::collections::HashSet;

use crate::message::DeliveryTag;

/// Fate of an outbound delivery
///
/// An outcome moves from `Pending` to `Accepted` or `Rejected` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// No disposition received yet
    Pending,

    /// The broker accepted the delivery
    Accepted,

    /// The broker rejected the delivery
    Rejected,
}

/// Effect of a disposition on the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The delivery was counted, others are still outstanding
    Counted,

    /// The delivery was counted and every expected delivery is now resolved.
    /// This is returned exactly once.
    Complete,

    /// The tag is unknown or its outcome was already resolved. Nothing was counted.
    Ignored,
}

/// Counts resolved deliveries towards the expected total
#[derive(Debug)]
pub struct DeliveryOutcomeTracker {
    total: u64,
    confirmed: u64,
    pending: HashSet<DeliveryTag>,
    rejected: Vec<(DeliveryTag, Option<String>)>,
    completed: bool,
}

impl DeliveryOutcomeTracker {
    /// Creates a tracker expecting `total` deliveries
    pub fn new(total: u64) -> Self {
        Self {
            total,
            confirmed: 0,
            pending: HashSet::new(),
            rejected: Vec::new(),
            completed: false,
        }
    }

    /// Registers a delivery whose outcome is pending
    pub fn track(&mut self, tag: DeliveryTag) {
        self.pending.insert(tag);
    }

    /// Handles an accepted disposition
    pub fn on_accepted(&mut self, tag: DeliveryTag) -> Resolution {
        self.resolve(tag, DeliveryOutcome::Accepted)
    }

    /// Handles a rejected disposition
    ///
    /// A rejection counts towards completion just like an acceptance. It is
    /// recorded but never retried.
    pub fn on_rejected(&mut self, tag: DeliveryTag, condition: Option<String>) -> Resolution {
        let resolution = self.resolve(tag, DeliveryOutcome::Rejected);
        if resolution != Resolution::Ignored {
            self.rejected.push((tag, condition));
        }
        resolution
    }

    fn resolve(&mut self, tag: DeliveryTag, _outcome: DeliveryOutcome) -> Resolution {
        // Resolved deliveries are dropped, only rejections are kept
        if !self.pending.remove(&tag) {
            #[cfg(feature = "tracing")]
            tracing::warn!(%tag, outcome = ?_outcome, "Ignoring disposition");
            #[cfg(feature = "log")]
            log::warn!("Ignoring disposition {:?} of delivery {}", _outcome, tag);
            return Resolution::Ignored;
        }

        self.confirmed += 1;
        if self.confirmed == self.total && !self.completed {
            self.completed = true;
            Resolution::Complete
        } else {
            Resolution::Counted
        }
    }

    /// Forgets every pending delivery and returns how many there were
    ///
    /// Used when the transport is gone and no outcome can arrive anymore.
    pub fn abandon(&mut self) -> u64 {
        let abandoned = self.pending.len() as u64;
        self.pending.clear();
        abandoned
    }

    /// Outcome of a delivery
    ///
    /// Accepted deliveries are not retained and report `None` like unknown tags.
    pub fn outcome(&self, tag: DeliveryTag) -> Option<DeliveryOutcome> {
        if self.pending.contains(&tag) {
            Some(DeliveryOutcome::Pending)
        } else if self.rejected.iter().any(|(rejected, _)| *rejected == tag) {
            Some(DeliveryOutcome::Rejected)
        } else {
            None
        }
    }

    /// Number of resolved deliveries
    pub fn confirmed(&self) -> u64 {
        self.confirmed
    }

    /// Number of deliveries still pending
    pub fn outstanding(&self) -> u64 {
        self.pending.len() as u64
    }

    /// Rejected deliveries with their remote condition
    pub fn rejected(&self) -> &[(DeliveryTag, Option<String>)] {
        &self.rejected
    }

    /// Whether every expected delivery is resolved
    pub fn is_complete(&self) -> bool {
        self.completed
    }
}
