//! Transport resolver

use std::collections::VecDeque;

use st_core::config::NetworkMode;
use st_core::{Profile, TransportCandidate, TransportKind};

/// Ordered candidates for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportPlan {
    candidates: VecDeque<TransportCandidate>,
}

impl TransportPlan {
    /// Take the next candidate to try
    pub fn next_candidate(&mut self) -> Option<TransportCandidate> {
        self.candidates.pop_front()
    }

    /// Candidates not yet taken, in order
    pub fn remaining(&self) -> impl Iterator<Item = &TransportCandidate> {
        self.candidates.iter()
    }

    /// Drain everything not yet taken
    pub fn drain_remaining(&mut self) -> Vec<TransportCandidate> {
        self.candidates.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Build the transport plan for a validated profile
///
/// Candidates follow `transport_order` verbatim and each one gets the full
/// `connect_timeout`; they are tried one after another, never in parallel.
/// `network = "direct"` profiles never plan mosh.
pub fn plan(profile: &Profile) -> TransportPlan {
    TransportPlan {
        candidates: profile
            .transport_order
            .iter()
            .filter(|kind| profile.network != NetworkMode::Direct || **kind != TransportKind::Mosh)
            .map(|kind| TransportCandidate::from_profile(profile, *kind))
            .collect(),
    }
}
