// Auction draw state: identifiers, phases, the completed ledger, and the
// invariant that ties them together.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// A draw slot / player-card number in `1..=pool_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(u32);

impl Identifier {
    /// Returns `None` for zero; identifiers are 1-based.
    pub fn new(value: u32) -> Option<Self> {
        (value > 0).then_some(Identifier(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Every identifier of an auction with `pool_size` cards, in order.
    pub fn full_set(pool_size: u32) -> impl Iterator<Item = Identifier> {
        (1..=pool_size).map(Identifier)
    }

    /// File name of the card image for this identifier (e.g. `42.png`).
    pub fn asset_name(self, extension: &str) -> String {
        format!("{}.{}", self.0, extension.trim_start_matches('.'))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Phase / ledger
// ---------------------------------------------------------------------------

/// Where the auction is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    NotStarted,
    /// Drawing from the main pool; unsold cards are requeued.
    Main,
    /// Re-offering the cards that went unsold in the main round.
    UnsoldRound,
    Complete,
}

/// Result of offering a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Sold,
    Unsold,
}

/// A resolved card in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedEntry {
    pub id: Identifier,
    pub status: Outcome,
}

// ---------------------------------------------------------------------------
// AuctionState
// ---------------------------------------------------------------------------

/// The complete draw state. Owned by the phase controller and checkpointed
/// to the state store after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuctionState {
    pub phase: Phase,
    /// Cards not yet drawn in the main round.
    pub main_pool: Vec<Identifier>,
    /// Cards that went unsold in the main round, waiting for the unsold round.
    pub unsold_pool: Vec<Identifier>,
    /// Append-only ledger of resolved cards.
    pub completed: Vec<CompletedEntry>,
    /// The committed draw currently on offer, if any.
    pub current_id: Option<Identifier>,
    /// A reveal for `current_id` has been requested and not yet finished.
    pub pending_animation: bool,
}

impl AuctionState {
    /// The pool draws come from in the current phase.
    pub fn active_pool(&self) -> &[Identifier] {
        match self.phase {
            Phase::Main => &self.main_pool,
            Phase::UnsoldRound => &self.unsold_pool,
            Phase::NotStarted | Phase::Complete => &[],
        }
    }

    pub(crate) fn active_pool_mut(&mut self) -> Option<&mut Vec<Identifier>> {
        match self.phase {
            Phase::Main => Some(&mut self.main_pool),
            Phase::UnsoldRound => Some(&mut self.unsold_pool),
            Phase::NotStarted | Phase::Complete => None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.phase != Phase::NotStarted
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Identifiers resolved as `status`, in ledger order.
    pub fn ledger_ids(&self, status: Outcome) -> impl Iterator<Item = Identifier> + '_ {
        self.completed
            .iter()
            .filter(move |e| e.status == status)
            .map(|e| e.id)
    }

    pub fn sold_count(&self) -> usize {
        self.ledger_ids(Outcome::Sold).count()
    }

    pub fn unsold_count(&self) -> usize {
        self.ledger_ids(Outcome::Unsold).count()
    }

    /// Whether the ledger holds at least one terminal Unsold entry.
    pub fn has_unsold_entries(&self) -> bool {
        self.completed.iter().any(|e| e.status == Outcome::Unsold)
    }

    /// Number of cards still to be offered in this phase, including the one
    /// currently on offer.
    pub fn remaining_in_phase(&self) -> usize {
        self.active_pool().len() + usize::from(self.current_id.is_some())
    }

    /// Verify that every identifier in `1..=pool_size` sits in exactly one of
    /// main pool, unsold pool, ledger, or current draw, and that the phase
    /// agrees with which of those are populated.
    pub fn check_invariants(&self, pool_size: u32) -> Result<(), InvariantViolation> {
        if self.phase == Phase::NotStarted {
            if !self.main_pool.is_empty()
                || !self.unsold_pool.is_empty()
                || !self.completed.is_empty()
                || self.current_id.is_some()
            {
                return Err(InvariantViolation::DataBeforeStart);
            }
            return Ok(());
        }

        let mut seen: HashSet<Identifier> = HashSet::with_capacity(pool_size as usize);
        let all = self
            .main_pool
            .iter()
            .chain(self.unsold_pool.iter())
            .chain(self.completed.iter().map(|e| &e.id))
            .chain(self.current_id.iter());
        for &id in all {
            if id.get() > pool_size {
                return Err(InvariantViolation::OutOfRange { id, pool_size });
            }
            if !seen.insert(id) {
                return Err(InvariantViolation::Duplicate { id });
            }
        }
        if let Some(id) = Identifier::full_set(pool_size).find(|id| !seen.contains(id)) {
            return Err(InvariantViolation::Missing { id });
        }

        match self.phase {
            Phase::UnsoldRound if !self.main_pool.is_empty() => {
                Err(InvariantViolation::PhaseMismatch {
                    phase: self.phase,
                    reason: "main pool must be drained before the unsold round",
                })
            }
            Phase::Complete
                if !self.main_pool.is_empty()
                    || !self.unsold_pool.is_empty()
                    || self.current_id.is_some() =>
            {
                Err(InvariantViolation::PhaseMismatch {
                    phase: self.phase,
                    reason: "a complete auction has nothing left to draw",
                })
            }
            _ if self.pending_animation && self.current_id.is_none() => {
                Err(InvariantViolation::PhaseMismatch {
                    phase: self.phase,
                    reason: "reveal pending without a current draw",
                })
            }
            _ => Ok(()),
        }
    }
}

/// A state snapshot that breaks the disjoint-union rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("identifier {id} is outside 1..={pool_size}")]
    OutOfRange { id: Identifier, pool_size: u32 },

    #[error("identifier {id} appears more than once")]
    Duplicate { id: Identifier },

    #[error("identifier {id} is missing from every pool and the ledger")]
    Missing { id: Identifier },

    #[error("auction has not started but holds draw data")]
    DataBeforeStart,

    #[error("inconsistent {phase:?} state: {reason}")]
    PhaseMismatch { phase: Phase, reason: &'static str },
}
