// Draw pool operations: shuffle, draw, commit, and outcome bookkeeping.
//
// Selection (`draw_next`) never mutates; the caller commits the chosen
// identifier once it decides to offer it. A committed draw lives only in
// `current_id` until Sold/Unsold resolves it.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use super::state::{AuctionState, CompletedEntry, Identifier, Outcome, Phase};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrawError {
    #[error("operation not valid in {phase:?}")]
    WrongPhase { phase: Phase },

    #[error("identifier {current} is still on offer")]
    DrawInFlight { current: Identifier },

    #[error("identifier {id} is not in the active pool")]
    NotInActivePool { id: Identifier },

    #[error("identifier {id} is neither on offer nor waiting in a pool")]
    NotDrawn { id: Identifier },

    #[error("no unsold cards to re-auction")]
    NoUnsoldEntries,
}

/// A uniformly shuffled permutation of `1..=pool_size`.
pub fn shuffled_identifiers<R: Rng + ?Sized>(pool_size: u32, rng: &mut R) -> Vec<Identifier> {
    let mut ids: Vec<Identifier> = Identifier::full_set(pool_size).collect();
    ids.shuffle(rng);
    ids
}

/// Pick a uniformly random identifier from `pool` without removing it.
pub fn draw_next<R: Rng + ?Sized>(pool: &[Identifier], rng: &mut R) -> Option<Identifier> {
    pool.choose(rng).copied()
}

impl AuctionState {
    /// Fresh main-round state over a shuffled `1..=pool_size`.
    pub fn initialize<R: Rng + ?Sized>(pool_size: u32, rng: &mut R) -> Self {
        info!("Initializing draw pool with {} cards", pool_size);
        AuctionState {
            phase: Phase::Main,
            main_pool: shuffled_identifiers(pool_size, rng),
            ..Default::default()
        }
    }

    /// Move `id` out of the active pool and put it on offer.
    pub fn commit(&mut self, id: Identifier) -> Result<(), DrawError> {
        if let Some(current) = self.current_id {
            return Err(DrawError::DrawInFlight { current });
        }
        let phase = self.phase;
        let pool = self
            .active_pool_mut()
            .ok_or(DrawError::WrongPhase { phase })?;
        let idx = pool
            .iter()
            .position(|&p| p == id)
            .ok_or(DrawError::NotInActivePool { id })?;
        pool.remove(idx);
        self.current_id = Some(id);
        debug!("Committed draw {} ({:?})", id, phase);
        Ok(())
    }

    /// Draw a random identifier from the active pool and commit it.
    /// Returns `Ok(None)` when the active pool is empty.
    pub fn draw_and_commit<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<Option<Identifier>, DrawError> {
        if let Some(current) = self.current_id {
            return Err(DrawError::DrawInFlight { current });
        }
        let picked = draw_next(self.active_pool(), rng);
        match picked {
            Some(id) => {
                self.commit(id)?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Resolve `id` as sold: take it from wherever it waits and append it to
    /// the ledger.
    pub fn record_sold(&mut self, id: Identifier) -> Result<(), DrawError> {
        self.take_undrawn(id)?;
        self.completed.push(CompletedEntry {
            id,
            status: Outcome::Sold,
        });
        Ok(())
    }

    /// Resolve `id` as unsold. In the main round the card is requeued for the
    /// unsold round; in the unsold round the outcome is final.
    pub fn record_unsold(&mut self, id: Identifier) -> Result<(), DrawError> {
        match self.phase {
            Phase::Main => {
                self.take_undrawn(id)?;
                self.unsold_pool.push(id);
            }
            Phase::UnsoldRound => {
                self.take_undrawn(id)?;
                self.completed.push(CompletedEntry {
                    id,
                    status: Outcome::Unsold,
                });
            }
            phase => return Err(DrawError::WrongPhase { phase }),
        }
        Ok(())
    }

    /// Advance the phase once the active pool and the current draw are both
    /// exhausted. Main with requeued cards moves to the unsold round;
    /// anything else completes. Returns the resulting phase.
    pub fn next_phase_or_complete(&mut self) -> Phase {
        let exhausted = self.active_pool().is_empty() && self.current_id.is_none();
        if !exhausted {
            return self.phase;
        }
        let next = match self.phase {
            Phase::Main if !self.unsold_pool.is_empty() => Phase::UnsoldRound,
            Phase::Main | Phase::UnsoldRound => Phase::Complete,
            other => other,
        };
        if next != self.phase {
            info!("Auction phase {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
        next
    }

    /// Put every terminal Unsold card back up for auction as a new, shuffled
    /// main round. Sold entries stay in the ledger.
    pub fn re_auction_unsold<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), DrawError> {
        if self.phase != Phase::Complete {
            return Err(DrawError::WrongPhase { phase: self.phase });
        }
        let mut pool: Vec<Identifier> = self.ledger_ids(Outcome::Unsold).collect();
        if pool.is_empty() {
            return Err(DrawError::NoUnsoldEntries);
        }
        pool.shuffle(rng);
        info!("Re-auctioning {} unsold cards", pool.len());

        self.completed.retain(|e| e.status == Outcome::Sold);
        self.main_pool = pool;
        self.unsold_pool.clear();
        self.current_id = None;
        self.pending_animation = false;
        self.phase = Phase::Main;
        Ok(())
    }

    /// Remove `id` from the current draw or whichever pool holds it.
    fn take_undrawn(&mut self, id: Identifier) -> Result<(), DrawError> {
        if self.current_id == Some(id) {
            self.current_id = None;
            self.pending_animation = false;
            return Ok(());
        }
        for pool in [&mut self.main_pool, &mut self.unsold_pool] {
            if let Some(idx) = pool.iter().position(|&p| p == id) {
                pool.remove(idx);
                return Ok(());
            }
        }
        Err(DrawError::NotDrawn { id })
    }
}
