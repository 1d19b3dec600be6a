// Auction phase controller.
//
// Owns the single `AuctionState`, applies operator actions to it, and
// checkpoints the whole state to the store after every mutation. Each
// transition that puts a new card on offer yields a `RevealPlan`; the caller
// plays it and reports back through `finish_reveal`.

use std::ops::RangeInclusive;

use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, warn};
use wicket_core::config::Config;
use wicket_core::draw::{AuctionState, Identifier, Phase};
use wicket_core::store::StateStore;

use crate::animation::{plan_reveal, RevealPlan};
use crate::protocol::DrawSnapshot;

/// Static parameters of an auction run.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub pool_size: u32,
    /// Fixed RNG seed; `None` seeds from OS entropy.
    pub seed: Option<u64>,
    pub reveal_ticks: RangeInclusive<usize>,
    pub asset_extension: String,
}

impl ControllerOptions {
    pub fn from_config(config: &Config) -> Self {
        ControllerOptions {
            pool_size: config.auction.pool_size,
            seed: config.auction.seed,
            reveal_ticks: config.animation.min_ticks..=config.animation.max_ticks,
            asset_extension: config.roster.asset_extension.clone(),
        }
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        ControllerOptions {
            pool_size: 95,
            seed: None,
            reveal_ticks: 12..=25,
            asset_extension: "png".into(),
        }
    }
}

pub struct AuctionController {
    state: AuctionState,
    store: Box<dyn StateStore>,
    rng: ChaCha8Rng,
    options: ControllerOptions,
    persist_error: Option<String>,
}

impl AuctionController {
    /// A controller in `NotStarted`. Call [`resume`](Self::resume) to pick up
    /// a saved auction.
    pub fn new(store: Box<dyn StateStore>, options: ControllerOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        AuctionController {
            state: AuctionState::default(),
            store,
            rng,
            options,
            persist_error: None,
        }
    }

    pub fn state(&self) -> &AuctionState {
        &self.state
    }

    /// A reveal has been requested and not yet reported finished.
    pub fn is_revealing(&self) -> bool {
        self.state.pending_animation
    }

    pub fn can_re_auction_unsold(&self) -> bool {
        self.state.is_complete() && self.state.has_unsold_entries()
    }

    /// Load the saved auction. Missing, unreadable, or inconsistent state
    /// leaves the controller in `NotStarted`. Returns a reveal to replay when
    /// the saved state had one in flight.
    pub fn resume(&mut self) -> Option<RevealPlan> {
        let loaded = match self.store.load() {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Failed to read saved auction, starting fresh: {:#}", e);
                None
            }
        };

        let Some(state) = loaded else {
            info!("No saved auction, starting fresh");
            self.state = AuctionState::default();
            return None;
        };

        if let Err(violation) = state.check_invariants(self.options.pool_size) {
            warn!("Discarding inconsistent saved auction: {}", violation);
            if let Err(e) = self.store.clear() {
                warn!("Failed to clear inconsistent auction state: {:#}", e);
            }
            self.state = AuctionState::default();
            return None;
        }

        let saved_at = match self.store.saved_at() {
            Ok(Some(at)) => at.to_rfc3339(),
            Ok(None) => "unknown time".to_string(),
            Err(e) => {
                debug!("Saved-at lookup failed: {:#}", e);
                "unknown time".to_string()
            }
        };
        info!(
            "Resumed auction saved at {} in {:?}: {} sold, {} unsold, {} left in phase",
            saved_at,
            state.phase,
            state.sold_count(),
            state.unsold_count(),
            state.remaining_in_phase()
        );
        self.state = state;

        match (self.state.current_id, self.state.pending_animation) {
            (Some(target), true) => {
                info!("Replaying interrupted reveal of {}", target);
                Some(self.plan(target))
            }
            (None, _) if matches!(self.state.phase, Phase::Main | Phase::UnsoldRound) => {
                let reveal = self.advance();
                self.checkpoint();
                reveal
            }
            _ => None,
        }
    }

    /// NotStarted → Main: shuffle the full pool and put the first card on
    /// offer. Ignored once the auction has started.
    pub fn start(&mut self) -> Option<RevealPlan> {
        if self.state.is_started() {
            debug!("Start ignored: auction already in {:?}", self.state.phase);
            return None;
        }
        info!("Starting auction with {} cards", self.options.pool_size);
        self.state = AuctionState::initialize(self.options.pool_size, &mut self.rng);
        let reveal = self.advance();
        self.checkpoint();
        reveal
    }

    /// Mark the card on offer as sold and move on.
    pub fn sold(&mut self) -> Option<RevealPlan> {
        let id = self.resolvable()?;
        if let Err(e) = self.state.record_sold(id) {
            warn!("Sold {} rejected: {}", id, e);
            return None;
        }
        info!("Card {} sold", id);
        let reveal = self.advance();
        self.checkpoint();
        reveal
    }

    /// Mark the card on offer as unsold and move on. In the main round the
    /// card is requeued for the unsold round.
    pub fn unsold(&mut self) -> Option<RevealPlan> {
        let id = self.resolvable()?;
        let phase = self.state.phase;
        if let Err(e) = self.state.record_unsold(id) {
            warn!("Unsold {} rejected: {}", id, e);
            return None;
        }
        match phase {
            Phase::Main => info!("Card {} unsold, requeued", id),
            _ => info!("Card {} unsold", id),
        }
        let reveal = self.advance();
        self.checkpoint();
        reveal
    }

    /// Record that the reveal of `target` has finished playing. Returns
    /// `false` if no such reveal was pending.
    pub fn finish_reveal(&mut self, target: Identifier) -> bool {
        if !self.state.pending_animation || self.state.current_id != Some(target) {
            debug!("Stale reveal completion for {} ignored", target);
            return false;
        }
        self.state.pending_animation = false;
        self.checkpoint();
        true
    }

    /// Complete → Main over the cards that finished unsold.
    pub fn re_auction_unsold(&mut self) -> Option<RevealPlan> {
        if !self.can_re_auction_unsold() {
            debug!(
                "Re-auction ignored in {:?} with {} unsold",
                self.state.phase,
                self.state.unsold_count()
            );
            return None;
        }
        if let Err(e) = self.state.re_auction_unsold(&mut self.rng) {
            warn!("Re-auction rejected: {}", e);
            return None;
        }
        let reveal = self.advance();
        self.checkpoint();
        reveal
    }

    /// Forget the auction entirely: clear storage and return to NotStarted.
    pub fn reset(&mut self) -> Result<()> {
        self.store
            .clear()
            .context("failed to clear saved auction state")?;
        self.state = AuctionState::default();
        self.persist_error = None;
        info!("Auction reset");
        Ok(())
    }

    pub fn snapshot(&self) -> DrawSnapshot {
        let state = &self.state;
        DrawSnapshot {
            phase: state.phase,
            current_id: state.current_id,
            current_asset: state
                .current_id
                .map(|id| id.asset_name(&self.options.asset_extension)),
            revealing: state.pending_animation,
            main_remaining: state.main_pool.len(),
            unsold_queued: state.unsold_pool.len(),
            sold: state.sold_count(),
            unsold: state.unsold_count(),
            can_re_auction: self.can_re_auction_unsold(),
            persist_error: self.persist_error.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// The card Sold/Unsold would apply to, if those actions are enabled.
    fn resolvable(&self) -> Option<Identifier> {
        match self.state.current_id {
            Some(_) if self.state.pending_animation => {
                debug!("Outcome ignored: reveal still running");
                None
            }
            Some(id) => Some(id),
            None => {
                debug!("Outcome ignored: no card on offer");
                None
            }
        }
    }

    /// Put the next card on offer, changing phase as pools run dry. Returns
    /// the reveal for the new card, or `None` once the auction is complete.
    fn advance(&mut self) -> Option<RevealPlan> {
        loop {
            match self.state.draw_and_commit(&mut self.rng) {
                Ok(Some(id)) => {
                    self.state.pending_animation = true;
                    return Some(self.plan(id));
                }
                Ok(None) => {
                    let before = self.state.phase;
                    if self.state.next_phase_or_complete() == before {
                        return None;
                    }
                }
                Err(e) => {
                    warn!("Could not draw next card: {}", e);
                    return None;
                }
            }
        }
    }

    fn plan(&mut self, target: Identifier) -> RevealPlan {
        plan_reveal(
            self.state.active_pool(),
            target,
            self.options.reveal_ticks.clone(),
            &mut self.rng,
        )
    }

    /// Write the whole state to the store. Failures are logged and surfaced
    /// in the snapshot; the in-memory state stays authoritative and the next
    /// checkpoint rewrites everything.
    fn checkpoint(&mut self) {
        match self.store.save(&self.state) {
            Ok(()) => self.persist_error = None,
            Err(e) => {
                error!("Failed to persist auction state: {:#}", e);
                self.persist_error = Some(format!("{e:#}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use wicket_core::draw::{CompletedEntry, Outcome};
    use wicket_core::store::MemoryStore;

    /// Store handle the test keeps after handing a clone to the controller.
    #[derive(Clone, Default)]
    struct SharedStore(Arc<MemoryStore>);

    impl StateStore for SharedStore {
        fn load_blob(&self) -> Result<Option<String>> {
            self.0.load_blob()
        }
        fn save_blob(&self, json: &str) -> Result<()> {
            self.0.save_blob(json)
        }
        fn clear(&self) -> Result<()> {
            self.0.clear()
        }
    }

    /// A store whose writes always fail.
    struct BrokenStore;

    impl StateStore for BrokenStore {
        fn load_blob(&self) -> Result<Option<String>> {
            Ok(None)
        }
        fn save_blob(&self, _json: &str) -> Result<()> {
            anyhow::bail!("disk full")
        }
        fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    fn options(pool_size: u32) -> ControllerOptions {
        ControllerOptions {
            pool_size,
            seed: Some(17),
            reveal_ticks: 2..=4,
            asset_extension: "png".into(),
        }
    }

    fn controller(pool_size: u32) -> (AuctionController, SharedStore) {
        let store = SharedStore::default();
        let ctl = AuctionController::new(Box::new(store.clone()), options(pool_size));
        (ctl, store)
    }

    fn id(n: u32) -> Identifier {
        Identifier::new(n).unwrap()
    }

    /// Finish whatever reveal is pending, as the event loop would.
    fn settle(ctl: &mut AuctionController, reveal: Option<RevealPlan>) -> Option<Identifier> {
        let plan = reveal?;
        assert!(ctl.finish_reveal(plan.target));
        Some(plan.target)
    }

    #[test]
    fn start_draws_first_card_and_persists() {
        let (mut ctl, store) = controller(5);
        let plan = ctl.start().expect("first reveal");
        assert_eq!(ctl.state().phase, Phase::Main);
        assert_eq!(ctl.state().current_id, Some(plan.target));
        assert!(ctl.is_revealing());
        assert_eq!(plan.frames.last(), Some(&plan.target));
        assert!(!ctl.state().main_pool.contains(&plan.target));

        let saved = store.load().unwrap().unwrap();
        assert_eq!(&saved, ctl.state());
        assert!(saved.pending_animation);
    }

    #[test]
    fn start_twice_is_ignored() {
        let (mut ctl, _) = controller(5);
        ctl.start();
        let before = ctl.state().clone();
        assert!(ctl.start().is_none());
        assert_eq!(ctl.state(), &before);
    }

    #[test]
    fn outcomes_are_ignored_during_reveal() {
        let (mut ctl, _) = controller(5);
        ctl.start();
        let before = ctl.state().clone();
        assert!(ctl.sold().is_none());
        assert!(ctl.unsold().is_none());
        assert_eq!(ctl.state(), &before);
    }

    #[test]
    fn outcomes_are_ignored_before_start() {
        let (mut ctl, store) = controller(5);
        assert!(ctl.sold().is_none());
        assert!(ctl.unsold().is_none());
        assert_eq!(ctl.state(), &AuctionState::default());
        assert!(store.load_blob().unwrap().is_none());
    }

    #[test]
    fn finish_reveal_rejects_wrong_target() {
        let (mut ctl, _) = controller(5);
        let plan = ctl.start().unwrap();
        let other = Identifier::full_set(5).find(|&i| i != plan.target).unwrap();
        assert!(!ctl.finish_reveal(other));
        assert!(ctl.is_revealing());
        assert!(ctl.finish_reveal(plan.target));
        assert!(!ctl.finish_reveal(plan.target));
    }

    #[test]
    fn sold_records_and_draws_next() {
        let (mut ctl, store) = controller(5);
        let reveal = ctl.start();
        let first = settle(&mut ctl, reveal).unwrap();
        let next = ctl.sold().expect("second reveal");
        assert_ne!(next.target, first);
        assert_eq!(
            ctl.state().completed,
            vec![CompletedEntry { id: first, status: Outcome::Sold }]
        );
        assert!(ctl.state().check_invariants(5).is_ok());
        assert_eq!(&store.load().unwrap().unwrap(), ctl.state());
    }

    #[test]
    fn full_run_through_unsold_round_to_complete() {
        let (mut ctl, _) = controller(5);
        let mut reveal = ctl.start();
        let mut main_unsold = Vec::new();

        // Main round: alternate sold / unsold.
        for i in 0..5 {
            let id = settle(&mut ctl, reveal).unwrap();
            assert_eq!(ctl.state().phase, Phase::Main);
            reveal = if i % 2 == 0 {
                ctl.sold()
            } else {
                main_unsold.push(id);
                ctl.unsold()
            };
            assert!(ctl.state().check_invariants(5).is_ok());
        }

        // Two cards were requeued; the unsold round re-offers them.
        assert_eq!(ctl.state().phase, Phase::UnsoldRound);
        let mut reoffered = Vec::new();
        for _ in 0..2 {
            let id = settle(&mut ctl, reveal).unwrap();
            assert_eq!(ctl.state().phase, Phase::UnsoldRound);
            reoffered.push(id);
            reveal = ctl.unsold();
            assert!(ctl.state().check_invariants(5).is_ok());
        }
        assert!(reveal.is_none());
        assert_eq!(ctl.state().phase, Phase::Complete);

        let a: HashSet<_> = main_unsold.into_iter().collect();
        let b: HashSet<_> = reoffered.into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(ctl.state().sold_count(), 3);
        assert_eq!(ctl.state().unsold_count(), 2);
        assert!(ctl.can_re_auction_unsold());
    }

    #[test]
    fn all_sold_completes_without_re_auction() {
        let (mut ctl, _) = controller(3);
        let mut reveal = ctl.start();
        while let Some(_) = settle(&mut ctl, reveal) {
            reveal = ctl.sold();
        }
        assert_eq!(ctl.state().phase, Phase::Complete);
        assert!(!ctl.can_re_auction_unsold());
        assert!(ctl.re_auction_unsold().is_none());
    }

    #[test]
    fn re_auction_unsold_restarts_main_round() {
        let (mut ctl, _) = controller(3);
        let mut reveal = ctl.start();
        // Everything unsold in both rounds.
        while let Some(_) = settle(&mut ctl, reveal) {
            reveal = ctl.unsold();
        }
        assert_eq!(ctl.state().phase, Phase::Complete);
        assert_eq!(ctl.state().unsold_count(), 3);

        let plan = ctl.re_auction_unsold().expect("re-auction reveal");
        assert_eq!(ctl.state().phase, Phase::Main);
        assert!(ctl.state().completed.is_empty());
        assert_eq!(ctl.state().main_pool.len(), 2);
        assert_eq!(ctl.state().current_id, Some(plan.target));
        assert!(ctl.state().check_invariants(3).is_ok());
    }

    #[test]
    fn re_auction_keeps_sold_entries() {
        let store = SharedStore::default();
        let finished = AuctionState {
            phase: Phase::Complete,
            completed: vec![
                CompletedEntry { id: id(1), status: Outcome::Sold },
                CompletedEntry { id: id(2), status: Outcome::Unsold },
            ],
            ..Default::default()
        };
        store.save(&finished).unwrap();
        let mut ctl = AuctionController::new(Box::new(store.clone()), options(2));
        assert!(ctl.resume().is_none());

        let plan = ctl.re_auction_unsold().unwrap();
        assert_eq!(plan.target, id(2));
        assert_eq!(
            ctl.state().completed,
            vec![CompletedEntry { id: id(1), status: Outcome::Sold }]
        );
    }

    #[test]
    fn resume_replays_interrupted_reveal() {
        let (mut ctl, store) = controller(5);
        let plan = ctl.start().unwrap();

        // Restart before the reveal finished.
        let mut restarted = AuctionController::new(Box::new(store.clone()), options(5));
        let replay = restarted.resume().expect("reveal replay");
        assert_eq!(replay.target, plan.target);
        assert_eq!(restarted.state().current_id, Some(plan.target));
        assert!(restarted.is_revealing());
        assert_eq!(restarted.state(), ctl.state());
    }

    #[test]
    fn resume_after_settled_reveal_has_nothing_to_replay() {
        let (mut ctl, store) = controller(5);
        let reveal = ctl.start();
        let target = settle(&mut ctl, reveal).unwrap();

        let mut restarted = AuctionController::new(Box::new(store.clone()), options(5));
        assert!(restarted.resume().is_none());
        assert_eq!(restarted.state().current_id, Some(target));
        assert!(restarted.snapshot().can_resolve());
    }

    #[test]
    fn resume_with_corrupt_blob_starts_fresh() {
        let store = SharedStore::default();
        store.save_blob("][").unwrap();
        let mut ctl = AuctionController::new(Box::new(store), options(5));
        assert!(ctl.resume().is_none());
        assert_eq!(ctl.state().phase, Phase::NotStarted);
    }

    #[test]
    fn resume_with_inconsistent_state_starts_fresh() {
        let store = SharedStore::default();
        store
            .save_blob(r#"{"auctionStarted": true, "remainingNumbers": [1, 1, 2]}"#)
            .unwrap();
        let mut ctl = AuctionController::new(Box::new(store.clone()), options(3));
        assert!(ctl.resume().is_none());
        assert_eq!(ctl.state().phase, Phase::NotStarted);
        assert!(store.load_blob().unwrap().is_none());
    }

    #[test]
    fn resume_without_current_draw_puts_next_card_on_offer() {
        let store = SharedStore::default();
        store
            .save_blob(
                r#"{"auctionStarted": true, "remainingNumbers": [2],
                    "completedNumbers": [{"id": 1, "status": "sold"}]}"#,
            )
            .unwrap();
        let mut ctl = AuctionController::new(Box::new(store), options(2));
        let plan = ctl.resume().expect("next card");
        assert_eq!(plan.target, id(2));
        assert_eq!(ctl.state().current_id, Some(id(2)));
    }

    #[test]
    fn reset_clears_storage() {
        let (mut ctl, store) = controller(5);
        ctl.start();
        ctl.reset().unwrap();
        assert_eq!(ctl.state(), &AuctionState::default());
        assert!(store.load_blob().unwrap().is_none());
        assert!(ctl.start().is_some());
    }

    #[test]
    fn persistence_failure_is_reported_not_fatal() {
        let mut ctl = AuctionController::new(Box::new(BrokenStore), options(3));
        let plan = ctl.start().expect("state still advances");
        let snap = ctl.snapshot();
        assert_eq!(snap.current_id, Some(plan.target));
        assert!(snap.persist_error.as_deref().unwrap().contains("disk full"));
    }

    #[test]
    fn snapshot_reflects_state() {
        let (mut ctl, _) = controller(4);
        let plan = ctl.start().unwrap();
        let snap = ctl.snapshot();
        assert_eq!(snap.phase, Phase::Main);
        assert_eq!(snap.current_asset, Some(format!("{}.png", plan.target)));
        assert!(snap.revealing);
        assert_eq!(snap.main_remaining, 3);
        assert_eq!(snap.unsold_queued, 0);
        assert!(!snap.can_re_auction);
    }

    #[test]
    fn seeded_controllers_draw_identically() {
        let (mut a, _) = controller(20);
        let (mut b, _) = controller(20);
        assert_eq!(a.start(), b.start());
        assert_eq!(a.state(), b.state());
    }
}
