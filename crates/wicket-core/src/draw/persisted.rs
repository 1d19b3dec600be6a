// JSON form of the auction state as it is written to durable storage.
//
// Phase is stored as three flags rather than an enum so that blobs written
// by the browser front-end keep loading.

use serde::{Deserialize, Serialize};

use super::state::{AuctionState, CompletedEntry, Identifier, Phase};

/// The persisted auction blob. Field names are part of the storage format.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedAuction {
    pub auction_started: bool,
    pub is_unsold_phase: bool,
    pub auction_complete: bool,
    pub remaining_numbers: Vec<Identifier>,
    pub unsold_queue: Vec<Identifier>,
    pub completed_numbers: Vec<CompletedEntry>,
    pub current_player_id: Option<Identifier>,
    pub show_drawing_animation: bool,
}

impl PersistedAuction {
    pub fn phase(&self) -> Phase {
        if !self.auction_started {
            Phase::NotStarted
        } else if self.auction_complete {
            Phase::Complete
        } else if self.is_unsold_phase {
            Phase::UnsoldRound
        } else {
            Phase::Main
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl From<&AuctionState> for PersistedAuction {
    fn from(state: &AuctionState) -> Self {
        PersistedAuction {
            auction_started: state.phase != Phase::NotStarted,
            is_unsold_phase: state.phase == Phase::UnsoldRound,
            auction_complete: state.phase == Phase::Complete,
            remaining_numbers: state.main_pool.clone(),
            unsold_queue: state.unsold_pool.clone(),
            completed_numbers: state.completed.clone(),
            current_player_id: state.current_id,
            show_drawing_animation: state.pending_animation,
        }
    }
}

impl From<PersistedAuction> for AuctionState {
    fn from(blob: PersistedAuction) -> Self {
        AuctionState {
            phase: blob.phase(),
            main_pool: blob.remaining_numbers,
            unsold_pool: blob.unsold_queue,
            completed: blob.completed_numbers,
            current_id: blob.current_player_id,
            pending_animation: blob.show_drawing_animation,
        }
    }
}
