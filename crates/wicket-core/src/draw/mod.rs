// Auction draw engine: state model, pool operations and the persisted form.

pub mod persisted;
pub mod pool;
pub mod state;

pub use pool::{draw_next, shuffled_identifiers, DrawError};
pub use state::{AuctionState, CompletedEntry, Identifier, InvariantViolation, Outcome, Phase};
