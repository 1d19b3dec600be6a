// Library root: the auction draw engine (identifiers, pools, persisted
// state), team budget projection, persistence and configuration.

pub mod config;
pub mod db;
pub mod draw;
pub mod stats;
pub mod store;
