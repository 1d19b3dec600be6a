// Library root: the draw controller, reveal sequencer, roster source and the
// event loop that ties them to an operator front-end.

pub mod animation;
pub mod app;
pub mod controller;
pub mod protocol;
pub mod roster;
