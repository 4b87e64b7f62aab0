// Core data models for tracewatch
// Stage vocabulary, per-trace state, and the channel message vocabulary

pub mod stage;
pub mod trace;
pub mod notification;

pub use stage::*;
pub use trace::*;
pub use notification::*;
