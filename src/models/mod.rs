pub mod overlay;
pub mod plan;

pub use overlay::{CompletionRecord, ResolvedWorkout, SlotKey};
pub use plan::Plan;
