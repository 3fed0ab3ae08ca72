// Synchronization machinery: optimistic writes and live polling.

pub mod coordinator;
pub mod scheduler;

pub use coordinator::{Begin, MutationCoordinator, Settled, Target, TargetKey, TargetValue};
pub use scheduler::{LiveSync, TickDecision};
