//! Effects produced by state transitions

/// Side effects the engine runs after committing a new state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Hand the new snapshot to the persistence writer
    PersistState,

    /// Publish the new snapshot to subscribers
    NotifySubscribers,
}
