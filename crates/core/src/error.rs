#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The SCA service reported an event subtype this engine does not know.
    /// Callers log and skip the event rather than aborting the run.
    #[error("Unrecognized event type: {0}")]
    UnknownEventType(String),

    /// A subscriber trigger string did not name a known category.
    #[error("Unrecognized category trigger: {0}")]
    UnknownTrigger(String),
}
