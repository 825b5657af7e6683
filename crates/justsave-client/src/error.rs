/// Failures seen by the client. Cloneable so a failure can travel through
/// the session's event channel and into the view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Rejected before anything was sent (e.g. an empty room id)
    #[error("invalid input: {0}")]
    Validation(String),

    /// The room store was unreachable or answered with a failure
    #[error("room store failure: {0}")]
    Gateway(String),

    /// The hub connection could not be opened or was lost
    #[error("hub transport failure: {0}")]
    Transport(String),
}
