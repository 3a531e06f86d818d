/// Side effects requested by [`crate::update`]; executed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Open the upstream stream for a fresh run.
    OpenStream,
    /// Stop reading the active stream and release its connection.
    CancelStream,
}
