//! Session change notifications.

/// Buffer size for the session event channel.
/// Lagging subscribers lose the oldest events rather than blocking the session.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Authentication-state changes published by [`Session`](super::Session).
///
/// Subscribers get these over a `tokio::sync::broadcast` channel via
/// [`Session::subscribe`](super::Session::subscribe); UI shells typically
/// re-render on receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login or signup completed and tokens are held.
    SignedIn,
    /// The session was cleared, locally or through logout.
    SignedOut,
    /// A refresh rotated the token pair.
    TokensRefreshed,
    /// The cached profile or user changed.
    ProfileChanged,
}
