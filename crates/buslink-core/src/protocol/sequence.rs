//! Session-local request identifier counter.
//!
//! Every request a session sends carries a `request_id` taken from this
//! counter; the matching response echoes it back. Each [`Channel`] owns its
//! own counter, so two sessions in the same process never share or collide
//! on identifiers.
//!
//! [`Channel`]: crate::link::Channel

/// A monotonically increasing counter for request identifiers.
///
/// Identifiers start at 0 and increment by 1 with each call to [`next`].
/// The counter wraps from `u32::MAX` to 0 without panicking; a session would
/// have to issue four billion requests before an identifier repeats.
///
/// # Examples
///
/// ```rust
/// use buslink_core::protocol::RequestIdCounter;
///
/// let mut counter = RequestIdCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// ```
///
/// [`next`]: RequestIdCounter::next
#[derive(Debug, Default)]
pub struct RequestIdCounter {
    next: u32,
}

impl RequestIdCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next identifier and advances the counter.
    pub fn next(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }

    /// Returns the identifier the next call to [`next`](Self::next) will hand out.
    pub fn peek(&self) -> u32 {
        self.next
    }
}
