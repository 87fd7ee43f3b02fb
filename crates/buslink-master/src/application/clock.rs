//! Virtual time as seen by devices.

/// Source of the machine's virtual time, in nanoseconds.
///
/// `GetTime` requests and timer deadlines are both measured against it.
#[cfg_attr(test, mockall::automock)]
pub trait VirtualClock: Send {
    fn now(&self) -> u64;
}
