//! Cancellation support for negotiations driven from another thread.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::progress::ProgressSink;

/// A thread-safe cancellation flag that can be shared across threads.
///
/// The flag starts in a non-cancelled state. Once cancelled it stays cancelled.
#[derive(Debug, Default)]
pub struct CancellationFlag(AtomicBool);

impl CancellationFlag {
    /// Create a new cancellation flag in the non-cancelled state.
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Pair this flag with `progress` so the negotiation observes it.
    pub fn watch<P: ProgressSink>(&self, progress: P) -> Interruptible<'_, P> {
        Interruptible { flag: self, progress }
    }
}

/// Trait for types that can check for cancellation and return an error if cancelled.
///
/// Implemented for every [`ProgressSink`].
pub trait CancellationPoint {
    /// Check for cancellation and return [`Error::Cancelled`](crate::Error::Cancelled) if cancelled.
    fn check(&self) -> Result<(), crate::Error>;
}

/// A bare flag reports nothing but can be used wherever a progress sink is expected.
impl ProgressSink for CancellationFlag {
    fn report(&mut self, _message: &str) {}

    fn is_cancelled(&self) -> bool {
        CancellationFlag::is_cancelled(self)
    }
}

impl<P: ProgressSink + ?Sized> CancellationPoint for P {
    fn check(&self) -> Result<(), crate::Error> {
        if self.is_cancelled() {
            Err(crate::Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A progress sink that is also cancelled when its [`CancellationFlag`] is.
pub struct Interruptible<'a, P> {
    flag: &'a CancellationFlag,
    progress: P,
}

impl<P: ProgressSink> ProgressSink for Interruptible<'_, P> {
    fn report(&mut self, message: &str) {
        self.progress.report(message);
    }

    fn is_cancelled(&self) -> bool {
        self.flag.is_cancelled() || self.progress.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Discard;

    #[test]
    fn cancellation_flag_starts_not_cancelled() {
        let flag = CancellationFlag::new();
        assert!(!flag.is_cancelled());
        assert!(flag.check().is_ok());
    }

    #[test]
    fn cancellation_point_check_fails_when_cancelled() {
        let flag = CancellationFlag::default();
        flag.cancel();
        assert!(matches!(flag.check(), Err(crate::Error::Cancelled)));
    }

    #[test]
    fn watched_progress_observes_the_flag() {
        let flag = CancellationFlag::new();
        let progress = flag.watch(Discard);
        assert!(progress.check().is_ok());
        flag.cancel();
        assert!(progress.is_cancelled());
        assert!(progress.check().unwrap_err().is_cancelled());
    }
}
