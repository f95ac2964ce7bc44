//! Progress reporting and cooperative cancellation.

/// A sink for user-visible progress messages that doubles as cancellation monitor.
///
/// Negotiation polls [`is_cancelled()`](ProgressSink::is_cancelled) after every
/// have batch and every acknowledgement it reads.
pub trait ProgressSink {
    /// Emit a user-visible progress message.
    fn report(&mut self, message: &str);

    /// Return `true` if the operation should stop as soon as possible.
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<P: ProgressSink + ?Sized> ProgressSink for &mut P {
    fn report(&mut self, message: &str) {
        (**self).report(message);
    }

    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

/// Drops all messages and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl ProgressSink for Discard {
    fn report(&mut self, _message: &str) {}
}

/// Forwards messages to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct Log;

impl ProgressSink for Log {
    fn report(&mut self, message: &str) {
        tracing::info!(target: "gix_fetch_pack::remote", "{message}");
    }
}
