//! Termination classification.
//!
//! Decides what a session does when one of its connections ends. The
//! decision looks at the structured close code first and only then at the
//! error text.

use crate::error::GatewayError;
use crate::protocol::close_code;

/// What a session does after a connection terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The gateway rejected the credential. Push a fatal signal and stop.
    Fatal,
    /// The error text mentions the rejection code without carrying it as a
    /// close code. Log and stop without a fatal signal.
    SuspectedAuthRejection,
    /// Anything else, including a clean close. Open a new connection.
    Reconnect,
}

/// Classify the cause of a connection termination.
///
/// `None` means the stream ended cleanly.
#[must_use]
pub fn classify(cause: Option<&GatewayError>) -> Verdict {
    let Some(err) = cause else {
        return Verdict::Reconnect;
    };

    if err.close_code() == Some(close_code::AUTHENTICATION_REJECTED) {
        return Verdict::Fatal;
    }

    let code = close_code::AUTHENTICATION_REJECTED.to_string();
    if err.to_string().contains(&code) {
        return Verdict::SuspectedAuthRejection;
    }

    Verdict::Reconnect
}
