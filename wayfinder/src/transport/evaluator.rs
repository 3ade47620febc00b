//! Server status evaluators
//!
//! An evaluator decides, per request kind and HTTP status, whether a response
//! is the final answer, a reason to try the next server, or a definitive
//! failure. The retry loop never looks at status codes itself.

use super::RequestKind;

/// Classification of a server response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusVerdict {
    /// Return this response to the caller
    Accept,
    /// Try the next candidate endpoint
    Retry,
    /// Stop and surface the response as a client error
    Fatal,
}

/// Pluggable status policy for the retry loop
pub trait ServerStatusEvaluator: Send + Sync {
    fn evaluate(&self, kind: RequestKind, status: u16) -> StatusVerdict;

    fn name(&self) -> &'static str;
}

/// Policy matching the behavior of long-standing discovery servers
///
/// Besides 2xx and 302, a few statuses are final answers for specific
/// operations: an unknown lease on heartbeat or a server refusing deltas.
/// Cancel is best effort and takes whatever the first server answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyEvaluator;

impl ServerStatusEvaluator for LegacyEvaluator {
    fn evaluate(&self, kind: RequestKind, status: u16) -> StatusVerdict {
        if (200..300).contains(&status) || status == 302 {
            return StatusVerdict::Accept;
        }
        let accepted = match kind {
            RequestKind::Register | RequestKind::Renew => status == 404,
            RequestKind::Cancel => true,
            RequestKind::GetDelta => status == 403 || status == 404,
            _ => false,
        };
        if accepted {
            StatusVerdict::Accept
        } else if (400..500).contains(&status) {
            StatusVerdict::Fatal
        } else {
            StatusVerdict::Retry
        }
    }

    fn name(&self) -> &'static str {
        "legacy"
    }
}

/// Plain HTTP policy: 2xx/3xx accept, 4xx fatal, everything else retry
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpSuccessEvaluator;

impl ServerStatusEvaluator for HttpSuccessEvaluator {
    fn evaluate(&self, _kind: RequestKind, status: u16) -> StatusVerdict {
        match status {
            200..=399 => StatusVerdict::Accept,
            400..=499 => StatusVerdict::Fatal,
            _ => StatusVerdict::Retry,
        }
    }

    fn name(&self) -> &'static str {
        "http_success"
    }
}
