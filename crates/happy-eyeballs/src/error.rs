//! The crate's error taxonomy and the aggregation policy that collapses
//! many per-attempt failures into the single error a caller sees.

use std::io;

use thiserror::Error;

/// A single failure encountered during one connection attempt.
///
/// Distinguishes *where* in the create → bind → connect pipeline the
/// failure happened, which is what lets [`AttemptRecord`] carry several of
/// these (a bind can fail and be retried against the next local candidate
/// before the attempt finally fails or succeeds).
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("tcp open error: {0}")]
    Create(#[source] io::Error),

    #[error("error while attempting to bind on address {addr}: {message}")]
    Bind {
        addr: String,
        message: String,
        code: Option<i32>,
    },

    #[error("no matching local address with family={family:?} found")]
    NoMatchingLocalAddress { family: crate::types::AddressFamily },

    #[error("tcp connect error: {0}")]
    Connect(#[source] io::Error),

    #[error("connection attempt was cancelled")]
    Cancelled,
}

impl AttemptError {
    /// The OS error code carried by this failure, if any. Used by the
    /// aggregator to decide whether a synthesized error can keep a code.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            AttemptError::Create(e) | AttemptError::Connect(e) => e.raw_os_error(),
            AttemptError::Bind { code, .. } => *code,
            AttemptError::NoMatchingLocalAddress { .. } | AttemptError::Cancelled => None,
        }
    }
}

/// All errors recorded for one attempt, in the order they occurred. The
/// last entry is always the one that actually terminated the attempt;
/// earlier entries (if any) are non-fatal bind retries that were superseded.
#[derive(Debug, Default)]
pub struct AttemptRecord {
    pub errors: Vec<AttemptError>,
}

impl AttemptRecord {
    pub fn new() -> Self {
        AttemptRecord { errors: Vec::new() }
    }

    pub fn push(&mut self, err: AttemptError) {
        self.errors.push(err);
    }

    /// The error that should be reported if this attempt is the one whose
    /// failure callers see directly (e.g. in sequential mode).
    pub fn terminal(self) -> Option<AttemptError> {
        self.errors.into_iter().next_back()
    }
}

impl crate::race::FromJoinError for AttemptRecord {
    fn from_join_error(_: tokio::task::JoinError) -> Self {
        AttemptRecord {
            errors: vec![AttemptError::Cancelled],
        }
    }
}

/// The address list was invalid for the operation requested.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrError {
    #[error("address not found in addr_infos")]
    NotFound,
}

/// The error surfaced to the caller of [`crate::connect::start_connection`].
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The request was malformed at the API boundary; no I/O was attempted.
    #[error("{0}")]
    InvalidArgument(String),

    /// Exactly one attempt was made and it failed with this error.
    #[error(transparent)]
    Single(#[from] AttemptError),

    /// More than one attempt failed with distinguishable errors; collapsed
    /// per the `Multiple exceptions: ...` policy.
    #[error("Multiple exceptions: {}", join_errors(.0))]
    Multiple(Vec<AttemptError>),

    /// `all_errors` was requested: every attempt's terminal error, unmerged.
    #[error("connection failed with {} error(s): {}", .0.len(), join_errors(.0))]
    Grouped(Vec<AttemptError>),

    /// No candidates were supplied at all.
    #[error("no addresses to connect to")]
    NoAddresses,
}

impl ConnectError {
    /// The OS error code carried by this error, if every contributing
    /// attempt agreed on one. `Multiple` never carries a code by
    /// construction (see [`aggregate`]); `Grouped` reports its own code only
    /// when it collapses to a single attempt.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            ConnectError::Single(e) => e.os_code(),
            ConnectError::Grouped(errs) if errs.len() == 1 => errs[0].os_code(),
            _ => None,
        }
    }
}

fn join_errors(errors: &[AttemptError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collapse a flattened, ordered list of per-attempt errors into the single
/// error `start_connection` returns, per §4.5:
///
/// 1. `all_errors` wraps everything in [`ConnectError::Grouped`] unchanged.
/// 2. A single error is returned verbatim.
/// 3. Errors that all stringify identically and agree on an OS code
///    collapse to the first one, preserving that code.
/// 4. Otherwise a `Multiple exceptions: ...` error is synthesized, with no
///    OS code (the inputs disagree).
pub fn aggregate(mut errors: Vec<AttemptError>, all_errors: bool) -> ConnectError {
    if errors.is_empty() {
        return ConnectError::NoAddresses;
    }
    if all_errors {
        return ConnectError::Grouped(errors);
    }
    if errors.len() == 1 {
        return ConnectError::Single(errors.pop().expect("len checked above"));
    }

    let model = errors[0].to_string();
    let model_code = errors[0].os_code();
    let homogeneous = errors
        .iter()
        .all(|e| e.to_string() == model && e.os_code() == model_code);
    if homogeneous {
        return ConnectError::Single(errors.remove(0));
    }

    ConnectError::Multiple(errors)
}
