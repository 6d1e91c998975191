//! # Error Kinds
//!
//! PackDB raises errors through `eyre` like the rest of the storage stack,
//! but a few conditions are part of the key-list contract and must stay
//! matchable by callers:
//!
//! - *duplicate key*: insert found an identical key; the list is unchanged
//! - *limits reached*: the range cannot absorb the operation even after a
//!   vacuumize; the B+tree layer reacts by splitting or redistributing
//! - *integrity violated*: a structural invariant is broken; fatal
//! - *internal*: a codec capability was invoked without support; a
//!   programming error
//!
//! These are modeled as an [`ErrorKind`] carried as the root cause of the
//! `eyre::Report`, so dispatch is a `downcast_ref` away:
//!
//! ```
//! use packdb::error::{kind_of, ErrorKind};
//!
//! let err = eyre::Report::new(ErrorKind::LimitsReached);
//! assert_eq!(kind_of(&err), Some(ErrorKind::LimitsReached));
//! ```
//!
//! Conditions that are not errors (e.g. a key that is simply absent) are
//! expressed as ordinary return values, never through this type.

use std::fmt;

/// The matchable error conditions of the key list and freelist cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The key being inserted is already present.
    DuplicateKey,
    /// The operation does not fit the range, even after defragmentation.
    LimitsReached,
    /// A structural invariant does not hold.
    IntegrityViolated,
    /// A codec operation was dispatched without the matching capability.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorKind::DuplicateKey => "duplicate key",
            ErrorKind::LimitsReached => "limits reached",
            ErrorKind::IntegrityViolated => "integrity violated",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ErrorKind {}

/// Extracts the [`ErrorKind`] from a report, if one is in its chain.
pub fn kind_of(report: &eyre::Report) -> Option<ErrorKind> {
    report.downcast_ref::<ErrorKind>().copied()
}

/// An *integrity violated* report carrying the broken-invariant detail.
pub(crate) fn integrity_error(msg: String) -> eyre::Report {
    use eyre::WrapErr;
    Err::<(), _>(ErrorKind::IntegrityViolated)
        .wrap_err(msg)
        .unwrap_err()
}
