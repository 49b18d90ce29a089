//! Error taxonomy shared by every strategy operation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of a failed call.
///
/// - `Input`: rejected before any state change (zero amounts, bad encodings, overflow).
/// - `Authentication`: voucher rejected (signature, replay, chain, recipient).
/// - `State`: the call is not valid against current balances or requests.
/// - `Collaborator`: an external protocol call failed; the whole call aborted.
/// - `Internal`: lock poisoning, broken invariants, persistence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    Authentication,
    State,
    Collaborator,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Input => "input",
            ErrorKind::Authentication => "authentication",
            ErrorKind::State => "state",
            ErrorKind::Collaborator => "collaborator",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}
