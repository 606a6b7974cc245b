//! The five protocol operations and the fixed verb/credential pair of each.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::http::{CredentialsMode, HttpMethod};

/// An abstract protocol operation.
///
/// The HTTP method and credential mode of an operation are fixed; callers
/// pick the operation, never the verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Anonymous availability check.
    Probe,
    /// Anonymous registration of a new user.
    Register,
    /// Credentialed upload of data.
    Submit,
    /// Credentialed read of the caller's data.
    Query,
    /// Credentialed deletion of the caller's data.
    Purge,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Probe,
        Operation::Register,
        Operation::Submit,
        Operation::Query,
        Operation::Purge,
    ];

    pub fn method(&self) -> HttpMethod {
        match self {
            Operation::Probe | Operation::Query => HttpMethod::Get,
            Operation::Register => HttpMethod::Post,
            Operation::Submit => HttpMethod::Put,
            Operation::Purge => HttpMethod::Delete,
        }
    }

    pub fn credentials(&self) -> CredentialsMode {
        match self {
            Operation::Probe | Operation::Register => CredentialsMode::Omit,
            Operation::Submit | Operation::Query | Operation::Purge => CredentialsMode::Include,
        }
    }

    /// GET operations never carry a body.
    pub fn accepts_body(&self) -> bool {
        self.method() != HttpMethod::Get
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Probe => "probe",
            Operation::Register => "register",
            Operation::Submit => "submit",
            Operation::Query => "query",
            Operation::Purge => "purge",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
