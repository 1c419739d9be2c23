//! Operation key generation
//!
//! Keys are random, URL-safe strings prefixed with the operation kind, e.g.
//! `provision-3q2-9wE1...`. A key is handed out once and never changes; the
//! ledger only moves the state recorded next to it.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes behind every key
const KEY_BYTES: usize = 16;

/// Kind of asynchronous operation a key identifies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Instance provisioning
    Provision,
    /// Instance deprovisioning
    Deprovision,
    /// Binding creation
    Bind,
}

impl OperationKind {
    /// Prefix written in front of the random part of the key
    pub fn prefix(self) -> &'static str {
        match self {
            OperationKind::Provision => "provision-",
            OperationKind::Deprovision => "deprovision-",
            OperationKind::Bind => "bind-",
        }
    }
}

/// Opaque token identifying one asynchronous operation
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OperationKey(String);

impl OperationKey {
    /// Generate a fresh key for an operation kind
    pub fn generate(kind: OperationKind) -> Self {
        let mut raw = [0u8; KEY_BYTES];
        OsRng.fill_bytes(&mut raw);
        Self(format!("{}{}", kind.prefix(), URL_SAFE_NO_PAD.encode(raw)))
    }

    /// Wrap a key read back from the ledger or supplied by a caller
    pub fn from_string(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Kind encoded in the prefix, if recognizable
    pub fn kind(&self) -> Option<OperationKind> {
        [
            OperationKind::Deprovision,
            OperationKind::Provision,
            OperationKind::Bind,
        ]
        .into_iter()
        .find(|kind| self.0.starts_with(kind.prefix()))
    }
}

impl fmt::Debug for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OperationKey").field(&self.0).finish()
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
