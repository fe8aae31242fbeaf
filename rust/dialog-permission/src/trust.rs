use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Opaque identity of a party that signed permission-type code, such as a
/// certificate fingerprint or a DID.
///
/// Verifying that identity is left to the caller's trust infrastructure;
/// this crate only compares identities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signer(String);

impl Signer {
    /// Create a signer identity.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// The identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Signer {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for Signer {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for Signer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides whether the signers a deferred permission names are trusted for
/// the permission type it will be bound to.
pub trait TrustVerifier: Send + Sync {
    /// Whether `signers` are acceptable for `type_name`.
    fn verify(&self, type_name: &str, signers: &[Signer]) -> bool;
}

impl<F> TrustVerifier for F
where
    F: Fn(&str, &[Signer]) -> bool + Send + Sync,
{
    fn verify(&self, type_name: &str, signers: &[Signer]) -> bool {
        self(type_name, signers)
    }
}

/// Verifier that trusts every signer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl TrustVerifier for AcceptAll {
    fn verify(&self, _type_name: &str, _signers: &[Signer]) -> bool {
        true
    }
}

/// Records which signers vouch for each permission type.
///
/// Verification passes when every signer a deferred permission requires is
/// among those recorded for its type.
#[derive(Debug, Default)]
pub struct TrustedSigners {
    vouchers: DashMap<String, BTreeSet<Signer>>,
}

impl TrustedSigners {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `signer` vouches for `type_name`.
    pub fn vouch(&self, type_name: impl Into<String>, signer: impl Into<Signer>) {
        self.vouchers
            .entry(type_name.into())
            .or_default()
            .insert(signer.into());
    }

    /// Signers recorded for `type_name`.
    pub fn signers_of(&self, type_name: &str) -> BTreeSet<Signer> {
        self.vouchers
            .get(type_name)
            .map(|signers| signers.clone())
            .unwrap_or_default()
    }
}

impl TrustVerifier for TrustedSigners {
    fn verify(&self, type_name: &str, signers: &[Signer]) -> bool {
        match self.vouchers.get(type_name) {
            Some(vouchers) => signers.iter().all(|signer| vouchers.contains(signer)),
            None => signers.is_empty(),
        }
    }
}
