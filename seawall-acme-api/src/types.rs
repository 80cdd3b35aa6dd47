//! Caller-facing type definitions.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Certificate information.
#[derive(PartialEq, Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CertificateInfo {
    /// Certificate subject name.
    pub subject: String,

    /// List of certificate's SubjectAlternativeName entries.
    pub san: Vec<String>,

    /// Certificate issuer name.
    pub issuer: String,

    /// Certificate's notBefore timestamp (UNIX epoch).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notbefore: Option<i64>,

    /// Certificate's notAfter timestamp (UNIX epoch).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notafter: Option<i64>,

    /// Certificate in PEM format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pem: Option<String>,

    /// Certificate's public key algorithm.
    pub public_key_type: String,

    /// Certificate's public key size if available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_bits: Option<u32>,

    /// The SSL Fingerprint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// An ACME directory endpoint with a name and URL.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
pub struct KnownAcmeDirectory {
    /// The ACME directory's name.
    pub name: Cow<'static, str>,
    /// The ACME directory's endpoint URL.
    pub url: Cow<'static, str>,
}

/// List of known ACME directories.
pub const KNOWN_ACME_DIRECTORIES: &[KnownAcmeDirectory] = &[
    KnownAcmeDirectory {
        name: Cow::Borrowed("Let's Encrypt V2"),
        url: Cow::Borrowed("https://acme-v02.api.letsencrypt.org/directory"),
    },
    KnownAcmeDirectory {
        name: Cow::Borrowed("Let's Encrypt V2 Staging"),
        url: Cow::Borrowed("https://acme-staging-v02.api.letsencrypt.org/directory"),
    },
];

/// The directory used when none is configured.
pub const DEFAULT_ACME_DIRECTORY_ENTRY: &KnownAcmeDirectory = &KNOWN_ACME_DIRECTORIES[1];

/// Failure kinds callers may need to tell apart programmatically.
///
/// These are attached to the `anyhow::Error` chain at the site of the failure; use
/// `err.downcast_ref::<EngineErrorKind>()` to recover them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EngineErrorKind {
    /// A certificate and a private key do not belong together.
    KeyMismatch,

    /// The order carries no certificate URL, it was queried before becoming `valid`.
    NoCertificateYet,

    /// An account key or registration already exists and would have been replaced.
    AlreadyExists,
}

impl std::fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            EngineErrorKind::KeyMismatch => "certificate does not match the private key",
            EngineErrorKind::NoCertificateYet => "order has no certificate yet",
            EngineErrorKind::AlreadyExists => "account already exists",
        })
    }
}

impl std::error::Error for EngineErrorKind {}
