//! ACME account management and certificate helpers.
//!
//! This crate builds the caller-facing pieces on top of [`seawall_acme`]: an [`AcmeClient`]
//! bound to a persistent account file, plus the X.509 helpers used when ordering and deploying
//! certificates.

#![deny(unsafe_code)]

pub mod types;

mod account_config;
pub use account_config::{load_account_config, save_account_config, AccountData};

mod client;
pub use client::{AcmeClient, DEFAULT_ACCOUNT_KEY_BITS};

mod certificate_helpers;
pub use certificate_helpers::{
    check_cert_key_match, check_expiry, check_expiry_now, create_self_signed_cert,
};

pub use types::{CertificateInfo, EngineErrorKind, KnownAcmeDirectory, KNOWN_ACME_DIRECTORIES};
