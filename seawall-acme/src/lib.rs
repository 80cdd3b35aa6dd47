//! ACME protocol implementation.
//!
//! This implements the low level parts of the ACME protocol, providing an [`Account`] and some
//! other helper types which allow interacting with an ACME server by implementing methods which
//! create [`Request`]s the user can then combine with a nonce and send to the the ACME server.
//!
//! On top of that, the [`Client`] drives a complete ACME conversation over a blocking http
//! connection: it owns the account, caches the directory, manages the nonce and transparently
//! retries requests failing with `badNonce` errors.
//!
//! The [`Account`] helper supports RSA and ECC keys and provides most of the API methods.

#![deny(missing_docs)]
#![deny(unsafe_code)]

mod eab;
mod jws;
mod key;
mod request;

pub mod b64u;
pub mod json;

pub mod account;
pub mod authorization;
pub mod directory;
pub mod error;
pub mod order;
pub mod pem;
pub mod types;
pub mod util;

#[doc(inline)]
pub use account::Account;

#[doc(inline)]
pub use authorization::{Authorization, Challenge};

#[doc(inline)]
pub use directory::Directory;

#[doc(inline)]
pub use error::Error;

#[doc(inline)]
pub use order::Order;

#[doc(inline)]
pub use request::Request;

// we don't inline these:
pub use order::NewOrder;
pub use request::ErrorResponse;

/// Header name for nonces.
pub const REPLAY_NONCE: &str = "Replay-Nonce";

/// Header name for locations.
pub const LOCATION: &str = "Location";

pub mod client;
pub use client::Client;
