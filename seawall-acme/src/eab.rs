//! External account binding (RFC 8555 § 7.3.4).
//!
//! Some CAs only register accounts tied to a pre-existing customer account. The binding is a
//! second JWS embedded in the `newAccount` payload: the new account's public JWK, signed with a
//! MAC key the CA handed out alongside a key identifier.

use openssl::hash::MessageDigest;
use openssl::pkey::{HasPrivate, PKeyRef};
use openssl::sign::Signer;
use serde::Serialize;

use crate::key::Jwk;
use crate::types::ExternalAccountBinding;
use crate::{b64u, Error};

#[derive(Serialize)]
struct EabHeader<'a> {
    alg: &'static str,
    kid: &'a str,
    url: &'a str,
}

impl ExternalAccountBinding {
    /// Bind `jwk` to the CA-provided key identifier by signing it with the shared MAC key.
    ///
    /// The `url` must be the exact `newAccount` URL the registration request is sent to, since
    /// the binding's protected header has to repeat it.
    pub fn new<P>(
        eab_kid: &str,
        eab_hmac_key: &PKeyRef<P>,
        jwk: Jwk,
        url: String,
    ) -> Result<Self, Error>
    where
        P: HasPrivate,
    {
        let header = EabHeader {
            alg: "HS256",
            kid: eab_kid,
            url: &url,
        };

        let protected = b64u::encode(serde_json::to_string(&header)?.as_bytes());
        let payload = b64u::encode(serde_json::to_string(&jwk)?.as_bytes());
        let signing_input = format!("{protected}.{payload}");

        let mut signer = Signer::new(MessageDigest::sha256(), eab_hmac_key)
            .map_err(|err| Error::Ssl("failed to create hmac signer", err))?;
        let signature = signer
            .sign_oneshot_to_vec(signing_input.as_bytes())
            .map_err(|err| Error::Ssl("failed to sign external account binding", err))?;

        Ok(ExternalAccountBinding {
            protected,
            payload,
            signature: b64u::encode(&signature),
        })
    }
}

#[cfg(test)]
mod test {
    use std::convert::TryFrom;

    use openssl::pkey::PKey;

    use crate::b64u;
    use crate::key::Jwk;
    use crate::types::ExternalAccountBinding;

    #[test]
    fn binding_signature_verifies() {
        let account_key = PKey::from_rsa(openssl::rsa::Rsa::generate(2048).unwrap()).unwrap();
        let jwk = Jwk::try_from(&*account_key).unwrap();
        let hmac_key = PKey::hmac(b"0123456789abcdef0123456789abcdef").unwrap();

        let eab = ExternalAccountBinding::new(
            "kid-1",
            &hmac_key,
            jwk,
            "https://ex/acme/new-acct".to_string(),
        )
        .unwrap();

        let header: serde_json::Value =
            serde_json::from_slice(&b64u::decode(&eab.protected).unwrap()).unwrap();
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["kid"], "kid-1");
        assert_eq!(header["url"], "https://ex/acme/new-acct");

        // the payload is the account's public JWK
        let payload: serde_json::Value =
            serde_json::from_slice(&b64u::decode(&eab.payload).unwrap()).unwrap();
        assert_eq!(payload["kty"], "RSA");

        let mut signer =
            openssl::sign::Signer::new(openssl::hash::MessageDigest::sha256(), &hmac_key)
                .unwrap();
        let expected = signer
            .sign_oneshot_to_vec(format!("{}.{}", eab.protected, eab.payload).as_bytes())
            .unwrap();
        assert_eq!(b64u::decode(&eab.signature).unwrap(), expected);
    }
}
