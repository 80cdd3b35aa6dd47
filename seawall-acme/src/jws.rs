use std::convert::TryFrom;

use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use openssl::pkey::{HasPrivate, Id, PKeyRef};
use openssl::sign::Signer;
use serde::Serialize;

use crate::b64u;
use crate::key::Jwk;
use crate::Error;

#[derive(Serialize)]
struct Protected {
    alg: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
    nonce: String,
    url: String,
}

/// A flattened JSON Web Signature, the envelope for every authenticated ACME request.
///
/// The protected header carries exactly one of `kid` (the account location URL) or `jwk` (the
/// full public key, for requests made before an account location is known, or signed with a key
/// which is not an account key).
#[derive(Serialize)]
pub struct Jws {
    protected: String,
    payload: String,
    signature: String,
}

impl Jws {
    /// Create a JWS over a json payload.
    pub fn new<P, T>(
        key: &PKeyRef<P>,
        location: Option<String>,
        url: String,
        nonce: String,
        data: &T,
    ) -> Result<Self, Error>
    where
        P: HasPrivate,
        T: Serialize,
    {
        Self::new_full(
            key,
            location,
            url,
            nonce,
            b64u::encode(serde_json::to_string(data)?.as_bytes()),
        )
    }

    /// Create a JWS from an already base64url encoded payload.
    ///
    /// An empty `payload` produces the empty-payload form used for "POST-as-GET" requests. This
    /// is distinct from a request with an empty json object payload (`"{}"`).
    pub fn new_full<P: HasPrivate>(
        key: &PKeyRef<P>,
        location: Option<String>,
        url: String,
        nonce: String,
        payload: String,
    ) -> Result<Self, Error> {
        let jwk = Jwk::try_from(key)?;
        let alg = jwk.key.alg();

        let protected = Protected {
            alg,
            kid: location.clone(),
            jwk: if location.is_none() { Some(jwk) } else { None },
            nonce,
            url,
        };
        let protected = b64u::encode(serde_json::to_string(&protected)?.as_bytes());

        let signature = Self::sign(key, protected.as_bytes(), payload.as_bytes())?;

        Ok(Jws {
            protected,
            payload,
            signature: b64u::encode(&signature),
        })
    }

    fn sign<P: HasPrivate>(
        key: &PKeyRef<P>,
        protected: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>, Error> {
        // RSA keys use PKCS#1 v1.5 padding, the `Signer` default.
        let mut signer = Signer::new(MessageDigest::sha256(), key)
            .map_err(|err| Error::Ssl("failed to create signer", err))?;

        signer.update(protected)?;
        signer.update(b".")?;
        signer.update(payload)?;

        let signature = signer
            .sign_to_vec()
            .map_err(|err| Error::Ssl("failed to sign JWS", err))?;

        match key.id() {
            // ES256 requires the raw fixed-width `r || s` form instead of the DER signature
            // produced by openssl.
            Id::EC => {
                let signature = EcdsaSig::from_der(&signature)?;
                let mut out = signature.r().to_vec_padded(32)?;
                out.extend(signature.s().to_vec_padded(32)?);
                Ok(out)
            }
            _ => Ok(signature),
        }
    }
}

#[cfg(test)]
mod test {
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::sign::Verifier;

    use crate::b64u;

    use super::Jws;

    #[test]
    fn structure_and_signature() {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        let jws = Jws::new(
            &key,
            Some("https://ex/acct/1".to_string()),
            "https://ex/new-order".to_string(),
            "nonce-1".to_string(),
            &serde_json::json!({ "hello": "world" }),
        )
        .unwrap();

        let value = serde_json::to_value(&jws).unwrap();
        let object = value.as_object().unwrap();
        let mut fields: Vec<_> = object.keys().collect();
        fields.sort();
        assert_eq!(fields, ["payload", "protected", "signature"]);

        let protected: serde_json::Value =
            serde_json::from_slice(&b64u::decode(object["protected"].as_str().unwrap()).unwrap())
                .unwrap();
        assert_eq!(protected["alg"], "RS256");
        assert_eq!(protected["kid"], "https://ex/acct/1");
        assert_eq!(protected["nonce"], "nonce-1");
        assert_eq!(protected["url"], "https://ex/new-order");
        assert!(protected.get("jwk").is_none());

        let signing_input = format!(
            "{}.{}",
            object["protected"].as_str().unwrap(),
            object["payload"].as_str().unwrap()
        );
        let signature = b64u::decode(object["signature"].as_str().unwrap()).unwrap();

        let mut verifier =
            Verifier::new(openssl::hash::MessageDigest::sha256(), &key).unwrap();
        assert!(verifier
            .verify_oneshot(&signature, signing_input.as_bytes())
            .unwrap());
    }

    #[test]
    fn jwk_mode_without_location() {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        let jws = Jws::new_full(
            &key,
            None,
            "https://ex/new-acct".to_string(),
            "nonce-2".to_string(),
            String::new(),
        )
        .unwrap();

        let value = serde_json::to_value(&jws).unwrap();
        // POST-as-GET: the payload is the empty string, not "{}"
        assert_eq!(value["payload"], "");

        let protected: serde_json::Value =
            serde_json::from_slice(&b64u::decode(value["protected"].as_str().unwrap()).unwrap())
                .unwrap();
        assert!(protected.get("kid").is_none());
        assert_eq!(protected["jwk"]["kty"], "RSA");
        assert_eq!(protected["jwk"]["use"], "sig");
    }

    #[test]
    fn ec_signature_is_raw_form() {
        let group =
            openssl::ec::EcGroup::from_curve_name(openssl::nid::Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(openssl::ec::EcKey::generate(&group).unwrap()).unwrap();

        let jws = Jws::new(
            &key,
            Some("https://ex/acct/2".to_string()),
            "https://ex/order/1".to_string(),
            "nonce-3".to_string(),
            &serde_json::json!({}),
        )
        .unwrap();

        let value = serde_json::to_value(&jws).unwrap();
        let protected: serde_json::Value =
            serde_json::from_slice(&b64u::decode(value["protected"].as_str().unwrap()).unwrap())
                .unwrap();
        assert_eq!(protected["alg"], "ES256");
        assert_eq!(
            b64u::decode(value["signature"].as_str().unwrap()).unwrap().len(),
            64
        );
    }
}
