use std::convert::TryFrom;

use openssl::bn::{BigNum, BigNumContext};
use openssl::hash::{Hasher, MessageDigest};
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, Id, PKeyRef};
use serde::Serialize;

use crate::b64u;
use crate::Error;

/// An RSA public key, in the JWK member layout.
#[derive(Clone, Debug, Serialize)]
pub struct RsaPublicKey {
    #[serde(with = "crate::b64u::bytes")]
    e: Vec<u8>,
    kty: &'static str,
    #[serde(with = "crate::b64u::bytes")]
    n: Vec<u8>,
}

/// A P-256 EC public key, in the JWK member layout.
#[derive(Clone, Debug, Serialize)]
pub struct EcPublicKey {
    crv: &'static str,
    kty: &'static str,
    #[serde(with = "crate::b64u::bytes")]
    x: Vec<u8>,
    #[serde(with = "crate::b64u::bytes")]
    y: Vec<u8>,
}

/// A public key, with the field layout required for JWK thumbprints.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum PublicKey {
    /// An RSA public key.
    Rsa(RsaPublicKey),
    /// An EC public key.
    Ec(EcPublicKey),
}

impl PublicKey {
    /// The thumbprint is the b64u encoded sha256 digest of the *canonical* json representation
    /// of the bare public key, per RFC 7638. Notably the `use` member of the containing [`Jwk`]
    /// is not part of the hashed data.
    pub fn thumbprint(&self) -> Result<String, Error> {
        let mut hasher = Hasher::new(MessageDigest::sha256())?;
        crate::json::write_canonical(&serde_json::to_value(self)?, &mut hasher)?;
        Ok(b64u::encode(hasher.finish()?.as_ref()))
    }

    /// The JWS signature algorithm name matching this key.
    pub fn alg(&self) -> &'static str {
        match self {
            PublicKey::Rsa(_) => "RS256",
            PublicKey::Ec(_) => "ES256",
        }
    }
}

impl<P: HasPublic> TryFrom<&PKeyRef<P>> for PublicKey {
    type Error = Error;

    fn try_from(key: &PKeyRef<P>) -> Result<Self, Self::Error> {
        match key.id() {
            Id::RSA => {
                let rsa = key.rsa()?;
                Ok(PublicKey::Rsa(RsaPublicKey {
                    e: rsa.e().to_vec(),
                    kty: "RSA",
                    n: rsa.n().to_vec(),
                }))
            }
            Id::EC => {
                let ec = key.ec_key()?;
                let group = ec.group();
                if group.curve_name() != Some(Nid::X9_62_PRIME256V1) {
                    return Err(Error::UnsupportedGroup);
                }

                let mut ctx = BigNumContext::new()?;
                let mut x = BigNum::new()?;
                let mut y = BigNum::new()?;
                ec.public_key()
                    .affine_coordinates_gfp(group, &mut x, &mut y, &mut ctx)?;

                // coordinates are fixed-width in the JWK representation
                Ok(PublicKey::Ec(EcPublicKey {
                    crv: "P-256",
                    kty: "EC",
                    x: x.to_vec_padded(32)?,
                    y: y.to_vec_padded(32)?,
                }))
            }
            _ => Err(Error::UnsupportedKeyType),
        }
    }
}

/// A JSON Web Key, the public key representation used in `jwk`-authorized protected headers.
#[derive(Clone, Debug, Serialize)]
pub struct Jwk {
    /// The intended use of the key. Must not be serialized when computing the thumbprint.
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub usage: Option<&'static str>,

    /// The public key data.
    #[serde(flatten)]
    pub key: PublicKey,
}

impl Jwk {
    /// The thumbprint of the contained public key, see [`PublicKey::thumbprint`].
    pub fn thumbprint(&self) -> Result<String, Error> {
        self.key.thumbprint()
    }
}

impl<P: HasPublic> TryFrom<&PKeyRef<P>> for Jwk {
    type Error = Error;

    fn try_from(key: &PKeyRef<P>) -> Result<Self, Self::Error> {
        Ok(Self {
            usage: Some("sig"),
            key: PublicKey::try_from(key)?,
        })
    }
}
