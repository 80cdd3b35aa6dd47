//! ACME Account management and creation. The [`Account`] type also contains most of the ACME API
//! entry point helpers.

use std::convert::TryFrom;

use base64::engine::general_purpose::STANDARD;
use base64::engine::Engine as _;
use openssl::pkey::{PKey, Private};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::authorization::{Authorization, GetAuthorization};
use crate::b64u;
use crate::directory::Directory;
use crate::jws::Jws;
use crate::key::{Jwk, PublicKey};
use crate::order::{NewOrder, Order, OrderData};
use crate::request::Request;
use crate::types::{AccountData, AccountStatus, ExternalAccountBinding};
use crate::Error;

/// An ACME Account.
///
/// This contains the location URL, the account data and the private key for an account.
/// This can directly be serialized via serde to persist the account.
///
/// The location URL is `None` for accounts which hold a generated key but have not been
/// registered with the ACME provider yet. Such accounts can only issue `jwk`-authorized
/// requests (ie. the registration itself).
///
/// In order to register a new account with an ACME provider, see the [`Account::creator`] method.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account location URL. Assigned by the server on registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Acme account data.
    pub data: AccountData,

    /// PEM formatted private key.
    pub private_key: String,
}

impl Account {
    /// Rebuild an account from its components.
    pub fn from_parts(location: Option<String>, private_key: String, data: AccountData) -> Self {
        Self {
            location,
            data,
            private_key,
        }
    }

    /// Builds an [`AccountCreator`]. This handles creation of the private key and account data as
    /// well as handling the response sent by the server for the registration request.
    pub fn creator() -> AccountCreator {
        AccountCreator::default()
    }

    fn kid(&self) -> Result<String, Error> {
        self.location.clone().ok_or(Error::MissingLocation)
    }

    /// Place a new order. This will build a [`NewOrder`] representing an in flight order creation
    /// request.
    ///
    /// The returned `NewOrder`'s `request` option is *guaranteed* to be `Some(Request)`.
    pub fn new_order(
        &self,
        order: &OrderData,
        directory: &Directory,
        nonce: &str,
    ) -> Result<NewOrder, Error> {
        let key = PKey::private_key_from_pem(self.private_key.as_bytes())?;

        if order.identifiers.is_empty() {
            return Err(Error::EmptyOrder);
        }

        let url = directory.new_order_url();
        let body = serde_json::to_string(&Jws::new(
            &key,
            Some(self.kid()?),
            url.to_owned(),
            nonce.to_owned(),
            order,
        )?)?;

        let request = Request {
            url: url.to_owned(),
            method: "POST",
            content_type: crate::request::JOSE_JSON_CONTENT_TYPE,
            body,
            expected: crate::request::CREATED,
        };

        Ok(NewOrder::new(request))
    }

    /// Prepare a "POST-as-GET" request to fetch data. Low level helper.
    pub fn get_request(&self, url: &str, nonce: &str) -> Result<Request, Error> {
        let key = PKey::private_key_from_pem(self.private_key.as_bytes())?;
        let body = serde_json::to_string(&Jws::new_full(
            &key,
            Some(self.kid()?),
            url.to_owned(),
            nonce.to_owned(),
            String::new(),
        )?)?;

        Ok(Request {
            url: url.to_owned(),
            method: "POST",
            content_type: crate::request::JOSE_JSON_CONTENT_TYPE,
            body,
            expected: 200,
        })
    }

    /// Prepare a JSON POST request. Low level helper.
    pub fn post_request<T: Serialize>(
        &self,
        url: &str,
        nonce: &str,
        data: &T,
    ) -> Result<Request, Error> {
        let key = PKey::private_key_from_pem(self.private_key.as_bytes())?;
        let body = serde_json::to_string(&Jws::new(
            &key,
            Some(self.kid()?),
            url.to_owned(),
            nonce.to_owned(),
            data,
        )?)?;

        Ok(Request {
            url: url.to_owned(),
            method: "POST",
            content_type: crate::request::JOSE_JSON_CONTENT_TYPE,
            body,
            expected: 200,
        })
    }

    /// Prepare a JSON POST request with a raw, pre-serialized payload.
    fn post_request_raw_payload(
        &self,
        url: &str,
        nonce: &str,
        payload: String,
    ) -> Result<Request, Error> {
        let key = PKey::private_key_from_pem(self.private_key.as_bytes())?;
        let body = serde_json::to_string(&Jws::new_full(
            &key,
            Some(self.kid()?),
            url.to_owned(),
            nonce.to_owned(),
            b64u::encode(payload.as_bytes()),
        )?)?;

        Ok(Request {
            url: url.to_owned(),
            method: "POST",
            content_type: crate::request::JOSE_JSON_CONTENT_TYPE,
            body,
            expected: 200,
        })
    }

    /// Get the "key authorization" for a token.
    pub fn key_authorization(&self, token: &str) -> Result<String, Error> {
        let key = PKey::private_key_from_pem(self.private_key.as_bytes())?;
        let thumbprint = PublicKey::try_from(&*key)?.thumbprint()?;
        Ok(format!("{}.{}", token, thumbprint))
    }

    /// Get the TXT field value for a dns-01 token. This is the base64url encoded sha256 digest of
    /// the key authorization value.
    pub fn dns_01_txt_value(&self, token: &str) -> Result<String, Error> {
        let key_authorization = self.key_authorization(token)?;
        let digest = openssl::sha::sha256(key_authorization.as_bytes());
        Ok(b64u::encode(&digest))
    }

    /// Prepare a request to update account data.
    ///
    /// This is a rather low level interface. You should know what you're doing.
    pub fn update_account_request<T: Serialize>(
        &self,
        nonce: &str,
        data: &T,
    ) -> Result<Request, Error> {
        let location = self.kid()?;
        self.post_request(&location, nonce, data)
    }

    /// Prepare a request to deactivate this account.
    pub fn deactivate_account_request(&self, nonce: &str) -> Result<Request, Error> {
        let location = self.kid()?;
        self.post_request_raw_payload(&location, nonce, r#"{"status":"deactivated"}"#.to_string())
    }

    /// Prepare a request to deactivate an authorization, given its URL.
    pub fn deactivate_authorization_request(
        &self,
        auth_url: &str,
        nonce: &str,
    ) -> Result<Request, Error> {
        self.post_request_raw_payload(auth_url, nonce, r#"{"status":"deactivated"}"#.to_string())
    }

    /// Prepare a request to query an Authorization for an Order.
    ///
    /// Returns `Ok(None)` if `auth_index` is out of out of range. You can query the number of
    /// authorizations from via [`Order::authorization_len`] or by manually inspecting its
    /// `.data.authorizations` vector.
    pub fn get_authorization(
        &self,
        order: &Order,
        auth_index: usize,
        nonce: &str,
    ) -> Result<Option<GetAuthorization>, Error> {
        match order.authorization(auth_index) {
            None => Ok(None),
            Some(url) => Ok(Some(GetAuthorization::new(self.get_request(url, nonce)?))),
        }
    }

    /// Prepare a request to validate a Challenge from an Authorization.
    ///
    /// Returns `Ok(None)` if `challenge_index` is out of out of range. The challenge count is
    /// available by inspecting the [`Authorization::challenges`] vector.
    ///
    /// The payload is the empty json object required by RFC 8555; the challenge's key
    /// authorization is never part of this request, it only goes to the provisioner.
    ///
    /// This returns a raw `Request` since validation takes some time and the `Authorization`
    /// object has to be re-queried and its `status` inspected.
    pub fn validate_challenge(
        &self,
        authorization: &Authorization,
        challenge_index: usize,
        nonce: &str,
    ) -> Result<Option<Request>, Error> {
        match authorization.challenges.get(challenge_index) {
            None => Ok(None),
            Some(challenge) => self
                .post_request_raw_payload(&challenge.url, nonce, "{}".to_string())
                .map(Some),
        }
    }

    /// Prepare a request to revoke a certificate, authorized with this account's key.
    ///
    /// The certificate can be either PEM or DER formatted. A missing `reason` is sent as
    /// `0` (unspecified).
    pub fn revoke_certificate(
        &self,
        certificate: &[u8],
        reason: Option<u32>,
    ) -> Result<CertificateRevocation<'_>, Error> {
        Ok(CertificateRevocation {
            signer: RevocationSigner::Account(self),
            data: revocation_payload(certificate, reason)?,
        })
    }
}

/// Prepare a request to revoke a certificate, authorized with the certificate's own private key
/// instead of an account key. The resulting request carries a `jwk` protected header built from
/// that key.
pub fn revoke_certificate_with_key(
    certificate: &[u8],
    key_pem: &[u8],
    reason: Option<u32>,
) -> Result<CertificateRevocation<'static>, Error> {
    let key = PKey::private_key_from_pem(key_pem)?;
    Ok(CertificateRevocation {
        signer: RevocationSigner::CertificateKey(key),
        data: revocation_payload(certificate, reason)?,
    })
}

fn revocation_payload(certificate: &[u8], reason: Option<u32>) -> Result<Value, Error> {
    let cert = if certificate.starts_with(b"-----BEGIN CERTIFICATE-----") {
        b64u::encode(&openssl::x509::X509::from_pem(certificate)?.to_der()?)
    } else {
        b64u::encode(certificate)
    };

    Ok(serde_json::json!({
        "certificate": cert,
        "reason": reason.unwrap_or(0),
    }))
}

enum RevocationSigner<'a> {
    Account(&'a Account),
    CertificateKey(PKey<Private>),
}

/// Certificate revocation involves converting the certificate to base64url encoded DER and then
/// embedding it in a json structure. Since we also need a nonce and possibly retry the request if
/// a `BadNonce` error happens, this caches the converted data for efficiency.
pub struct CertificateRevocation<'a> {
    signer: RevocationSigner<'a>,
    data: Value,
}

impl CertificateRevocation<'_> {
    /// Create the revocation request using the specified nonce for the given directory.
    pub fn request(&self, directory: &Directory, nonce: &str) -> Result<Request, Error> {
        let url = directory.revoke_cert_url();
        match &self.signer {
            RevocationSigner::Account(account) => account.post_request(url, nonce, &self.data),
            RevocationSigner::CertificateKey(key) => {
                let body = serde_json::to_string(&Jws::new(
                    key,
                    None,
                    url.to_owned(),
                    nonce.to_owned(),
                    &self.data,
                )?)?;

                Ok(Request {
                    url: url.to_owned(),
                    method: "POST",
                    content_type: crate::request::JOSE_JSON_CONTENT_TYPE,
                    body,
                    expected: 200,
                })
            }
        }
    }
}

/// Helper to create an account.
///
/// This is used to generate a private key and set the contact info for the account. Afterwards the
/// creation request can be created via the [`request`](AccountCreator::request()) method, giving
/// it a nonce and a directory.  This can be repeated, if necessary, like when the nonce fails.
///
/// When the server sends a successful response, it should be passed to the
/// [`response`](AccountCreator::response()) method to finish the creation of an [`Account`] which
/// can then be persisted.
#[derive(Default)]
#[must_use = "when creating an account you must pass the response to AccountCreator::response()!"]
pub struct AccountCreator {
    contact: Vec<String>,
    terms_of_service_agreed: bool,
    key: Option<PKey<Private>>,
    eab_credentials: Option<(String, PKey<Private>)>,
}

impl AccountCreator {
    /// Replace the contact info with the provided ACME compatible data.
    pub fn set_contacts(mut self, contact: Vec<String>) -> Self {
        self.contact = contact;
        self
    }

    /// Append a contact string.
    pub fn contact(mut self, contact: String) -> Self {
        self.contact.push(contact);
        self
    }

    /// Append an email address to the contact list.
    pub fn email(self, email: String) -> Self {
        self.contact(format!("mailto:{}", email))
    }

    /// Change whether the account agrees to the terms of service. Use the directory's or client's
    /// `terms_of_service_url()` method to present the user with the Terms of Service.
    pub fn agree_to_tos(mut self, agree: bool) -> Self {
        self.terms_of_service_agreed = agree;
        self
    }

    /// Set the EAB credentials for the account registration
    pub fn set_eab_credentials(mut self, kid: String, hmac_key: String) -> Result<Self, Error> {
        let hmac_key = if hmac_key.contains('+') || hmac_key.contains('/') {
            STANDARD
                .decode(&hmac_key)
                .map_err(|err| Error::Custom(format!("invalid EAB hmac key: {err}")))?
        } else {
            b64u::decode(&hmac_key)?
        };
        let hmac_key = PKey::hmac(&hmac_key)?;
        self.eab_credentials = Some((kid, hmac_key));
        Ok(self)
    }

    /// Generate a new RSA key of the specified key size.
    pub fn generate_rsa_key(self, bits: u32) -> Result<Self, Error> {
        let key = openssl::rsa::Rsa::generate(bits)?;
        Ok(self.with_key(PKey::from_rsa(key)?))
    }

    /// Generate a new P-256 EC key.
    pub fn generate_ec_key(self) -> Result<Self, Error> {
        let key = openssl::ec::EcKey::generate(
            openssl::ec::EcGroup::from_curve_name(openssl::nid::Nid::X9_62_PRIME256V1)?.as_ref(),
        )?;
        Ok(self.with_key(PKey::from_ec_key(key)?))
    }

    /// Use an existing key. Note that only RSA and EC keys using the `P-256` curve are currently
    /// supported, however, this will not be checked at this point.
    pub fn with_key(mut self, key: PKey<Private>) -> Self {
        self.key = Some(key);
        self
    }

    /// Whether a key has already been attached (or generated).
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Prepare a HTTP request to create this account.
    ///
    /// Changes to the user data made after this will have no effect on the account generated with
    /// the resulting request.
    /// Changing the private key between using the request and passing the response to
    /// [`response`](AccountCreator::response()) will render the account unusable!
    pub fn request(&self, directory: &Directory, nonce: &str) -> Result<Request, Error> {
        let key = self.key.as_deref().ok_or(Error::MissingKey)?;
        let url = directory.new_account_url();

        let external_account_binding = self
            .eab_credentials
            .as_ref()
            .map(|cred| {
                ExternalAccountBinding::new(&cred.0, &cred.1, Jwk::try_from(key)?, url.to_string())
            })
            .transpose()?;

        let data = AccountData {
            orders: None,
            status: AccountStatus::New,
            contact: self.contact.clone(),
            terms_of_service_agreed: if self.terms_of_service_agreed {
                Some(true)
            } else {
                None
            },
            external_account_binding,
            only_return_existing: false,
            extra: Default::default(),
        };

        let body = serde_json::to_string(&Jws::new(
            key,
            None,
            url.to_owned(),
            nonce.to_owned(),
            &data,
        )?)?;

        Ok(Request {
            url: url.to_owned(),
            method: "POST",
            content_type: crate::request::JOSE_JSON_CONTENT_TYPE,
            body,
            expected: crate::request::CREATED,
        })
    }

    /// After issuing the request from [`request()`](AccountCreator::request()), the response's
    /// `Location` header and body must be passed to this for verification and to create an account
    /// which is to be persisted!
    pub fn response(self, location_header: String, response_body: &[u8]) -> Result<Account, Error> {
        let private_key = self
            .key
            .ok_or(Error::MissingKey)?
            .private_key_to_pem_pkcs8()?;
        let private_key = String::from_utf8(private_key).map_err(|_| {
            Error::Custom("PEM key contained illegal non-utf-8 characters".to_string())
        })?;

        Ok(Account {
            location: Some(location_header),
            data: serde_json::from_slice(response_body)
                .map_err(|err| Error::BadAccountData(err.to_string()))?,
            private_key,
        })
    }
}

#[cfg(test)]
mod test {
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;

    use crate::b64u;
    use crate::types::AccountData;

    use super::Account;

    fn test_account() -> Account {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let pem = String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap();
        Account::from_parts(
            Some("https://ex/acct/1".to_string()),
            pem,
            serde_json::from_str::<AccountData>("{}").unwrap(),
        )
    }

    #[test]
    fn key_authorization_format() {
        let account = test_account();

        let key_auth = account.key_authorization("TOKEN").unwrap();
        let (token, thumbprint) = key_auth.split_once('.').unwrap();
        assert_eq!(token, "TOKEN");
        assert_eq!(thumbprint.len(), 43);

        let txt = account.dns_01_txt_value("TOKEN").unwrap();
        let expected = b64u::encode(&openssl::sha::sha256(key_auth.as_bytes()));
        assert_eq!(txt, expected);
    }

    #[test]
    fn unregistered_account_has_no_kid() {
        let mut account = test_account();
        account.location = None;

        match account.get_request("https://ex/order/1", "nonce") {
            Err(crate::Error::MissingLocation) => (),
            other => panic!("expected MissingLocation, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn challenge_validation_payload_is_empty_object() {
        let account = test_account();
        let authorization: crate::Authorization = serde_json::from_str(
            r#"{
                "identifier": {"type": "dns", "value": "example.com"},
                "status": "pending",
                "challenges": [
                    {"type": "dns-01", "status": "pending", "url": "https://ex/chall/1", "token": "abc"}
                ]
            }"#,
        )
        .unwrap();

        let request = account
            .validate_challenge(&authorization, 0, "nonce")
            .unwrap()
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(
            b64u::decode(body["payload"].as_str().unwrap()).unwrap(),
            b"{}"
        );
        assert!(account.validate_challenge(&authorization, 1, "nonce").unwrap().is_none());
    }

    #[test]
    fn revocation_payload_defaults_reason_to_zero() {
        let account = test_account();
        let revocation = account.revoke_certificate(b"raw-der-bytes", None).unwrap();
        assert_eq!(revocation.data["reason"], 0);
        assert_eq!(
            revocation.data["certificate"],
            b64u::encode(b"raw-der-bytes").as_str()
        );

        let revocation = account.revoke_certificate(b"raw-der-bytes", Some(4)).unwrap();
        assert_eq!(revocation.data["reason"], 4);
    }
}
