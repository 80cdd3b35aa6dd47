//! The account-file backed ACME client.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, format_err, Error};
use serde::Serialize;

use seawall_acme::directory::Meta;
use seawall_acme::order::{Order, OrderData, Status as OrderStatus};
use seawall_acme::{Account, Authorization, Challenge, Client};

use crate::account_config::{self, AccountData};
use crate::types::{EngineErrorKind, DEFAULT_ACME_DIRECTORY_ENTRY};

/// Default RSA key size for newly generated account keys.
pub const DEFAULT_ACCOUNT_KEY_BITS: u32 = 4096;

const POLL_START_DELAY: Duration = Duration::from_secs(1);
const POLL_MAX_DELAY: Duration = Duration::from_secs(30);

/// A blocking ACME client tied to an account file on disk.
///
/// This wraps the protocol level [`Client`] and keeps the account file up to date: the key is
/// generated (or loaded) from the file, and every account mutation is persisted before the call
/// returns. Orders and authorizations are plain data handed back to the caller, the client keeps
/// no reference to them.
pub struct AcmeClient {
    client: Client,
    account_path: PathBuf,
    tos: Option<String>,
    debug: bool,
    loaded: bool,
}

impl AcmeClient {
    /// Create a new ACME client for the given account file path and ACME directory URL.
    ///
    /// Without a directory URL the Let's Encrypt staging directory is used. This does not touch
    /// the file system yet; use [`init`](AcmeClient::init()) for a new account or
    /// [`load`](AcmeClient::load()) for an existing one.
    pub fn new<P: AsRef<Path>>(account_path: P, directory_url: Option<String>) -> Self {
        let directory_url =
            directory_url.unwrap_or_else(|| DEFAULT_ACME_DIRECTORY_ENTRY.url.to_string());

        Self {
            client: Client::new(directory_url),
            account_path: account_path.as_ref().to_owned(),
            tos: None,
            debug: false,
            loaded: false,
        }
    }

    /// Generate a new account key of the given size (default 4096 bit RSA) and persist it.
    ///
    /// This fails if an account (or at least its key) already exists, in memory or on disk; the
    /// account is not registered with the CA yet, see [`new_account`](AcmeClient::new_account()).
    pub fn init(&mut self, rsa_bits: Option<u32>) -> Result<(), Error> {
        if self.client.account().is_some() {
            return Err(
                Error::new(EngineErrorKind::AlreadyExists).context("account key already exists")
            );
        }
        if self.account_path.exists() {
            return Err(Error::new(EngineErrorKind::AlreadyExists).context(format!(
                "refusing to overwrite existing account file {:?}",
                self.account_path
            )));
        }

        let bits = rsa_bits.unwrap_or(DEFAULT_ACCOUNT_KEY_BITS);
        log::info!("generating new {} bit RSA account key", bits);

        let key = openssl::rsa::Rsa::generate(bits)
            .and_then(openssl::pkey::PKey::from_rsa)
            .map_err(|err| format_err!("failed to generate account key: {}", err))?;
        let key = String::from_utf8(key.private_key_to_pem_pkcs8()?)
            .map_err(|_| format_err!("generated key is not valid utf-8 PEM"))?;

        let account = Account::from_parts(None, key, serde_json::from_str("{}")?);

        let data = self.account_data(&account);
        account_config::create_account_config(&self.account_path, &data)?;

        self.client.set_account(account);
        self.loaded = true;

        Ok(())
    }

    /// Load the account file. A second call is a no-op.
    pub fn load(&mut self) -> Result<(), Error> {
        if self.loaded {
            return Ok(());
        }

        let data = account_config::load_account_config(&self.account_path)?;

        // the file knows which directory the account belongs to
        if let Some(directory) = &data.directory {
            if directory != self.client.directory_url() {
                self.client.set_directory_url(directory.clone());
            }
        }

        self.tos = data.tos.clone();
        self.debug = data.debug;
        self.client.set_account(data.to_account());
        self.loaded = true;

        Ok(())
    }

    fn account_data(&self, account: &Account) -> AccountData {
        AccountData::from_account(
            account,
            Some(self.client.directory_url().to_owned()),
            self.tos.clone(),
            self.debug,
        )
    }

    fn save(&self) -> Result<(), Error> {
        let account = self
            .client
            .account()
            .ok_or_else(|| format_err!("no account to save"))?;
        let data = self.account_data(account);
        account_config::save_account_config(&self.account_path, &data)?;
        log::debug!("saved account file {:?}", self.account_path);
        Ok(())
    }

    /// Get the directory's meta information, eg. to display the terms of service URL before
    /// registering. Fetches the directory if it wasn't queried yet.
    pub fn get_meta(&mut self) -> Result<Option<Meta>, Error> {
        Ok(self.client.directory()?.meta().cloned())
    }

    /// The ToS URL recorded at registration time, if any.
    pub fn tos(&self) -> Option<&str> {
        self.tos.as_deref()
    }

    /// The directory URL this client talks to.
    pub fn directory_url(&self) -> &str {
        self.client.directory_url()
    }

    /// Register a new account with the CA.
    ///
    /// `tos_url` should be the terms of service URL from [`get_meta`](AcmeClient::get_meta())
    /// once the user accepted them; it is recorded in the account file. The contact list should
    /// consist of ACME compatible strings such as `mailto:admin@example.com`.
    ///
    /// A key created via [`init`](AcmeClient::init()) is used if present; otherwise an RSA key
    /// of `rsa_bits` (or a P-256 EC key if `None`) is generated now.
    pub fn new_account(
        &mut self,
        tos_url: Option<String>,
        contact: Vec<String>,
        rsa_bits: Option<u32>,
        eab_creds: Option<(String, String)>,
    ) -> Result<&Account, Error> {
        if matches!(self.client.account(), Some(account) if account.location.is_some()) {
            return Err(Error::new(EngineErrorKind::AlreadyExists)
                .context("account is already registered, refusing to register again"));
        }

        self.tos = tos_url;

        let mut creator = Account::creator()
            .set_contacts(contact)
            .agree_to_tos(self.tos.is_some());

        if let Some((eab_kid, eab_hmac_key)) = eab_creds {
            creator = creator.set_eab_credentials(eab_kid, eab_hmac_key)?;
        }

        creator = match self.client.account() {
            // reuse the key generated by `init`
            Some(account) => creator.with_key(openssl::pkey::PKey::private_key_from_pem(
                account.private_key.as_bytes(),
            )?),
            None => match rsa_bits {
                Some(bits) => creator.generate_rsa_key(bits)?,
                None => creator.generate_ec_key()?,
            },
        };

        log::info!("registering ACME account at {}", self.client.directory_url());
        self.client.register_account(creator)?;
        self.save()?;
        self.loaded = true;

        // unwrap: register_account only succeeds after setting the account
        Ok(self.client.account().unwrap())
    }

    /// Update the server-side account object with arbitrary data (eg. a changed contact list or
    /// `{"status": "deactivated"}`), persisting the response.
    pub fn update_account<T: Serialize>(&mut self, data: &T) -> Result<&Account, Error> {
        self.client.update_account(data)?;
        self.save()?;
        // unwrap: update_account fails without an account
        Ok(self.client.account().unwrap())
    }

    /// Re-query the server-side account object ("POST-as-GET") and persist it.
    pub fn get_account(&mut self) -> Result<&Account, Error> {
        self.client.query_account()?;
        self.save()?;
        // unwrap: query_account fails without an account
        Ok(self.client.account().unwrap())
    }

    /// Place a new order for a set of domains. Returns the order location URL along with the
    /// order data.
    pub fn new_order<I>(&mut self, domains: I) -> Result<(String, OrderData), Error>
    where
        I: IntoIterator<Item = String>,
    {
        let domains: Vec<String> = domains.into_iter().collect();
        log::info!("placing ACME order for {}", domains.join(", "));
        let Order { location, data } = self.client.new_order(domains)?;
        log::info!("order URL: {}", location);
        Ok((location, data))
    }

    /// Query an order given its location URL.
    pub fn get_order(&mut self, order_url: &str) -> Result<OrderData, Error> {
        Ok(self.client.get_order(order_url)?)
    }

    /// Query an authorization given its URL (from the order's `authorizations` list).
    pub fn get_authorization(&mut self, auth_url: &str) -> Result<Authorization, Error> {
        Ok(self.client.get_authorization(auth_url)?)
    }

    /// Request validation of a challenge *after* provisioning it. The authorization should be
    /// polled afterwards.
    pub fn request_challenge_validation(&mut self, challenge_url: &str) -> Result<Challenge, Error> {
        log::info!("triggering validation via {}", challenge_url);
        Ok(self.client.request_challenge_validation(challenge_url)?)
    }

    /// Deactivate an authorization given its URL.
    pub fn deactivate_authorization(&mut self, auth_url: &str) -> Result<Authorization, Error> {
        Ok(self.client.deactivate_authorization(auth_url)?)
    }

    /// Finalize an order by submitting the DER encoded CSR, once the order is `ready`. Returns
    /// the updated order; the certificate is usually not available immediately, poll the order
    /// until it is `valid`.
    pub fn finalize_order(&mut self, order: &OrderData, csr_der: &[u8]) -> Result<OrderData, Error> {
        let finalize = order
            .finalize
            .as_deref()
            .ok_or_else(|| format_err!("missing 'finalize' URL in order"))?;
        Ok(self.client.finalize(finalize, csr_der)?)
    }

    /// Download the issued certificate chain (PEM) of a `valid` order.
    pub fn get_certificate(&mut self, order: &OrderData) -> Result<String, Error> {
        let certificate = order.certificate.as_deref().ok_or_else(|| {
            Error::new(EngineErrorKind::NoCertificateYet)
                .context("no certificate URL in order, the order is not valid yet")
        })?;

        log::info!("downloading certificate from {}", certificate);
        let body = self.client.get_certificate(certificate)?;
        String::from_utf8(body).map_err(|_| format_err!("certificate chain is not valid utf-8"))
    }

    /// Revoke a certificate (PEM or DER), authorized with the account key. A missing `reason`
    /// is sent as `0` (unspecified).
    pub fn revoke_certificate(
        &mut self,
        certificate: &[u8],
        reason: Option<u32>,
    ) -> Result<(), Error> {
        log::info!("revoking certificate (reason {})", reason.unwrap_or(0));
        Ok(self.client.revoke_certificate(certificate, reason)?)
    }

    /// Revoke a certificate (PEM or DER), authorized with the certificate's own private key.
    pub fn revoke_certificate_with_key(
        &mut self,
        certificate: &[u8],
        key_pem: &[u8],
        reason: Option<u32>,
    ) -> Result<(), Error> {
        log::info!(
            "revoking certificate with its own key (reason {})",
            reason.unwrap_or(0)
        );
        Ok(self
            .client
            .revoke_certificate_with_key(certificate, key_pem, reason)?)
    }

    /// Get the key authorization string (`token.thumbprint`) for a challenge token. This is
    /// what an `http-01` provisioner publishes verbatim.
    pub fn key_authorization(&self, token: &str) -> Result<String, Error> {
        Ok(self.client.key_authorization(token)?)
    }

    /// Get the TXT record value for a `dns-01` challenge token.
    pub fn dns_01_txt_value(&self, token: &str) -> Result<String, Error> {
        Ok(self.client.dns_01_txt_value(token)?)
    }

    /// Poll an order with backoff until its status leaves `pending`/`processing` or the timeout
    /// elapses. Honors the server's `Retry-After` hint.
    pub fn wait_for_order(&mut self, order_url: &str, timeout: Duration) -> Result<OrderData, Error> {
        self.poll(order_url, timeout, |order: &OrderData| {
            !matches!(order.status, OrderStatus::Pending | OrderStatus::Processing)
        })
    }

    /// Poll an authorization with backoff until its status leaves `pending` or the timeout
    /// elapses. Honors the server's `Retry-After` hint.
    pub fn wait_for_authorization(
        &mut self,
        auth_url: &str,
        timeout: Duration,
    ) -> Result<Authorization, Error> {
        self.poll(auth_url, timeout, |auth: &Authorization| {
            !auth.status.is_pending()
        })
    }

    fn poll<T, F>(&mut self, url: &str, timeout: Duration, done: F) -> Result<T, Error>
    where
        T: for<'de> serde::Deserialize<'de>,
        F: Fn(&T) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut delay = POLL_START_DELAY;

        loop {
            let response = self.client.post_as_get(url)?;
            let data: T = response.json()?;
            if done(&data) {
                return Ok(data);
            }

            let mut sleep = delay;
            if let Some(retry_after) = response.headers.retry_after {
                sleep = sleep.max(Duration::from_secs(retry_after));
            }

            if Instant::now() + sleep > deadline {
                bail!("timed out waiting for {}", url);
            }

            log::debug!("{} still pending, trying again in {:?}", url, sleep);
            std::thread::sleep(sleep);
            delay = (delay * 2).min(POLL_MAX_DELAY);
        }
    }

    /// Get the debug flag stored in the account file.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Set the debug flag; persisted with the next save.
    pub fn set_debug(&mut self, on: bool) {
        self.debug = on;
    }

    /// Direct access to the underlying account, if any.
    pub fn account(&self) -> Result<&Account, Error> {
        self.client
            .account()
            .ok_or_else(|| format_err!("cannot use client without an account"))
    }

    /// Set a proxy. By default the proxy is taken from the usual environment variables.
    pub fn set_proxy(&mut self, proxy: String) {
        self.client.set_proxy(proxy)
    }

    /// Replace the request timeout applied to all HTTP calls.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.client.set_timeout(timeout)
    }

    /// Permit plain-http directory URLs, intended for tests against a local mock directory.
    pub fn set_allow_http(&mut self, allow: bool) {
        self.client.set_allow_http(allow)
    }
}
