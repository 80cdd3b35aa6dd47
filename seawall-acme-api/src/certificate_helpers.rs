//! X.509 certificate helpers: introspection, expiry checks, key/cert matching and self-signed
//! placeholder certificates.

use anyhow::{bail, format_err, Error};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509};

use crate::types::{CertificateInfo, EngineErrorKind};

impl CertificateInfo {
    /// Parse a (leaf) certificate in PEM format and extract the information users typically
    /// want to display.
    pub fn from_pem(cert_pem: &[u8]) -> Result<Self, Error> {
        let x509 = openssl::x509::X509::from_pem(cert_pem)?;

        let cert_pem = String::from_utf8(cert_pem.to_vec())
            .map_err(|_| format_err!("certificate is not a valid PEM file"))?;

        let pubkey = x509.public_key()?;

        let subject = x509name_to_string(x509.subject_name())?;
        let issuer = x509name_to_string(x509.issuer_name())?;

        let fingerprint = x509.digest(MessageDigest::sha256())?;
        let fingerprint = hex::encode(fingerprint)
            .as_bytes()
            .chunks(2)
            .map(|v| std::str::from_utf8(v).unwrap())
            .collect::<Vec<&str>>()
            .join(":");

        let public_key_type = openssl::nid::Nid::from_raw(pubkey.id().as_raw())
            .long_name()
            .unwrap_or("<unsupported key type>")
            .to_owned();

        let san = x509
            .subject_alt_names()
            .map(|san| {
                san.into_iter()
                    .filter_map(|name| {
                        if let Some(name) = name.dnsname() {
                            Some(name.to_string())
                        } else if let Some(ip) = name.ipaddress() {
                            format_ip_address(ip)
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(CertificateInfo {
            pem: Some(cert_pem),
            subject,
            issuer,
            fingerprint: Some(fingerprint),
            public_key_bits: Some(pubkey.bits()),
            notbefore: asn1_time_to_unix(x509.not_before()).ok(),
            notafter: asn1_time_to_unix(x509.not_after()).ok(),
            public_key_type,
            san,
        })
    }

    /// Check if the certificate is expired at or after a specific unix epoch.
    pub fn is_expired_after_epoch(&self, epoch: i64) -> bool {
        match self.notafter {
            Some(notafter) => notafter < epoch,
            None => false,
        }
    }

    /// Check if the certificate is expired right now.
    pub fn is_expired(&self) -> Result<bool, Error> {
        Ok(self.is_expired_after_epoch(epoch_now()?))
    }
}

/// Check whether a certificate (PEM) is expired at the given unix epoch.
pub fn check_expiry(cert_pem: &[u8], at_epoch: i64) -> Result<bool, Error> {
    Ok(CertificateInfo::from_pem(cert_pem)?.is_expired_after_epoch(at_epoch))
}

/// Check whether a certificate (PEM) is expired right now.
pub fn check_expiry_now(cert_pem: &[u8]) -> Result<bool, Error> {
    check_expiry(cert_pem, epoch_now()?)
}

fn epoch_now() -> Result<i64, Error> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs() as i64)
}

/// Verify that the given private key belongs to the given certificate by comparing the derived
/// public keys.
pub fn check_cert_key_match(cert_pem: &[u8], key_pem: &[u8]) -> Result<(), Error> {
    let certificate = X509::from_pem(cert_pem)
        .map_err(|err| format_err!("failed to parse certificate: {}", err))?;
    let key = PKey::private_key_from_pem(key_pem)
        .map_err(|err| format_err!("failed to parse private key: {}", err))?;

    if !certificate.public_key()?.public_eq(&key) {
        return Err(Error::new(EngineErrorKind::KeyMismatch));
    }

    Ok(())
}

fn x509name_to_string(name: &openssl::x509::X509NameRef) -> Result<String, Error> {
    let mut parts = Vec::new();
    for entry in name.entries() {
        parts.push(format!(
            "{} = {}",
            entry.object().nid().short_name()?,
            entry.data().as_utf8()?
        ));
    }
    Ok(parts.join(", "))
}

// GeneralName ip addresses are the raw address bytes.
fn format_ip_address(ip: &[u8]) -> Option<String> {
    match ip.len() {
        4 => {
            let octets: [u8; 4] = ip.try_into().unwrap();
            Some(std::net::Ipv4Addr::from(octets).to_string())
        }
        16 => {
            let octets: [u8; 16] = ip.try_into().unwrap();
            Some(std::net::Ipv6Addr::from(octets).to_string())
        }
        _ => None,
    }
}

fn asn1_time_to_unix(time: &Asn1TimeRef) -> Result<i64, Error> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    Ok(i64::from(diff.days) * 86_400 + i64::from(diff.secs))
}

/// Generate a self-signed certificate for a list of identifiers, eg. to have *some* certificate
/// in place until a CA issued one is available.
///
/// An existing private key (PEM) can be passed to keep a stable keypair, otherwise a fresh
/// 4096 bit RSA key is generated. Returns the key together with the certificate.
pub fn create_self_signed_cert(
    identifiers: &[impl AsRef<str>],
    days: u32,
    private_key_pem: Option<&[u8]>,
) -> Result<(PKey<Private>, X509), Error> {
    if identifiers.is_empty() {
        bail!("cannot create a certificate without identifiers");
    }

    let privkey = match private_key_pem {
        Some(pem) => PKey::private_key_from_pem(pem)?,
        None => PKey::from_rsa(Rsa::generate(4096)?)?,
    };

    let mut x509 = X509Builder::new()?;
    x509.set_version(2)?;

    let today = Asn1Time::days_from_now(0)?;
    x509.set_not_before(&today)?;
    let expire = Asn1Time::days_from_now(days)?;
    x509.set_not_after(&expire)?;

    let mut subject_name = openssl::x509::X509NameBuilder::new()?;
    subject_name.append_entry_by_text("CN", identifiers[0].as_ref())?;
    let subject_name = subject_name.build();

    x509.set_subject_name(&subject_name)?;
    x509.set_issuer_name(&subject_name)?;

    let basic_constraints = openssl::x509::extension::BasicConstraints::new().build()?;
    x509.append_extension(basic_constraints)?;

    let usage = openssl::x509::extension::ExtendedKeyUsage::new()
        .server_auth()
        .build()?;
    x509.append_extension(usage)?;

    let context = x509.x509v3_context(None, None);
    let mut alt_names = openssl::x509::extension::SubjectAlternativeName::new();
    for identifier in identifiers {
        alt_names.dns(identifier.as_ref());
    }
    let alt_names = alt_names.build(&context)?;
    x509.append_extension(alt_names)?;

    x509.set_pubkey(&privkey)?;
    x509.sign(&privkey, MessageDigest::sha256())?;

    Ok((privkey, x509.build()))
}

#[cfg(test)]
mod test {
    use super::{check_cert_key_match, check_expiry, create_self_signed_cert};
    use crate::types::{CertificateInfo, EngineErrorKind};

    fn test_cert() -> (Vec<u8>, Vec<u8>) {
        let (key, cert) =
            create_self_signed_cert(&["node.example.com", "alt.example.com"], 30, None).unwrap();
        (cert.to_pem().unwrap(), key.private_key_to_pem_pkcs8().unwrap())
    }

    #[test]
    fn introspection() {
        let (cert_pem, _) = test_cert();
        let info = CertificateInfo::from_pem(&cert_pem).unwrap();

        assert!(info.subject.contains("CN = node.example.com"));
        assert_eq!(info.subject, info.issuer);
        assert_eq!(info.san, ["node.example.com", "alt.example.com"]);
        assert_eq!(info.public_key_bits, Some(4096));
        assert!(info.public_key_type.contains("rsa"));

        let fingerprint = info.fingerprint.unwrap();
        // sha256 as colon separated hex pairs
        assert_eq!(fingerprint.len(), 32 * 3 - 1);
        assert!(fingerprint
            .split(':')
            .all(|pair| pair.len() == 2 && pair.chars().all(|c| c.is_ascii_hexdigit())));

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let notbefore = info.notbefore.unwrap();
        let notafter = info.notafter.unwrap();
        assert!(notbefore <= now && now < notafter);
        // the two timestamps are taken in sequence, allow the clock to tick between them
        assert!((notafter - notbefore - 30 * 86_400).abs() <= 1);
    }

    #[test]
    fn expiry_predicate() {
        let (cert_pem, _) = test_cert();
        let info = CertificateInfo::from_pem(&cert_pem).unwrap();
        let notafter = info.notafter.unwrap();

        assert!(!check_expiry(&cert_pem, notafter).unwrap());
        assert!(check_expiry(&cert_pem, notafter + 1).unwrap());
        assert!(!info.is_expired().unwrap());
    }

    #[test]
    fn key_match() {
        let (cert_pem, key_pem) = test_cert();
        check_cert_key_match(&cert_pem, &key_pem).unwrap();

        let (_, other_key) = test_cert();
        let err = check_cert_key_match(&cert_pem, &other_key).unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineErrorKind>(),
            Some(&EngineErrorKind::KeyMismatch)
        );
    }

    #[test]
    fn key_reuse() {
        let (_, key_pem) = test_cert();
        let (_, cert) =
            create_self_signed_cert(&["reuse.example.com"], 7, Some(&key_pem)).unwrap();
        check_cert_key_match(&cert.to_pem().unwrap(), &key_pem).unwrap();
    }
}
