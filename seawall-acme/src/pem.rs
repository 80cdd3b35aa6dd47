//! PEM handling helpers (RFC 7468 textual framing).

use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::{DecodePaddingMode, Engine as _};

use crate::Error;

const DECODE: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A single decoded PEM block.
pub struct PemBlock {
    /// The label from the `-----BEGIN <LABEL>-----` line.
    pub label: String,

    /// The decoded DER contents.
    pub der: Vec<u8>,
}

fn begin_label(line: &str) -> Option<&str> {
    line.strip_prefix("-----BEGIN ")?.strip_suffix("-----")
}

fn end_label(line: &str) -> Option<&str> {
    line.strip_prefix("-----END ")?.strip_suffix("-----")
}

/// Split (possibly concatenated) PEM data into its blocks.
///
/// Trailing whitespace on lines is permitted, data outside of the `BEGIN`/`END` framing is
/// ignored. Fails on unterminated or mismatched framing and on bad base64 contents.
pub fn split_blocks(pem: &str) -> Result<Vec<PemBlock>, Error> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in pem.lines() {
        let line = line.trim_end();
        match current.take() {
            None => {
                if let Some(label) = begin_label(line) {
                    current = Some((label.to_string(), String::new()));
                }
            }
            Some((label, mut base64_data)) => {
                if let Some(end) = end_label(line) {
                    if end != label {
                        return Err(Error::Pem(format!(
                            "PEM block started with label {label:?} but ended with {end:?}"
                        )));
                    }
                    let der = DECODE
                        .decode(base64_data.as_bytes())
                        .map_err(|err| Error::Pem(format!("bad base64 in PEM block: {err}")))?;
                    blocks.push(PemBlock { label, der });
                } else {
                    base64_data.push_str(line);
                    current = Some((label, base64_data));
                }
            }
        }
    }

    if let Some((label, _)) = current {
        return Err(Error::Pem(format!("unterminated PEM block with label {label:?}")));
    }

    Ok(blocks)
}

/// Extract the DER contents of the *first* PEM block.
pub fn pem_to_der(pem: &str) -> Result<Vec<u8>, Error> {
    let mut blocks = split_blocks(pem)?;
    if blocks.is_empty() {
        return Err(Error::Pem("no PEM block found".to_string()));
    }
    Ok(blocks.remove(0).der)
}

/// Wrap DER data in PEM framing with the given label, base64 broken at 64 columns.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let encoded = STANDARD.encode(der);
    let mut out = format!("-----BEGIN {label}-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        // chunks of valid base64 are always utf-8
        out.push_str(std::str::from_utf8(chunk).unwrap());
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// Validate that `pem` consists of well-formed PEM data with the expected label.
///
/// With `allow_multiple` set, any positive number of concatenated blocks is accepted (eg. a
/// certificate chain), otherwise exactly one block is required.
pub fn check_pem(pem: &str, label: &str, allow_multiple: bool) -> Result<(), Error> {
    let blocks = split_blocks(pem)?;
    match blocks.len() {
        0 => return Err(Error::Pem(format!("no {label:?} PEM block found"))),
        1 => (),
        _ if allow_multiple => (),
        n => return Err(Error::Pem(format!("expected a single PEM block, found {n}"))),
    }
    for block in blocks {
        if block.label != label {
            return Err(Error::Pem(format!(
                "expected PEM label {:?}, found {:?}",
                label, block.label
            )));
        }
    }
    Ok(())
}
