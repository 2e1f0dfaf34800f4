use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// What to do with a request that carries no signature header while a secret
/// is configured.
///
/// The task webhook is signed by the remote tracker and rejects unsigned
/// requests. The artifact endpoint is called by a system that never signs,
/// so it accepts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSignaturePolicy {
    Reject,
    Accept,
}

pub fn compute_signature_hex(body: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies an HMAC-SHA256 signature over the raw request body.
///
/// A blank or absent secret disables verification. The header is taken as raw
/// bytes, so a value that is not visible ASCII is compared (and fails) rather
/// than being mistaken for a missing header. It may carry an optional
/// `sha256=` prefix; hex case is ignored.
pub fn verify(
    raw_body: &[u8],
    header_signature: Option<&[u8]>,
    secret: Option<&str>,
    missing: MissingSignaturePolicy,
) -> bool {
    let secret = match secret.map(str::trim).filter(|s| !s.is_empty()) {
        Some(secret) => secret,
        None => return true,
    };

    let provided = match header_signature
        .map(<[u8]>::trim_ascii)
        .filter(|s| !s.is_empty())
    {
        Some(sig) => sig,
        None => return missing == MissingSignaturePolicy::Accept,
    };
    let provided = provided
        .strip_prefix(b"sha256=".as_slice())
        .unwrap_or(provided)
        .to_ascii_lowercase();

    let expected = compute_signature_hex(raw_body, secret);
    expected.as_bytes().ct_eq(&provided).unwrap_u8() == 1
}
