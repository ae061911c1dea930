use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

fn mac_for(payload: &str, secret: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    mac
}

/// Signs a webhook body, producing the `X-Webhook-Signature` value `sha256=<hex>`.
///
/// ```
/// use notifier::infrastructure::providers::webhook_signature::sign_payload;
/// let signature = sign_payload(r#"{"subject":"Build"}"#, "secret");
/// assert!(signature.starts_with("sha256="));
/// ```
pub fn sign_payload(payload: &str, secret: &str) -> String {
    let digest = mac_for(payload, secret).finalize().into_bytes();
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest))
}

/// Checks a received signature in constant time. Receivers use this to
/// authenticate deliveries.
pub fn verify_signature(payload: &str, signature: &str, secret: &str) -> bool {
    let Some(hex_part) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_part) else {
        return false;
    };
    mac_for(payload, secret).verify_slice(&expected).is_ok()
}
