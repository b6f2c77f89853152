use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `message` under `secret`, hex-encoded.
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Signature header value for a webhook send.
///
/// The signed message is `"<timestamp>.<raw_body>"`, so a receiver can bind
/// the signature to both the payload and the send time.
pub fn sign_webhook_body(secret: &str, timestamp: i64, raw_body: &str) -> String {
    let message = format!("{}.{}", timestamp, raw_body);
    format!("sha256={}", hmac_sha256_hex(secret, &message))
}
