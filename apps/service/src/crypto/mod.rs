/// Cryptographic operations for the uptimer service.
///
/// Webhook request signing lives here; receivers verify the signature with
/// the shared secret named by the channel's `secret_ref`.
pub mod signing;

pub use signing::sign_webhook_body;
