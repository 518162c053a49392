// orderflow/src/signature.rs

//! Gateway callback signatures: hex HMAC-SHA256 over `gateway_order_id|payment_id`
//! keyed with the gateway's shared secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str, gateway_order_id: &str, payment_id: &str) -> Option<HmacSha256> {
  let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
  mac.update(gateway_order_id.as_bytes());
  mac.update(b"|");
  mac.update(payment_id.as_bytes());
  Some(mac)
}

pub fn sign_payment(secret: &str, gateway_order_id: &str, payment_id: &str) -> String {
  mac_for(secret, gateway_order_id, payment_id)
    .map(|mac| hex::encode(mac.finalize().into_bytes()))
    .unwrap_or_default()
}

/// Constant-time check of a hex signature. Malformed hex is a mismatch.
pub fn verify_payment_signature(secret: &str, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
  let Ok(sig_bytes) = hex::decode(signature.trim()) else {
    return false;
  };
  match mac_for(secret, gateway_order_id, payment_id) {
    Some(mac) => mac.verify_slice(&sig_bytes).is_ok(),
    None => false,
  }
}
