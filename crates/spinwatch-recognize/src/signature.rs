use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const IDENTIFY_URI: &str = "/v1/identify";
pub const DATA_TYPE: &str = "audio";
pub const SIGNATURE_VERSION: &str = "1";

/// Base64 HMAC-SHA1 over the canonical request string
/// `method\nuri\naccess_key\naudio\n1\ntimestamp`.
///
/// The signature binds the request timestamp, so it must be recomputed for
/// every request rather than cached.
pub fn sign_request(
    method: &str,
    uri: &str,
    access_key: &str,
    access_secret: &str,
    timestamp: u64,
) -> String {
    let canonical = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, uri, access_key, DATA_TYPE, SIGNATURE_VERSION, timestamp
    );

    let mut mac = HmacSha1::new_from_slice(access_secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(canonical.as_bytes());
    BASE64_STANDARD.encode(mac.finalize().into_bytes())
}
