//! Bearer token validation and expiry decoding.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};

/// Placeholder strings that older dashboard builds wrote into storage when
/// the login response had no token.
const SENTINELS: [&str; 2] = ["undefined", "null"];

/// Returns the token if it is usable as a credential.
pub fn sanitize(raw: &str) -> Option<&str> {
    if raw.trim().is_empty() || SENTINELS.contains(&raw) {
        None
    } else {
        Some(raw)
    }
}

/// Expiry from the `exp` claim, if the token is a decodable JWT.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?;
    let secs = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;
    DateTime::from_timestamp(secs, 0)
}
