//! Download tokens: base64 of a small JSON object such as `{"id":42}`.
//! Tokens are opaque to visitors but are not signed.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde_json::Value;

use crate::errors::{Error, Result};

pub fn encode(id: i64) -> String {
    STANDARD.encode(serde_json::json!({ "id": id }).to_string())
}

/// Content id carried by `token`.
///
/// Standard and URL-safe alphabets are accepted, padded or not. `id` may be a
/// JSON number or a numeric string; it must be positive. Non-integer numbers
/// such as `42.0` are rejected, since tokens are only ever issued for integer ids.
pub fn decode(token: &str) -> Result<i64> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::validation("missing token"));
    }

    let bytes = STANDARD
        .decode(token)
        .or_else(|_| URL_SAFE.decode(token))
        .or_else(|_| STANDARD_NO_PAD.decode(token))
        .or_else(|_| URL_SAFE_NO_PAD.decode(token))?;

    let obj: Value = serde_json::from_slice(&bytes)?;
    let id = match obj.get("id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    match id {
        Some(id) if id > 0 => Ok(id),
        _ => Err(Error::validation("token missing id")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode() {
        let token = encode(42);
        assert_eq!(token, "eyJpZCI6NDJ9");
        assert_eq!(decode(&token).unwrap(), 42);
    }

    #[test]
    fn rejects_fractional_ids() {
        for body in [r#"{"id":42.0}"#, r#"{"id":4.2e1}"#, r#"{"id":1.5}"#] {
            let err = decode(&STANDARD.encode(body)).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{}", body);
        }
    }

    #[test]
    fn accepts_string_ids_and_unpadded_urlsafe() {
        let token = URL_SAFE_NO_PAD.encode(r#"{"id":"7","t":"x?"}"#);
        assert_eq!(decode(&token).unwrap(), 7);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode("not base64!!"), Err(Error::Validation(_))));
        assert!(matches!(decode(""), Err(Error::Validation(_))));
        // valid base64, not JSON
        assert!(matches!(decode(&STANDARD.encode("hello")), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_missing_or_zero_id() {
        assert!(decode(&STANDARD.encode(r#"{"name":"x"}"#)).is_err());
        assert!(decode(&STANDARD.encode(r#"{"id":0}"#)).is_err());
        assert!(decode(&STANDARD.encode(r#"{"id":"abc"}"#)).is_err());
    }
}
