//! Opaque forward-only page tokens.
//!
//! A token is the base64-encoded last-seen sort key of the previous
//! page. Tokens round-trip deterministically and are only meaningful
//! for the sort order that produced them.

use base64::Engine as _;
use icefloe_rest::{catalog::UNIT_SEPARATOR, ErrorModel};

pub(crate) fn encode_page_token(last_seen: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(last_seen.as_bytes())
}

pub(crate) fn decode_page_token(token: &str) -> Result<String, ErrorModel> {
    let invalid = |source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>| {
        ErrorModel::bad_request(
            format!("Invalid page token: {token}"),
            "BadRequestException",
            source,
        )
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(token)
        .map_err(|e| invalid(Some(Box::new(e))))?;
    String::from_utf8(bytes).map_err(|e| invalid(Some(Box::new(e))))
}

/// Namespace list cursors encode the full label path.
pub(crate) fn encode_namespace_token(levels: &[String]) -> String {
    encode_page_token(&levels.join(&UNIT_SEPARATOR.to_string()))
}

pub(crate) fn decode_namespace_token(token: &str) -> Result<Vec<String>, ErrorModel> {
    Ok(decode_page_token(token)?
        .split(UNIT_SEPARATOR)
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let token = encode_page_token("orders_2024");
        assert_eq!(decode_page_token(&token).unwrap(), "orders_2024");
    }

    #[test]
    fn test_namespace_roundtrip() {
        let levels = vec!["acct".to_string(), "tax".to_string()];
        let token = encode_namespace_token(&levels);
        assert_eq!(decode_namespace_token(&token).unwrap(), levels);
    }

    #[test]
    fn test_malformed_token_is_bad_request() {
        let err = decode_page_token("not-base64!!").unwrap_err();
        assert_eq!(err.code, 400);
        assert_eq!(err.r#type, "BadRequestException");
    }

    #[test]
    fn test_non_utf8_token_is_bad_request() {
        let token = base64::engine::general_purpose::STANDARD.encode([0xff, 0xfe]);
        let err = decode_page_token(&token).unwrap_err();
        assert_eq!(err.code, 400);
    }

    #[test]
    fn test_tokens_are_deterministic() {
        assert_eq!(encode_page_token("t1"), encode_page_token("t1"));
    }
}
