//! Payload classification
//!
//! Only two shapes count as a customer reference: an absolute URL carrying a
//! `customer` query parameter, and a bare 8-4-4-4-12 hex identifier.
//! Everything else is unrecognized, so arbitrary codes never check anyone in.

use serde::Serialize;
use url::Url;

/// Query parameter holding the customer reference in URL payloads
pub const CUSTOMER_PARAM: &str = "customer";

/// Typed interpretation of a decoded string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ClassifiedPayload {
    CustomerRef(String),
    Unrecognized(String),
}

impl ClassifiedPayload {
    pub fn customer_ref(&self) -> Option<&str> {
        match self {
            Self::CustomerRef(id) => Some(id),
            Self::Unrecognized(_) => None,
        }
    }

    pub fn is_customer_ref(&self) -> bool {
        matches!(self, Self::CustomerRef(_))
    }
}

/// Classify a decoded QR payload
///
/// The identifier must match the raw text exactly. URL parsing tolerates
/// surrounding whitespace the way `Url::parse` does.
pub fn classify(raw: &str) -> ClassifiedPayload {
    if let Some(id) = customer_from_url(raw) {
        return ClassifiedPayload::CustomerRef(id);
    }
    if is_canonical_id(raw) {
        return ClassifiedPayload::CustomerRef(raw.to_string());
    }
    ClassifiedPayload::Unrecognized(raw.to_string())
}

fn customer_from_url(text: &str) -> Option<String> {
    let url = Url::parse(text).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == CUSTOMER_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// 8-4-4-4-12 hex groups, case-insensitive
pub fn is_canonical_id(text: &str) -> bool {
    const HYPHENS: [usize; 4] = [8, 13, 18, 23];

    text.len() == 36
        && text.bytes().enumerate().all(|(i, b)| {
            if HYPHENS.contains(&i) {
                b == b'-'
            } else {
                b.is_ascii_hexdigit()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(id: &str) -> ClassifiedPayload {
        ClassifiedPayload::CustomerRef(id.to_string())
    }

    fn unrecognized(raw: &str) -> ClassifiedPayload {
        ClassifiedPayload::Unrecognized(raw.to_string())
    }

    #[test]
    fn test_classify_table() {
        let cases = [
            ("https://app.example/scan?customer=abc123", customer("abc123")),
            (
                "3fa85f64-5717-4562-b3fc-2c963f66afa6",
                customer("3fa85f64-5717-4562-b3fc-2c963f66afa6"),
            ),
            ("https://app.example/scan", unrecognized("https://app.example/scan")),
            ("random-text", unrecognized("random-text")),
        ];
        for (raw, expected) in cases {
            assert_eq!(classify(raw), expected, "classify({:?})", raw);
        }
    }

    #[test]
    fn test_url_variants() {
        assert_eq!(
            classify("http://x.test/?a=1&customer=42&customer=43"),
            customer("42")
        );
        assert_eq!(
            classify("https://x.test/c?customer=J%C3%BCrgen%20K"),
            customer("Jürgen K")
        );
        assert_eq!(
            classify("https://x.test/?customer="),
            unrecognized("https://x.test/?customer=")
        );
        assert_eq!(
            classify("https://x.test/?Customer=1"),
            unrecognized("https://x.test/?Customer=1")
        );
        // relative URLs are not absolute
        assert_eq!(
            classify("/scan?customer=abc"),
            unrecognized("/scan?customer=abc")
        );
        assert_eq!(classify("kiosk:checkin?customer=7"), customer("7"));
    }

    #[test]
    fn test_canonical_id_shape() {
        assert!(is_canonical_id("3FA85F64-5717-4562-B3FC-2C963F66AFA6"));
        assert!(!is_canonical_id("3fa85f64-5717-4562-b3fc-2c963f66afa"));
        assert!(!is_canonical_id("3fa85f64-5717-4562-b3fc-2c963f66afa6a"));
        assert!(!is_canonical_id("3fa85f645-717-4562-b3fc-2c963f66afa6"));
        assert!(!is_canonical_id("3fa85f64-5717-4562-b3fc-2c963f66afg6"));
        assert!(!is_canonical_id("3fa85f64_5717_4562_b3fc_2c963f66afa6"));
    }

    #[test]
    fn test_identifier_must_match_exactly() {
        assert_eq!(
            classify("3fa85f64-5717-4562-b3fc-2c963f66afa6\n"),
            unrecognized("3fa85f64-5717-4562-b3fc-2c963f66afa6\n")
        );
        assert_eq!(
            classify(" 3fa85f64-5717-4562-b3fc-2c963f66afa6"),
            unrecognized(" 3fa85f64-5717-4562-b3fc-2c963f66afa6")
        );
        assert_eq!(
            classify("https://x.test/?customer=abc\n"),
            customer("abc")
        );
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(customer("abc")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "customer_ref", "value": "abc"}));
    }
}
