//! Header block serialization for execution records

use reqwest::header::HeaderMap;

/// Maximum number of bytes kept from the response headers
pub const RESPONSE_HEADERS_BYTES_LIMIT: usize = 1024;

/// Maximum number of bytes kept from the response body
pub const RESPONSE_BODY_BYTES_LIMIT: usize = 1024;

/// Canonical form of a header name, e.g. `x-forge-webhook-id` becomes `X-Forge-Webhook-Id`
pub fn canonical_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Serialize headers as `Name: value\r\n` lines sorted by name
pub fn write_headers(headers: &HeaderMap) -> String {
    let mut lines: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| {
            (
                canonical_name(name.as_str()),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    // stable sort keeps multiple values of one header in order
    lines.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::new();
    for (name, value) in lines {
        out.push_str(&name);
        out.push_str(": ");
        out.push_str(&value);
        out.push_str("\r\n");
    }
    out
}

/// Keep at most `limit` bytes of text.
///
/// Invalid sequences become U+FFFD, which can grow the text, so the result is cut
/// again on a char boundary.
pub fn truncate_bytes(bytes: &[u8], limit: usize) -> String {
    let end = bytes.len().min(limit);
    let mut text = String::from_utf8_lossy(&bytes[..end]).into_owned();
    if text.len() > limit {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("content-type"), "Content-Type");
        assert_eq!(canonical_name("x-forge-webhook-parent-id"), "X-Forge-Webhook-Parent-Id");
        assert_eq!(canonical_name("ETAG"), "Etag");
    }

    #[test]
    fn test_write_headers_sorted() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("Forge/1.0"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.append(
            HeaderName::from_static("x-multi"),
            HeaderValue::from_static("a"),
        );
        headers.append(
            HeaderName::from_static("x-multi"),
            HeaderValue::from_static("b"),
        );

        assert_eq!(
            write_headers(&headers),
            "Content-Type: application/json\r\nUser-Agent: Forge/1.0\r\nX-Multi: a\r\nX-Multi: b\r\n"
        );
    }

    #[test]
    fn test_truncate_at_limit() {
        let long = vec![b'a'; RESPONSE_BODY_BYTES_LIMIT + 500];
        assert_eq!(truncate_bytes(&long, RESPONSE_BODY_BYTES_LIMIT).len(), 1024);

        let exact = vec![b'b'; RESPONSE_BODY_BYTES_LIMIT];
        assert_eq!(truncate_bytes(&exact, RESPONSE_BODY_BYTES_LIMIT).len(), 1024);

        assert_eq!(truncate_bytes(b"short", RESPONSE_BODY_BYTES_LIMIT), "short");
    }

    #[test]
    fn test_truncate_splits_multibyte_char() {
        let mut bytes = vec![b'a'; RESPONSE_BODY_BYTES_LIMIT - 1];
        bytes.extend_from_slice("é".as_bytes());

        let text = truncate_bytes(&bytes, RESPONSE_BODY_BYTES_LIMIT);
        assert!(text.len() <= RESPONSE_BODY_BYTES_LIMIT);
        assert!(text.starts_with("aaa"));
    }

    #[test]
    fn test_truncate_invalid_utf8_stays_within_limit() {
        let bytes = vec![0xff; RESPONSE_BODY_BYTES_LIMIT];

        let text = truncate_bytes(&bytes, RESPONSE_BODY_BYTES_LIMIT);
        assert!(text.len() <= RESPONSE_BODY_BYTES_LIMIT);
        assert!(text.chars().all(|c| c == char::REPLACEMENT_CHARACTER));
        assert!(!text.is_empty());
    }
}
