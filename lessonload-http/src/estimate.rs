//! Approximate HTTP/1.1 wire sizes, feeding the `data_sent` / `data_received` metrics.

use super::util::{has_header, host_header_value};
use super::{Error, Result};

const CRLF: u64 = 2;

/// Bytes an HTTP/1.1 request occupies on the wire: request line, every header
/// (including the implicit `host` and `content-length` the client adds), the
/// blank line and the body.
pub(super) fn request_bytes(
    method: &http::Method,
    url: &str,
    headers: &[(String, String)],
    body_len: u64,
) -> Result<u64> {
    let parsed = url::Url::parse(url).map_err(|_| Error::InvalidUrl(url.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::UnsupportedScheme(url.to_string()));
    }

    let target = match parsed.query() {
        Some(q) => format!("{}?{q}", parsed.path()),
        None => parsed.path().to_string(),
    };

    // "POST /lessons HTTP/1.1\r\n"
    let mut total = line_bytes(&[method.as_str(), &target, "HTTP/1.1"]);

    total += headers
        .iter()
        .map(|(k, v)| header_bytes(k.as_bytes(), v.as_bytes()))
        .sum::<u64>();

    if !has_header(headers, "host")
        && let Some(host) = host_header_value(&parsed)
    {
        total += header_bytes(b"host", host.as_bytes());
    }
    if body_len != 0 && !has_header(headers, "content-length") {
        total += header_bytes(b"content-length", body_len.to_string().as_bytes());
    }

    Ok(total + CRLF + body_len)
}

pub(super) fn response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version = match version {
        http::Version::HTTP_10 => "HTTP/1.0",
        http::Version::HTTP_2 => "HTTP/2",
        http::Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/1.1",
    };

    // The reason phrase is not counted.
    let status_line = line_bytes(&[version, status.as_str()]);
    let header_total: u64 = headers
        .iter()
        .map(|(name, value)| header_bytes(name.as_str().as_bytes(), value.as_bytes()))
        .sum();

    status_line + header_total + CRLF
}

/// Space-separated tokens terminated by CRLF.
fn line_bytes(tokens: &[&str]) -> u64 {
    let text: u64 = tokens.iter().map(|t| t.len() as u64).sum();
    let spaces = tokens.len().saturating_sub(1) as u64;
    text + spaces + CRLF
}

/// "name: value\r\n"
fn header_bytes(name: &[u8], value: &[u8]) -> u64 {
    name.len() as u64 + 2 + value.len() as u64 + CRLF
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn post_with_body_counts_implicit_headers() {
        let headers = vec![("content-type".to_string(), "application/json".to_string())];
        let sent = request_bytes(
            &http::Method::POST,
            "http://localhost:3000/lessons",
            &headers,
            2,
        )
        .unwrap();

        // "POST /lessons HTTP/1.1\r\n" = 24
        // "content-type: application/json\r\n" = 32
        // "host: localhost:3000\r\n" = 22
        // "content-length: 2\r\n" = 19
        // "\r\n" + body = 4
        assert_eq!(sent, 24 + 32 + 22 + 19 + 4);
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            request_bytes(&http::Method::GET, "ftp://example.com/file", &[], 0),
            Err(Error::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn response_head_ignores_reason_phrase() {
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::CONTENT_LENGTH, http::HeaderValue::from_static("5"));

        // "HTTP/1.1 201\r\n" = 14, "content-length: 5\r\n" = 19, "\r\n" = 2
        assert_eq!(
            response_head_bytes(http::Version::HTTP_11, http::StatusCode::CREATED, &headers),
            35
        );
    }
}
