//! MIME multipart bodies and the HTTP messages embedded in batch parts.
use std::convert::Infallible;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream;

use crate::http::transport::{TransportRequest, TransportResponse};
use crate::http::Error;

const CRLF: &[u8] = b"\r\n";

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Part {
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Part {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            headers: vec![],
            body: body.into(),
        }
    }

    pub fn header(mut self, key: &str, value: impl ToString) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// A boundary unlikely to appear in any part.
pub(crate) fn boundary() -> String {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    format!("===============storage_rpc_{nanos:x}==")
}

/// Extracts the boundary parameter of a `multipart/*` content type.
pub(crate) fn boundary_of(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.to_ascii_lowercase().starts_with("multipart/") {
        return None;
    }
    params.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

pub(crate) fn encode(boundary: &str, parts: &[Part]) -> Bytes {
    let mut buf = BytesMut::new();
    for part in parts {
        buf.put_slice(format!("--{boundary}\r\n").as_bytes());
        put_headers(&mut buf, &part.headers);
        buf.put_slice(CRLF);
        buf.put_slice(&part.body);
        buf.put_slice(CRLF);
    }
    buf.put_slice(format!("--{boundary}--\r\n").as_bytes());
    buf.freeze()
}

/// Splits a `multipart/*` body into its parts. Part header names come back lowercased.
pub(crate) async fn decode(boundary: &str, body: Bytes) -> Result<Vec<Part>, Error> {
    let stream = stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut parts = vec![];
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let headers = field
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = field.bytes().await.map_err(malformed)?;
        parts.push(Part { headers, body });
    }
    if parts.is_empty() {
        return Err(Error::ProtocolInternal("multipart body has no parts".to_string()));
    }
    Ok(parts)
}

fn malformed(e: multer::Error) -> Error {
    Error::ProtocolInternal(format!("malformed multipart body: {e}"))
}

/// The embedded form of a request inside a batch part.
pub(crate) fn encode_request(request: &TransportRequest) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_slice(format!("{} {} HTTP/1.1\r\n", request.method, request.path_and_query()).as_bytes());
    put_headers(&mut buf, &request.headers);
    if !request.body.is_empty() {
        buf.put_slice(format!("Content-Length: {}\r\n", request.body.len()).as_bytes());
    }
    buf.put_slice(CRLF);
    buf.put_slice(&request.body);
    buf.freeze()
}

#[cfg(test)]
pub(crate) fn decode_request(bytes: &[u8]) -> Result<TransportRequest, Error> {
    use reqwest::Method;

    let (head, body) = split_head(bytes)?;
    let mut lines = head.lines();
    let line = lines.next().unwrap_or_default();
    let mut tokens = line.split_whitespace();
    let (Some(method), Some(target)) = (tokens.next(), tokens.next()) else {
        return Err(Error::ProtocolInternal(format!("malformed request line: {line}")));
    };
    let method = Method::from_bytes(method.as_bytes()).map_err(|e| Error::ProtocolInternal(e.to_string()))?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let mut request = TransportRequest::new(method, path);
    request.query = url::form_urlencoded::parse(query.as_bytes()).into_owned().collect();
    request.headers = parse_headers(lines)
        .into_iter()
        .filter(|(k, _)| !k.eq_ignore_ascii_case("content-length"))
        .collect();
    Ok(request.body(Bytes::copy_from_slice(body)))
}

#[cfg(test)]
pub(crate) fn encode_response(response: &TransportResponse) -> Bytes {
    use reqwest::StatusCode;

    let reason = StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let mut buf = BytesMut::new();
    buf.put_slice(format!("HTTP/1.1 {} {}\r\n", response.status, reason).as_bytes());
    put_headers(&mut buf, &response.headers);
    buf.put_slice(format!("Content-Length: {}\r\n", response.body.len()).as_bytes());
    buf.put_slice(CRLF);
    buf.put_slice(&response.body);
    buf.freeze()
}

/// Parses the HTTP response embedded in a batch part.
pub(crate) fn decode_response(bytes: &[u8]) -> Result<TransportResponse, Error> {
    let (head, body) = split_head(bytes)?;
    let mut lines = head.lines();
    let line = lines.next().unwrap_or_default();
    let status = line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| Error::ProtocolInternal(format!("malformed status line: {line}")))?;
    let headers = parse_headers(lines);
    Ok(TransportResponse {
        status,
        headers,
        body: Bytes::copy_from_slice(body),
    })
}

fn put_headers(buf: &mut BytesMut, headers: &[(String, String)]) {
    for (key, value) in headers {
        buf.put_slice(format!("{key}: {value}\r\n").as_bytes());
    }
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<(String, String)> {
    lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Splits a message at its first empty line.
fn split_head(bytes: &[u8]) -> Result<(&str, &[u8]), Error> {
    let (head, body) = if bytes.starts_with(CRLF) {
        (&bytes[..0], &bytes[CRLF.len()..])
    } else {
        match find(bytes, b"\r\n\r\n", 0) {
            Some(i) => (&bytes[..i], &bytes[i + 4..]),
            None => (bytes, &bytes[bytes.len()..]),
        }
    };
    let head = std::str::from_utf8(head).map_err(|e| Error::ProtocolInternal(e.to_string()))?;
    Ok((head, body))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use reqwest::Method;

    use crate::http::multipart::{
        boundary_of, decode, decode_request, decode_response, encode, encode_request, encode_response, Part,
    };
    use crate::http::transport::{TransportRequest, TransportResponse};

    #[test]
    fn test_boundary_of() {
        assert_eq!(
            boundary_of("multipart/mixed; boundary=batch_abc"),
            Some("batch_abc".to_string())
        );
        assert_eq!(
            boundary_of(r#"multipart/related; charset=utf-8; boundary="x y""#),
            Some("x y".to_string())
        );
        assert_eq!(boundary_of("application/json"), None);
    }

    #[tokio::test]
    async fn test_binary_parts() {
        let parts = vec![
            Part::new(&b"{\"name\":\"a\"}"[..]).header("Content-Type", "application/json"),
            Part::new(vec![0u8, 13, 10, 45, 45, 255]).header("Content-Type", "application/octet-stream"),
            Part::new(Bytes::new()).header("Content-ID", "<empty>"),
        ];
        let body = encode("b0undary", &parts);
        let decoded = decode("b0undary", body).await.unwrap();
        assert_eq!(decoded.len(), 3);
        for (decoded, part) in decoded.iter().zip(&parts) {
            assert_eq!(decoded.body, part.body);
            let (key, value) = &part.headers[0];
            assert_eq!(decoded.header_value(key), Some(value.as_str()));
        }
    }

    #[tokio::test]
    async fn test_decode_service_response() {
        let body = "--batch_x\r\nContent-Type: application/http\r\nContent-ID: <response-1>\r\n\r\nHTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n\r\n--batch_x\r\nContent-Type: application/http\r\nContent-ID: <response-2>\r\n\r\nHTTP/1.1 404 Not Found\r\nContent-Type: application/json\r\n\r\n{\"error\":{\"code\":404,\"message\":\"No such object\"}}\r\n--batch_x--\r\n";
        let parts = decode("batch_x", Bytes::from_static(body.as_bytes())).await.unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].header_value("content-id"), Some("<response-2>"));

        let first = decode_response(&parts[0].body).unwrap();
        assert_eq!(first.status, 204);
        assert!(first.body.is_empty());
        let second = decode_response(&parts[1].body).unwrap();
        assert_eq!(second.status, 404);
        assert_eq!(second.header_value("content-type"), Some("application/json"));
    }

    #[test]
    fn test_embedded_messages() {
        let request = TransportRequest::new(Method::PATCH, "/storage/v1/b/b/o/o")
            .query("ifMetagenerationMatch", 3)
            .header("Content-Type", "application/json")
            .body(&b"{}"[..]);
        let decoded = decode_request(&encode_request(&request)).unwrap();
        assert_eq!(decoded, request);

        let response = TransportResponse::new(200).body(&b"{\"name\":\"o\"}"[..]);
        let decoded = decode_response(&encode_response(&response)).unwrap();
        assert_eq!(decoded.status, 200);
        assert_eq!(decoded.body, response.body);
    }

    #[tokio::test]
    async fn test_decode_without_boundary() {
        assert!(decode("x", Bytes::from_static(b"not multipart")).await.is_err());
    }
}
