//! 请求方向：内层请求头压缩进长度前缀块，请求体原样跟在后面。

use std::io::Write as _;

use bytes::Bytes;
use flate2::{write::DeflateEncoder, Compression};
use futures::StreamExt as _;
use http::header::{HeaderValue, CONTENT_LENGTH, USER_AGENT};
use hyper::{Body, Method, Request, Version};

use super::RelayServer;
use crate::core::errors::RelayCodecError;

/// 逐跳与元信息头，不进入压缩块。
const EXCLUDED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "accept-encoding",
    "content-length",
    "host",
];

pub(super) fn encode_request(
    server: &RelayServer,
    req: Request<Body>,
) -> Result<Request<Body>, RelayCodecError> {
    let (parts, body) = req.into_parts();

    let mut enc = DeflateEncoder::new(Vec::new(), Compression::best());
    write!(enc, "{} {} HTTP/1.1\r\n", parts.method, parts.uri)?;
    for (name, value) in parts.headers.iter() {
        if EXCLUDED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        enc.write_all(canonical_header_name(name.as_str()).as_bytes())?;
        enc.write_all(b": ")?;
        enc.write_all(value.as_bytes())?;
        enc.write_all(b"\r\n")?;
    }
    write!(enc, "X-Urlfetch-Password: {}\r\n", server.password)?;
    if server.deadline.as_secs() > 0 {
        write!(enc, "X-Urlfetch-Deadline: {}\r\n", server.deadline.as_secs())?;
    }
    let compressed = enc.finish()?;
    if compressed.len() > u16::MAX as usize {
        return Err(RelayCodecError::HeaderTooLarge(compressed.len()));
    }

    let mut framed = Vec::with_capacity(2 + compressed.len());
    framed.extend_from_slice(&(compressed.len() as u16).to_be_bytes());
    framed.extend_from_slice(&compressed);

    let content_length = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let outer_length = framed.len() as u64 + content_length;

    let outer_body = if content_length > 0 {
        let prefix =
            futures::stream::once(async move { Ok::<_, hyper::Error>(Bytes::from(framed)) });
        Body::wrap_stream(prefix.chain(body))
    } else {
        Body::from(framed)
    };

    let mut outer = Request::builder()
        .method(Method::POST)
        .uri(server.url.clone())
        .version(Version::HTTP_11)
        .body(outer_body)
        .expect("outer request parts are valid");
    outer
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(outer_length));
    if server.url.scheme_str() == Some("https") {
        // 与服务端约定的最小化 UA，勿单方面更改
        outer
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static("a"));
    }
    Ok(outer)
}

/// 压缩块里按 `Word-Word` 规范书写头名，与中继服务端的解析习惯一致。
fn canonical_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for ch in name.chars() {
        if upper {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
        upper = ch == '-';
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names_canonicalize() {
        assert_eq!(canonical_header_name("accept"), "Accept");
        assert_eq!(canonical_header_name("set-cookie"), "Set-Cookie");
        assert_eq!(canonical_header_name("x-urlfetch-password"), "X-Urlfetch-Password");
    }

    #[test]
    fn excluded_list_is_lowercase() {
        // http::HeaderName renders lowercase; the denylist must match it
        for name in EXCLUDED_HEADERS {
            assert_eq!(*name, name.to_ascii_lowercase().as_str());
        }
    }
}
