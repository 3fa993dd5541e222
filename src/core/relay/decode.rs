//! 响应方向：拆长度前缀，解压响应头块，修复被拼接的 Set-Cookie，
//! 错误状态时把压缩块内残留的正文与外层剩余字节串起来。

use std::io::Read as _;

use bytes::{Bytes, BytesMut};
use flate2::read::DeflateDecoder;
use futures::StreamExt as _;
use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Version};
use hyper::body::HttpBody as _;
use hyper::{Body, Response};

use crate::core::errors::RelayCodecError;

pub(super) async fn decode_response(
    resp: Response<Body>,
) -> Result<Response<Body>, RelayCodecError> {
    if resp.status() != StatusCode::OK {
        // 中继自身的错误页，原样透传
        return Ok(resp);
    }
    let (_outer_parts, mut body) = resp.into_parts();

    let mut buf = BytesMut::new();
    read_exact_from_body(&mut body, &mut buf, 2).await?;
    let header_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    let _ = buf.split_to(2);
    read_exact_from_body(&mut body, &mut buf, header_len).await?;
    let block = buf.split_to(header_len);

    let mut head = Vec::new();
    DeflateDecoder::new(&block[..])
        .read_to_end(&mut head)
        .map_err(|err| RelayCodecError::Malformed(format!("inflate header block: {err}")))?;

    let (status, mut headers, head_len) = parse_response_head(&head)?;
    rejoin_set_cookie(&mut headers);

    // 压缩块内跟在响应头后面的字节：服务端把错误正文塞在这里
    let inner_tail = &head[head_len..];
    let remainder = buf.freeze();

    let mut chunks: Vec<Bytes> = Vec::new();
    if status.as_u16() >= 400 && !inner_tail.is_empty() {
        chunks.push(Bytes::copy_from_slice(inner_tail));
    }
    if !remainder.is_empty() {
        chunks.push(remainder);
    }
    let prefix = futures::stream::iter(chunks.into_iter().map(Ok::<_, hyper::Error>));
    let new_body = Body::wrap_stream(prefix.chain(body));

    let mut out = Response::builder()
        .status(status)
        .version(Version::HTTP_11)
        .body(new_body)
        .expect("decoded response parts are valid");
    *out.headers_mut() = headers;
    Ok(out)
}

async fn read_exact_from_body(
    body: &mut Body,
    buf: &mut BytesMut,
    len: usize,
) -> Result<(), RelayCodecError> {
    while buf.len() < len {
        match body.data().await {
            Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
            Some(Err(err)) => {
                return Err(RelayCodecError::Malformed(format!("read relay frame: {err}")))
            }
            None => {
                return Err(RelayCodecError::Malformed(
                    "relay response ended inside frame".into(),
                ))
            }
        }
    }
    Ok(())
}

fn parse_response_head(head: &[u8]) -> Result<(StatusCode, HeaderMap, usize), RelayCodecError> {
    let mut storage = [httparse::EMPTY_HEADER; 64];
    let mut parsed = httparse::Response::new(&mut storage);
    let consumed = match parsed.parse(head) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => {
            return Err(RelayCodecError::Malformed("truncated response head".into()))
        }
        Err(err) => {
            return Err(RelayCodecError::Malformed(format!(
                "parse response head: {err}"
            )))
        }
    };

    let code = parsed
        .code
        .ok_or_else(|| RelayCodecError::Malformed("response head missing status".into()))?;
    let status = StatusCode::from_u16(code)
        .map_err(|_| RelayCodecError::Malformed(format!("bad status code {code}")))?;

    let mut headers = HeaderMap::new();
    for h in parsed.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| RelayCodecError::Malformed(format!("bad header name {:?}", h.name)))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|_| RelayCodecError::Malformed(format!("bad value for {:?}", h.name)))?;
        headers.append(name, value);
    }
    Ok((status, headers, consumed))
}

/// 多个 Set-Cookie 被朴素地用 ", " 连接后抵达；cookie 属性里的日期也含
/// 逗号，不能直接切。规则：首段总是新 cookie，后续段首个 `;` 之前不含
/// `=` 时视为上一个 cookie 的续写，否则开启新 cookie。拆出多于一个才替换。
fn rejoin_set_cookie(headers: &mut HeaderMap) {
    let joined: Vec<HeaderValue> = headers.get_all(SET_COOKIE).iter().cloned().collect();
    if joined.len() != 1 {
        return;
    }
    let raw = match joined[0].to_str() {
        Ok(s) => s,
        Err(_) => return,
    };

    let mut cookies: Vec<String> = Vec::new();
    for (i, part) in raw.split(", ").enumerate() {
        let starts_new = i == 0
            || part
                .split(';')
                .next()
                .map(|lead| lead.contains('='))
                .unwrap_or(false);
        if starts_new {
            cookies.push(part.to_string());
        } else if let Some(last) = cookies.last_mut() {
            last.push_str(", ");
            last.push_str(part);
        }
    }

    if cookies.len() > 1 {
        headers.remove(SET_COOKIE);
        for cookie in cookies {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.append(SET_COOKIE, value);
            }
        }
    }
}
