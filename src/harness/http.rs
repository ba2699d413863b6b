//! Minimal HTTP/1.0 model.
//!
//! Just enough of the protocol for the simulation: a request line with the
//! object size folded into the query string, and a response whose body is
//! filler of exactly that size. The response completion predicate is the
//! one handed to transport streams.

use bytes::Bytes;

/// Body size assumed when a request carries no `size=` parameter.
pub const DEFAULT_RESPONSE_SIZE: usize = 1024;

/// Build an HTTP/1.0 GET request for `url` asking for `size` body bytes.
pub fn format_request(url: &str, size: u32) -> Bytes {
    // Trace URLs sometimes carry a full "METHOD path VERSION" line; keep
    // just the path in that case.
    let mut parts = url.split_whitespace();
    let path = match (parts.next(), parts.next(), parts.next()) {
        (Some(_method), Some(path), Some(_version)) => path,
        _ => url,
    };

    Bytes::from(format!(
        "GET {path}?size={size} HTTP/1.0\r\n\
         Host: example.com\r\n\
         User-Agent: sst-sim-client\r\n\
         \r\n"
    ))
}

/// Build an HTTP/1.0 response for `request_line`, with a body of the
/// requested size filled with `'X'`.
pub fn format_response(request_line: &str) -> Bytes {
    let size = request_size(request_line).unwrap_or(DEFAULT_RESPONSE_SIZE);

    let mut response = format!(
        "HTTP/1.0 200 OK\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {size}\r\n\
         \r\n"
    );
    response.push_str(&"X".repeat(size));
    Bytes::from(response)
}

/// Parse the `size=` query parameter out of a request line.
pub fn request_size(request_line: &str) -> Option<usize> {
    let rest = &request_line[request_line.find("size=")? + 5..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Expected wire size of the response for an object of `size` bytes.
pub fn response_wire_size(size: u32) -> usize {
    format!(
        "HTTP/1.0 200 OK\r\nContent-Type: text/html\r\nContent-Length: {size}\r\n\r\n"
    )
    .len()
        + size as usize
}

/// Whether an inbound request buffer holds the full request head.
pub fn request_complete(buf: &[u8]) -> bool {
    find_header_end(buf).is_some()
}

/// Whether an inbound response buffer is complete: headers terminated and,
/// when a Content-Length is present, that many body bytes buffered.
pub fn response_complete(buf: &[u8]) -> bool {
    let Some(body_start) = find_header_end(buf) else {
        return false;
    };

    match content_length(&buf[..body_start]) {
        Some(expected) => buf.len() - body_start >= expected,
        None => true,
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn content_length(head: &[u8]) -> Option<usize> {
    let head = std::str::from_utf8(head).ok()?;
    for line in head.split("\r\n") {
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

/// [`crate::peer::RequestHandler`] producing the filler responses above.
pub struct HttpHandler;

impl crate::peer::RequestHandler for HttpHandler {
    fn respond(&mut self, request_line: &str) -> Bytes {
        format_response(request_line)
    }
}
