//! Minimal HTTP/1.1 framing: request encoding, response head parsing, and
//! body decoding for `Content-Length`, chunked, and close-delimited bodies.

use std::fmt::Write as _;

use url::Url;

use crate::error::{DownloadError, DownloadResult};

/// Largest response head accepted.
pub(crate) const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Longest chunk-size or trailer line accepted.
const MAX_LINE_BYTES: usize = 4096;

/// Serialize a request. GET without a body, POST with one.
pub(crate) fn encode_request(
    url: &Url,
    body: Option<&[u8]>,
    headers: &[(String, String)],
    user_agent: &str,
) -> Vec<u8> {
    let method = if body.is_some() { "POST" } else { "GET" };

    let mut target = url.path().to_string();
    if target.is_empty() {
        target.push('/');
    }
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let host = url.host_str().unwrap_or_default();
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut head = String::new();
    let _ = write!(head, "{method} {target} HTTP/1.1\r\n");
    let _ = write!(head, "Host: {host}\r\n");
    let _ = write!(head, "User-Agent: {user_agent}\r\n");
    head.push_str("Accept: */*\r\n");
    head.push_str("Connection: close\r\n");
    if let Some(body) = body {
        let _ = write!(head, "Content-Length: {}\r\n", body.len());
    }
    for (name, value) in headers {
        let _ = write!(head, "{name}: {value}\r\n");
    }
    head.push_str("\r\n");

    let mut out = head.into_bytes();
    if let Some(body) = body {
        out.extend_from_slice(body);
    }
    out
}

/// Parsed status line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Headers in arrival order.
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// First header named `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parsed `Content-Length`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::MalformedResponse`] if it is not a number.
    pub fn content_length(&self) -> DownloadResult<Option<u64>> {
        self.header("content-length")
            .map(|v| {
                v.trim().parse::<u64>().map_err(|_| {
                    DownloadError::MalformedResponse(format!("bad Content-Length {v:?}"))
                })
            })
            .transpose()
    }

    /// Whether the body uses chunked transfer coding.
    #[must_use]
    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .and_then(|v| v.rsplit(',').next())
            .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
    }

    /// Whether the status is informational (1xx).
    #[must_use]
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }
}

/// Try to parse a response head from the start of `buf`.
///
/// Returns the head and the number of bytes it occupied, or `None` if more
/// bytes are needed.
pub(crate) fn parse_head(buf: &[u8]) -> DownloadResult<Option<(ResponseHead, usize)>> {
    let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        if buf.len() > MAX_HEAD_BYTES {
            return Err(DownloadError::MalformedResponse(
                "response head too large".into(),
            ));
        }
        return Ok(None);
    };
    if end > MAX_HEAD_BYTES {
        return Err(DownloadError::MalformedResponse(
            "response head too large".into(),
        ));
    }

    let text = std::str::from_utf8(&buf[..end])
        .map_err(|_| DownloadError::MalformedResponse("response head is not UTF-8".into()))?;
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(DownloadError::MalformedResponse(format!(
            "bad status line {status_line:?}"
        )));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (100..1000).contains(code))
        .ok_or_else(|| {
            DownloadError::MalformedResponse(format!("bad status line {status_line:?}"))
        })?;
    let reason = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line.split_once(':').ok_or_else(|| {
            DownloadError::MalformedResponse(format!("bad header line {line:?}"))
        })?;
        if name.is_empty() || name.starts_with([' ', '\t']) {
            return Err(DownloadError::MalformedResponse(format!(
                "bad header line {line:?}"
            )));
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    Ok(Some((
        ResponseHead {
            status,
            reason,
            headers,
        },
        end.saturating_add(4),
    )))
}

/// Body framing for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BodyDecoder {
    /// Fixed length; this many bytes still to come.
    Length { remaining: u64 },
    /// Chunked transfer coding.
    Chunked(ChunkState),
    /// Ends when the connection closes.
    UntilClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChunkState {
    Size { line: Vec<u8> },
    Data { remaining: u64 },
    DataEnd { saw_cr: bool },
    Trailer { line: Vec<u8> },
    Done,
}

impl BodyDecoder {
    /// Decoder for a response with `head`.
    pub(crate) fn for_head(head: &ResponseHead) -> DownloadResult<Self> {
        if head.status == 204 || head.status == 304 {
            return Ok(Self::Length { remaining: 0 });
        }
        if head.is_chunked() {
            return Ok(Self::Chunked(ChunkState::Size { line: Vec::new() }));
        }
        Ok(match head.content_length()? {
            Some(len) => Self::Length { remaining: len },
            None => Self::UntilClose,
        })
    }

    /// Whether the body is complete.
    pub(crate) fn is_done(&self) -> bool {
        matches!(
            self,
            Self::Length { remaining: 0 } | Self::Chunked(ChunkState::Done)
        )
    }

    /// Decode `input`, appending body bytes to `out` in order. Returns
    /// whether the body is complete. Bytes after the end are ignored.
    pub(crate) fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> DownloadResult<bool> {
        match self {
            Self::Length { remaining } => {
                let take = usize::try_from(*remaining)
                    .unwrap_or(usize::MAX)
                    .min(input.len());
                out.extend_from_slice(&input[..take]);
                *remaining = remaining.saturating_sub(take as u64);
            },
            Self::UntilClose => out.extend_from_slice(input),
            Self::Chunked(state) => decode_chunked(state, input, out)?,
        }
        Ok(self.is_done())
    }

    /// Check the body is complete when the peer closes the connection.
    pub(crate) fn finish_on_close(&self) -> DownloadResult<()> {
        match self {
            Self::UntilClose => Ok(()),
            _ if self.is_done() => Ok(()),
            Self::Length { remaining } => Err(DownloadError::NetworkFailure(format!(
                "connection closed with {remaining} body bytes outstanding"
            ))),
            Self::Chunked(_) => Err(DownloadError::NetworkFailure(
                "connection closed inside a chunked body".into(),
            )),
        }
    }

    /// Announced body length, if known.
    pub(crate) fn expected_len(head: &ResponseHead) -> Option<u64> {
        if head.is_chunked() {
            None
        } else {
            head.content_length().ok().flatten()
        }
    }
}

fn decode_chunked(state: &mut ChunkState, input: &[u8], out: &mut Vec<u8>) -> DownloadResult<()> {
    let mut rest = input;

    while !rest.is_empty() {
        match state {
            ChunkState::Size { line } => {
                let Some((line_done, consumed)) = read_line(line, rest)? else {
                    return Ok(());
                };
                rest = &rest[consumed..];
                let size = parse_chunk_size(&line_done)?;
                *state = if size == 0 {
                    ChunkState::Trailer { line: Vec::new() }
                } else {
                    ChunkState::Data { remaining: size }
                };
            },
            ChunkState::Data { remaining } => {
                let take = usize::try_from(*remaining)
                    .unwrap_or(usize::MAX)
                    .min(rest.len());
                out.extend_from_slice(&rest[..take]);
                rest = &rest[take..];
                *remaining = remaining.saturating_sub(take as u64);
                if *remaining == 0 {
                    *state = ChunkState::DataEnd { saw_cr: false };
                }
            },
            ChunkState::DataEnd { saw_cr } => {
                match (rest[0], *saw_cr) {
                    (b'\r', false) => *saw_cr = true,
                    (b'\n', _) => *state = ChunkState::Size { line: Vec::new() },
                    _ => {
                        return Err(DownloadError::MalformedResponse(
                            "missing CRLF after chunk data".into(),
                        ));
                    },
                }
                rest = &rest[1..];
            },
            ChunkState::Trailer { line } => {
                let Some((line_done, consumed)) = read_line(line, rest)? else {
                    return Ok(());
                };
                rest = &rest[consumed..];
                if line_done.is_empty() {
                    *state = ChunkState::Done;
                }
            },
            ChunkState::Done => return Ok(()),
        }
    }
    Ok(())
}

/// Accumulate into `line` until `\n`. Returns the completed line (without
/// CRLF) and how many bytes of `input` were consumed, or `None` if the line
/// is still incomplete (all of `input` consumed).
fn read_line(line: &mut Vec<u8>, input: &[u8]) -> DownloadResult<Option<(Vec<u8>, usize)>> {
    let newline = input.iter().position(|&b| b == b'\n');
    let take = newline.map_or(input.len(), |i| i.saturating_add(1));
    line.extend_from_slice(&input[..take]);

    if line.len() > MAX_LINE_BYTES {
        return Err(DownloadError::MalformedResponse("chunk line too long".into()));
    }
    if newline.is_none() {
        return Ok(None);
    }

    let mut done = std::mem::take(line);
    done.pop();
    if done.last() == Some(&b'\r') {
        done.pop();
    }
    Ok(Some((done, take)))
}

fn parse_chunk_size(line: &[u8]) -> DownloadResult<u64> {
    let text = std::str::from_utf8(line)
        .map_err(|_| DownloadError::MalformedResponse("chunk size is not ASCII".into()))?;
    let size = text.split(';').next().unwrap_or_default().trim();
    u64::from_str_radix(size, 16)
        .map_err(|_| DownloadError::MalformedResponse(format!("bad chunk size {size:?}")))
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn head(raw: &str) -> ResponseHead {
        parse_head(raw.as_bytes()).unwrap().unwrap().0
    }

    #[test]
    fn test_encode_get_request() {
        let url = Url::parse("http://example.com:8080/pkg/app.sgp?v=2").unwrap();
        let bytes = encode_request(&url, None, &[], "sigil-test");
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with("GET /pkg/app.sgp?v=2 HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com:8080\r\n"));
        assert!(text.contains("User-Agent: sigil-test\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_encode_post_request() {
        let url = Url::parse("http://example.com/submit").unwrap();
        let headers = vec![("X-Token".to_string(), "abc".to_string())];
        let bytes = encode_request(&url, Some(b"payload"), &headers, "ua");
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with("POST /submit HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com\r\n"));
        assert!(text.contains("Content-Length: 7\r\n"));
        assert!(text.contains("X-Token: abc\r\n"));
        assert!(text.ends_with("\r\n\r\npayload"));
    }

    #[test]
    fn test_parse_head_waits_for_terminator() {
        assert!(parse_head(b"HTTP/1.1 200 OK\r\nContent-Le").unwrap().is_none());
    }

    #[test]
    fn test_parse_head_fields() {
        let raw = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nX-A:  b \r\n\r\nrest";
        let (head, consumed) = parse_head(raw).unwrap().unwrap();

        assert_eq!(head.status, 404);
        assert_eq!(head.reason, "Not Found");
        assert_eq!(head.header("x-a"), Some("b"));
        assert_eq!(head.content_length().unwrap(), Some(0));
        assert_eq!(&raw[consumed..], b"rest");
    }

    #[test]
    fn test_parse_head_rejects_garbage() {
        assert!(parse_head(b"SSH-2.0-OpenSSH\r\n\r\n").is_err());
        assert!(parse_head(b"HTTP/1.1 abc OK\r\n\r\n").is_err());
        assert!(parse_head(b"HTTP/1.1 200 OK\r\nno colon\r\n\r\n").is_err());
    }

    #[test]
    fn test_parse_head_size_cap() {
        let huge = vec![b'a'; MAX_HEAD_BYTES + 1];
        assert!(matches!(
            parse_head(&huge),
            Err(DownloadError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_bad_content_length() {
        let h = head("HTTP/1.1 200 OK\r\nContent-Length: lots\r\n\r\n");
        assert!(BodyDecoder::for_head(&h).is_err());
    }

    #[test]
    fn test_length_body() {
        let h = head("HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\n");
        let mut decoder = BodyDecoder::for_head(&h).unwrap();
        let mut out = Vec::new();

        assert!(!decoder.feed(b"ab", &mut out).unwrap());
        assert!(decoder.finish_on_close().is_err());
        assert!(decoder.feed(b"cdEXTRA", &mut out).unwrap());
        assert_eq!(out, b"abcd");
        assert!(decoder.finish_on_close().is_ok());
    }

    #[test]
    fn test_chunked_body_split_everywhere() {
        let h = head("HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\n\r\n");
        let wire = b"3;ext=1\r\nabc\r\n10\r\n0123456789abcdef\r\n0\r\nX-Trailer: t\r\n\r\n";

        for split in 1..wire.len() {
            let mut decoder = BodyDecoder::for_head(&h).unwrap();
            let mut out = Vec::new();
            let first = decoder.feed(&wire[..split], &mut out).unwrap();
            let second = decoder.feed(&wire[split..], &mut out).unwrap();

            assert!(!first || split == wire.len());
            assert!(second, "split at {split}");
            assert_eq!(out, b"abc0123456789abcdef", "split at {split}");
        }
    }

    #[test]
    fn test_chunked_byte_at_a_time() {
        let h = head("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n");
        let wire = b"2\r\nAB\r\n2\r\nCD\r\n2\r\nEF\r\n0\r\n\r\n";
        let mut decoder = BodyDecoder::for_head(&h).unwrap();
        let mut out = Vec::new();

        let mut done = false;
        for byte in wire {
            done = decoder.feed(std::slice::from_ref(byte), &mut out).unwrap();
        }
        assert!(done);
        assert_eq!(out, b"ABCDEF");
    }

    #[test]
    fn test_chunked_rejects_bad_framing() {
        let h = head("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n");

        let mut decoder = BodyDecoder::for_head(&h).unwrap();
        assert!(decoder.feed(b"zz\r\n", &mut Vec::new()).is_err());

        let mut decoder = BodyDecoder::for_head(&h).unwrap();
        assert!(decoder.feed(b"2\r\nABxx", &mut Vec::new()).is_err());
    }

    #[test]
    fn test_chunked_close_before_end() {
        let h = head("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n");
        let mut decoder = BodyDecoder::for_head(&h).unwrap();
        decoder.feed(b"5\r\nab", &mut Vec::new()).unwrap();
        assert!(matches!(
            decoder.finish_on_close(),
            Err(DownloadError::NetworkFailure(_))
        ));
    }

    #[test]
    fn test_until_close_body() {
        let h = head("HTTP/1.0 200 OK\r\n\r\n");
        let mut decoder = BodyDecoder::for_head(&h).unwrap();
        let mut out = Vec::new();
        assert!(!decoder.feed(b"anything", &mut out).unwrap());
        assert!(decoder.finish_on_close().is_ok());
        assert_eq!(BodyDecoder::expected_len(&h), None);
    }

    #[test]
    fn test_no_content_is_empty() {
        let h = head("HTTP/1.1 204 No Content\r\n\r\n");
        assert!(BodyDecoder::for_head(&h).unwrap().is_done());
    }
}
