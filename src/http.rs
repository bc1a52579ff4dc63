use embedded_svc::io::{Error as _, ErrorKind, Read, Write};

use crate::clock::{Clock, Deadline};
use crate::model::ActionContext;
use crate::upload::UploadError;
use crate::verdict::Verdict;

/// 携带出入场方向的自定义请求头。
pub const ACTION_HEADER: &str = "x-parking-action";
pub const CONTENT_TYPE_JPEG: &str = "image/jpeg";

/// 响应头行数上限（防止无终止符的响应无限读取）。
pub const MAX_HEADER_LINES: usize = 64;
/// 单行长度上限。
pub const MAX_LINE_LEN: usize = 512;

/// 上传请求头（请求行 + Host/Content-Type/Content-Length/方向）。
#[derive(Clone, Debug)]
pub struct RequestHead<'a> {
    pub host: &'a str,
    pub path: &'a str,
    pub content_length: usize,
    pub action: ActionContext,
}

impl RequestHead<'_> {
    /// 编码为 HTTP/1.1 文本头，以空行结束。
    pub fn encode(&self) -> String {
        format!(
            "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n{}: {}\r\n\r\n",
            self.path,
            self.host,
            CONTENT_TYPE_JPEG,
            self.content_length,
            ACTION_HEADER,
            self.action.as_str()
        )
    }
}

/// 写入请求头。
pub fn write_head<W: Write>(stream: &mut W, head: &RequestHead<'_>) -> Result<(), UploadError> {
    stream
        .write_all(head.encode().as_bytes())
        .map_err(|err| UploadError::Send(err.kind()))
}

/// 分块写入正文，末尾不足一块的部分单独写出；返回实际写出字节数。
pub fn write_body<W: Write>(
    stream: &mut W,
    payload: &[u8],
    chunk_size: usize,
) -> Result<usize, UploadError> {
    let mut written = 0;
    for chunk in payload.chunks(chunk_size.max(1)) {
        stream
            .write_all(chunk)
            .map_err(|err| UploadError::Send(err.kind()))?;
        written += chunk.len();
    }
    stream.flush().map_err(|err| UploadError::Send(err.kind()))?;
    if written != payload.len() {
        return Err(UploadError::LengthMismatch {
            declared: payload.len(),
            written,
        });
    }
    Ok(written)
}

/// 带缓冲的按行读取器，每次读取前检查截止时间。
pub struct LineReader<R> {
    inner: R,
    buf: [u8; 256],
    start: usize,
    end: usize,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: [0; 256],
            start: 0,
            end: 0,
        }
    }

    /// 读取一行（去掉 CRLF）；连接关闭且无剩余数据时返回 `None`。
    pub fn read_line<C: Clock + ?Sized>(
        &mut self,
        clock: &C,
        deadline: Deadline,
    ) -> Result<Option<String>, UploadError> {
        self.read_until(clock, deadline, None, false)
    }

    /// 读取正文首行：最多读 `content_length` 字节；服务端保持连接时，
    /// 超时前已收到的非空内容即作为一行返回。
    pub fn read_body_line<C: Clock + ?Sized>(
        &mut self,
        clock: &C,
        deadline: Deadline,
        content_length: Option<usize>,
    ) -> Result<Option<String>, UploadError> {
        self.read_until(clock, deadline, content_length, true)
    }

    fn read_until<C: Clock + ?Sized>(
        &mut self,
        clock: &C,
        deadline: Deadline,
        limit: Option<usize>,
        keep_partial: bool,
    ) -> Result<Option<String>, UploadError> {
        let mut line: Vec<u8> = Vec::new();
        loop {
            if limit.is_some_and(|limit| line.len() >= limit) {
                return finish_line(line).map(Some);
            }
            if self.start == self.end {
                if deadline.is_expired(clock) {
                    return partial_or(line, keep_partial, UploadError::Timeout);
                }
                let count = match self.inner.read(&mut self.buf) {
                    Ok(count) => count,
                    Err(err) => return partial_or(line, keep_partial, receive_error(err)),
                };
                if count == 0 {
                    if line.is_empty() {
                        return Ok(None);
                    }
                    return finish_line(line).map(Some);
                }
                self.start = 0;
                self.end = count;
            }

            let mut pending = &self.buf[self.start..self.end];
            if let Some(limit) = limit {
                pending = &pending[..pending.len().min(limit - line.len())];
            }
            if let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&pending[..pos]);
                self.start += pos + 1;
                return finish_line(line).map(Some);
            }
            line.extend_from_slice(pending);
            self.start += pending.len();
            if line.len() > MAX_LINE_LEN {
                return Err(UploadError::LineTooLong);
            }
        }
    }
}

/// 读取响应：校验状态行，跳过响应头直到空行，再读一行作为结论。
pub fn read_verdict<R: Read, C: Clock + ?Sized>(
    reader: &mut LineReader<R>,
    clock: &C,
    deadline: Deadline,
) -> Result<Verdict, UploadError> {
    let status_line = reader
        .read_line(clock, deadline)?
        .ok_or(UploadError::NoVerdict)?;
    let status = parse_status_line(&status_line)
        .ok_or_else(|| UploadError::BadResponse(status_line.clone()))?;

    let mut header_lines = 0;
    let mut content_length = None;
    loop {
        let line = reader
            .read_line(clock, deadline)?
            .ok_or(UploadError::NoVerdict)?;
        if line.is_empty() {
            break;
        }
        if let Some(length) = parse_content_length(&line) {
            content_length = Some(length);
        }
        header_lines += 1;
        if header_lines > MAX_HEADER_LINES {
            return Err(UploadError::TooManyHeaders);
        }
    }

    let body = reader
        .read_body_line(clock, deadline, content_length)?
        .ok_or(UploadError::NoVerdict)?;
    if !(200..300).contains(&status) {
        log::warn!("Authorization service answered {} ({})", status, body);
    }
    Ok(Verdict::from_response(status, &body))
}

/// 解析 `HTTP/1.x NNN ...` 状态行，返回状态码。
pub fn parse_status_line(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/1.") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    let status: u16 = code.parse().ok()?;
    (100..=599).contains(&status).then_some(status)
}

/// `Content-Length: N` 头（名称不区分大小写）。
fn parse_content_length(line: &str) -> Option<usize> {
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return None;
    }
    value.trim().parse().ok()
}

/// 只有超时才保留已收到的部分内容。
fn partial_or(line: Vec<u8>, keep_partial: bool, err: UploadError) -> Result<Option<String>, UploadError> {
    if keep_partial && err == UploadError::Timeout && !line.is_empty() {
        log::debug!("Verdict line cut short by timeout, using {} bytes", line.len());
        return finish_line(line).map(Some);
    }
    Err(err)
}

fn finish_line(mut line: Vec<u8>) -> Result<String, UploadError> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.len() > MAX_LINE_LEN {
        return Err(UploadError::LineTooLong);
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

fn receive_error<E: embedded_svc::io::Error>(err: E) -> UploadError {
    match err.kind() {
        ErrorKind::TimedOut => UploadError::Timeout,
        kind => UploadError::Receive(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimStream, VirtualClock};
    use std::time::Duration;

    fn read_all(response: &[u8]) -> Result<Verdict, UploadError> {
        let clock = VirtualClock::new();
        let deadline = clock.deadline(Duration::from_secs(10));
        let mut reader = LineReader::new(SimStream::with_response(response));
        read_verdict(&mut reader, &clock, deadline)
    }

    #[test]
    fn encodes_request_head() {
        let head = RequestHead {
            host: "gate.example.com",
            path: "/default/parking",
            content_length: 20000,
            action: ActionContext::Exit,
        };
        assert_eq!(
            head.encode(),
            "POST /default/parking HTTP/1.1\r\n\
             Host: gate.example.com\r\n\
             Content-Type: image/jpeg\r\n\
             Content-Length: 20000\r\n\
             x-parking-action: EXIT\r\n\
             \r\n"
        );
    }

    #[test]
    fn body_length_matches_payload_for_chunk_edges() {
        for len in [0usize, 1, 1023, 1024, 1025, 2048, 20000] {
            let payload = vec![0xAB; len];
            let mut stream = SimStream::new();
            let written = write_body(&mut stream, &payload, 1024).unwrap();
            assert_eq!(written, len);
            assert_eq!(stream.written().len(), len);
            // 每次写入不超过一块，最后一块为余数
            let writes = stream.write_sizes();
            assert!(writes.iter().all(|&size| size <= 1024));
            assert_eq!(writes.len(), len.div_ceil(1024));
            if len % 1024 != 0 {
                assert_eq!(writes.last().copied(), Some(len % 1024));
            }
        }
    }

    #[test]
    fn reads_first_line_after_headers() {
        let verdict = read_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 9\r\n\r\nOPEN_GATE\r\nignored\r\n",
        )
        .unwrap();
        assert_eq!(verdict.text(), "OPEN_GATE");
        assert_eq!(verdict.status(), Some(200));
        assert!(verdict.authorizes_entry());
    }

    #[test]
    fn verdict_without_trailing_newline() {
        let verdict = read_all(b"HTTP/1.1 200 OK\r\n\r\nFULL").unwrap();
        assert_eq!(verdict.text(), "FULL");
    }

    #[test]
    fn content_length_ends_verdict_on_open_connection() {
        let clock = VirtualClock::new();
        let deadline = clock.deadline(Duration::from_secs(10));
        let stream = SimStream::with_response(b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\nOPEN_GATE")
            .fail_reads_after(1, ErrorKind::TimedOut);
        let verdict = read_verdict(&mut LineReader::new(stream), &clock, deadline).unwrap();
        assert_eq!(verdict.text(), "OPEN_GATE");
        assert!(verdict.authorizes_entry());
    }

    #[test]
    fn content_length_bounds_verdict_line() {
        let verdict = read_all(b"HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\nFULLOPEN_GATE\r\n").unwrap();
        assert_eq!(verdict.text(), "FULL");
        assert!(!verdict.authorizes_entry());
    }

    #[test]
    fn partial_verdict_kept_when_read_times_out() {
        let clock = VirtualClock::new();
        let deadline = clock.deadline(Duration::from_secs(10));
        let stream = SimStream::with_response(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nOPEN_GATE")
            .fail_reads_after(1, ErrorKind::TimedOut);
        let verdict = read_verdict(&mut LineReader::new(stream), &clock, deadline).unwrap();
        assert_eq!(verdict.text(), "OPEN_GATE");
    }

    #[test]
    fn timeout_before_any_body_is_still_timeout() {
        let clock = VirtualClock::new();
        let deadline = clock.deadline(Duration::from_secs(10));
        let stream = SimStream::with_response(b"HTTP/1.1 200 OK\r\n\r\n").fail_reads_after(1, ErrorKind::TimedOut);
        assert_eq!(
            read_verdict(&mut LineReader::new(stream), &clock, deadline).unwrap_err(),
            UploadError::Timeout
        );
    }

    #[test]
    fn parses_content_length_header() {
        assert_eq!(parse_content_length("Content-Length: 9"), Some(9));
        assert_eq!(parse_content_length("content-length:12"), Some(12));
        assert_eq!(parse_content_length("Content-Type: text/plain"), None);
        assert_eq!(parse_content_length("Content-Length: nine"), None);
    }

    #[test]
    fn missing_terminator_is_no_verdict() {
        let err = read_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n").unwrap_err();
        assert_eq!(err, UploadError::NoVerdict);
    }

    #[test]
    fn rejects_malformed_status_line() {
        let err = read_all(b"garbage\r\n\r\nOPEN_GATE\r\n").unwrap_err();
        assert_eq!(err, UploadError::BadResponse("garbage".to_string()));
    }

    #[test]
    fn error_status_keeps_body_but_denies() {
        let verdict = read_all(b"HTTP/1.1 400 Bad Request\r\n\r\nIMAGE_DECODE_ERROR\r\n").unwrap();
        assert_eq!(verdict.status(), Some(400));
        assert_eq!(verdict.text(), "IMAGE_DECODE_ERROR");
        assert!(!verdict.authorizes_entry());
    }

    #[test]
    fn endless_headers_are_bounded() {
        let mut response = b"HTTP/1.1 200 OK\r\n".to_vec();
        for _ in 0..(MAX_HEADER_LINES + 1) {
            response.extend_from_slice(b"X-Filler: 1\r\n");
        }
        assert_eq!(read_all(&response).unwrap_err(), UploadError::TooManyHeaders);
    }

    #[test]
    fn overlong_line_is_rejected() {
        let mut response = b"HTTP/1.1 200 OK\r\nX-Big: ".to_vec();
        response.extend(std::iter::repeat(b'a').take(MAX_LINE_LEN + 10));
        response.extend_from_slice(b"\r\n\r\nOPEN_GATE\r\n");
        assert_eq!(read_all(&response).unwrap_err(), UploadError::LineTooLong);
    }

    #[test]
    fn slow_response_hits_deadline() {
        let clock = VirtualClock::new();
        let deadline = clock.deadline(Duration::from_secs(10));
        let stream = SimStream::with_response(b"HTTP/1.1 200 OK\r\nX-Slow: 1\r\n\r\nOPEN_GATE\r\n")
            .trickle(4, clock.clone(), Duration::from_secs(2));
        let mut reader = LineReader::new(stream);
        assert_eq!(
            read_verdict(&mut reader, &clock, deadline).unwrap_err(),
            UploadError::Timeout
        );
    }

    #[test]
    fn transport_timeout_maps_to_timeout() {
        let clock = VirtualClock::new();
        let deadline = clock.deadline(Duration::from_secs(10));
        let stream = SimStream::with_response(b"HTTP/1.1 200 OK\r\n").fail_reads_after(0, ErrorKind::TimedOut);
        let mut reader = LineReader::new(stream);
        assert_eq!(
            read_verdict(&mut reader, &clock, deadline).unwrap_err(),
            UploadError::Timeout
        );
    }

    #[test]
    fn parses_status_lines() {
        assert_eq!(parse_status_line("HTTP/1.1 200 OK"), Some(200));
        assert_eq!(parse_status_line("HTTP/1.0 503 Service Unavailable"), Some(503));
        assert_eq!(parse_status_line("HTTP/2 200"), None);
        assert_eq!(parse_status_line("HTTP/1.1 20 OK"), None);
        assert_eq!(parse_status_line("HTTP/1.1 abc OK"), None);
        assert_eq!(parse_status_line(""), None);
    }
}
