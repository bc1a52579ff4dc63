use std::fmt::{self, Debug};
use std::time::Duration;

use embedded_svc::io::{ErrorKind, Read, Write};

use crate::api::Endpoint;
use crate::clock::Clock;
use crate::http::{read_verdict, write_body, write_head, LineReader, RequestHead};
use crate::model::{ActionContext, GateSettings};
use crate::verdict::{self, Verdict};

/// 图像来源；返回的帧在 drop 时归还底层缓冲区。
pub trait FrameSource {
    type Frame: AsRef<[u8]>;
    type Error: Debug;

    fn capture(&mut self) -> Result<Self::Frame, Self::Error>;
}

/// 建立到授权服务的加密字节流；流在 drop 时关闭。
pub trait Connector {
    type Stream: Read + Write;
    type Error: Debug;

    fn connect(&mut self, host: &str, port: u16, timeout: Duration)
        -> Result<Self::Stream, Self::Error>;
}

/// 抓拍并提交授权请求，任何失败都折算为拒绝结论。
pub trait Uploader {
    fn submit(&mut self, action: ActionContext) -> Verdict;
}

/// 上传流程阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    Capturing,
    Connecting,
    SendingHeaders,
    SendingBody,
    AwaitingResponse,
    Done,
}

impl UploadPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadPhase::Idle => "idle",
            UploadPhase::Capturing => "capturing",
            UploadPhase::Connecting => "connecting",
            UploadPhase::SendingHeaders => "sending_headers",
            UploadPhase::SendingBody => "sending_body",
            UploadPhase::AwaitingResponse => "awaiting_response",
            UploadPhase::Done => "done",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadError {
    Capture(String),
    Connect(String),
    Send(ErrorKind),
    Receive(ErrorKind),
    Timeout,
    BadResponse(String),
    TooManyHeaders,
    LineTooLong,
    NoVerdict,
    LengthMismatch { declared: usize, written: usize },
}

impl UploadError {
    /// 对应的本地拒绝结论。
    pub fn verdict_token(&self) -> &'static str {
        match self {
            UploadError::Capture(_) => verdict::CAPTURE_FAILED,
            UploadError::Connect(_) => verdict::ERROR_CONNECT,
            UploadError::Send(_) | UploadError::LengthMismatch { .. } => verdict::ERROR_SEND,
            UploadError::Timeout => verdict::ERROR_TIMEOUT,
            UploadError::Receive(_)
            | UploadError::BadResponse(_)
            | UploadError::TooManyHeaders
            | UploadError::LineTooLong => verdict::ERROR_BAD_RESPONSE,
            UploadError::NoVerdict => verdict::ERROR_NO_VERDICT,
        }
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::Capture(msg) => write!(f, "camera capture failed: {}", msg),
            UploadError::Connect(msg) => write!(f, "connect failed: {}", msg),
            UploadError::Send(kind) => write!(f, "send failed: {:?}", kind),
            UploadError::Receive(kind) => write!(f, "receive failed: {:?}", kind),
            UploadError::Timeout => write!(f, "response deadline exceeded"),
            UploadError::BadResponse(line) => write!(f, "malformed status line {:?}", line),
            UploadError::TooManyHeaders => write!(f, "response header section too long"),
            UploadError::LineTooLong => write!(f, "response line too long"),
            UploadError::NoVerdict => write!(f, "connection closed before verdict"),
            UploadError::LengthMismatch { declared, written } => {
                write!(f, "body length {} does not match content-length {}", written, declared)
            }
        }
    }
}

impl std::error::Error for UploadError {}

/// 上传客户端参数。
#[derive(Clone, Debug)]
pub struct UploadOptions {
    pub chunk_size: usize,
    pub camera_settle: Duration,
    pub connect_timeout: Duration,
    pub response_deadline: Duration,
}

impl From<&GateSettings> for UploadOptions {
    fn from(settings: &GateSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            camera_settle: settings.camera_settle(),
            connect_timeout: settings.connect_timeout(),
            response_deadline: settings.response_deadline(),
        }
    }
}

/// 抓拍 + HTTP 上传客户端；每次提交新建连接，结束即释放。
pub struct UploadClient<F, N, C> {
    frames: F,
    connector: N,
    clock: C,
    endpoint: Endpoint,
    options: UploadOptions,
    phase: UploadPhase,
}

impl<F, N, C> UploadClient<F, N, C>
where
    F: FrameSource,
    N: Connector,
    C: Clock,
{
    pub fn new(frames: F, connector: N, clock: C, endpoint: Endpoint, options: UploadOptions) -> Self {
        Self {
            frames,
            connector,
            clock,
            endpoint,
            options,
            phase: UploadPhase::Idle,
        }
    }

    /// 最近一次提交停留的阶段（失败时为出错前的阶段）。
    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    pub fn frames(&self) -> &F {
        &self.frames
    }

    pub fn connector(&self) -> &N {
        &self.connector
    }

    fn enter(&mut self, phase: UploadPhase) {
        log::debug!("Upload phase {} -> {}", self.phase.as_str(), phase.as_str());
        self.phase = phase;
    }

    /// 丢弃缓存中的旧帧，等待曝光稳定后再取用于上传的帧。
    fn capture_fresh(&mut self) -> Result<F::Frame, UploadError> {
        match self.frames.capture() {
            Ok(stale) => drop(stale),
            Err(err) => log::debug!("Warm-up capture failed: {:?}", err),
        }
        self.clock.sleep_for(self.options.camera_settle);
        self.frames
            .capture()
            .map_err(|err| UploadError::Capture(format!("{:?}", err)))
    }

    fn exchange(&mut self, action: ActionContext) -> Result<Verdict, UploadError> {
        self.enter(UploadPhase::Capturing);
        let frame = self.capture_fresh()?;
        let payload = frame.as_ref();

        self.enter(UploadPhase::Connecting);
        let mut stream = self
            .connector
            .connect(&self.endpoint.host, self.endpoint.port, self.options.connect_timeout)
            .map_err(|err| UploadError::Connect(format!("{:?}", err)))?;

        self.enter(UploadPhase::SendingHeaders);
        let head = RequestHead {
            host: &self.endpoint.host,
            path: &self.endpoint.path,
            content_length: payload.len(),
            action,
        };
        write_head(&mut stream, &head)?;
        log::info!("Uploading {} bytes ({}) to {}", payload.len(), action, self.endpoint.url());

        self.enter(UploadPhase::SendingBody);
        write_body(&mut stream, payload, self.options.chunk_size)?;

        self.enter(UploadPhase::AwaitingResponse);
        let deadline = self.clock.deadline(self.options.response_deadline);
        let mut reader = LineReader::new(stream);
        read_verdict(&mut reader, &self.clock, deadline)
    }
}

impl<F, N, C> Uploader for UploadClient<F, N, C>
where
    F: FrameSource,
    N: Connector,
    C: Clock,
{
    fn submit(&mut self, action: ActionContext) -> Verdict {
        let verdict = match self.exchange(action) {
            Ok(verdict) => verdict,
            Err(err) => {
                log::warn!("{} upload failed during {}: {}", action, self.phase.as_str(), err);
                Verdict::local_error(err.verdict_token())
            }
        };
        self.enter(UploadPhase::Done);
        log::info!("{} verdict: {}", action, verdict);
        verdict
    }
}
