use std::fmt;

/// 授权入场的判定标记。
pub const AUTHORIZE_TOKEN: &str = "OPEN_GATE";

/// 本地故障对应的拒绝结论（不会包含授权标记）。
pub const CAPTURE_FAILED: &str = "Camera Capture Failed";
pub const ERROR_CONNECT: &str = "ERROR_CONNECT";
pub const ERROR_SEND: &str = "ERROR_SEND";
pub const ERROR_TIMEOUT: &str = "ERROR_TIMEOUT";
pub const ERROR_BAD_RESPONSE: &str = "ERROR_BAD_RESPONSE";
pub const ERROR_NO_VERDICT: &str = "ERROR_NO_VERDICT";

/// 判定规则：子串包含（与后端约定一致，非精确匹配）。
pub fn authorizes(text: &str) -> bool {
    text.contains(AUTHORIZE_TOKEN)
}

/// 一次上传的结论文本及响应状态码（本地故障时无状态码）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    text: String,
    status: Option<u16>,
}

impl Verdict {
    /// 服务端返回的结论行。
    pub fn from_response(status: u16, line: &str) -> Self {
        Self {
            text: line.trim().to_string(),
            status: Some(status),
        }
    }

    /// 本地故障结论（恒为拒绝）。
    pub fn local_error(token: &str) -> Self {
        Self {
            text: token.to_string(),
            status: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// 仅 2xx 响应且正文包含授权标记时放行。
    pub fn authorizes_entry(&self) -> bool {
        match self.status {
            Some(status) if (200..300).contains(&status) => authorizes(&self.text),
            _ => false,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({})", self.text, status),
            None => write!(f, "{}", self.text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_match_authorizes() {
        assert!(Verdict::from_response(200, "OPEN_GATE").authorizes_entry());
        assert!(Verdict::from_response(200, "OPEN_GATE\r").authorizes_entry());
        // 子串语义：带后缀的结论同样放行
        assert!(Verdict::from_response(200, "OPEN_GATE_DENIED_TEST").authorizes_entry());
    }

    #[test]
    fn other_service_verdicts_deny() {
        for text in ["FULL", "DENIED_NO_TEXT", "ACCESS_DENIED", "EXIT_SUCCESS", "", "open_gate"] {
            assert!(!Verdict::from_response(200, text).authorizes_entry(), "{text}");
        }
    }

    #[test]
    fn local_errors_always_deny() {
        for token in [
            CAPTURE_FAILED,
            ERROR_CONNECT,
            ERROR_SEND,
            ERROR_TIMEOUT,
            ERROR_BAD_RESPONSE,
            ERROR_NO_VERDICT,
        ] {
            let verdict = Verdict::local_error(token);
            assert!(!verdict.authorizes_entry());
            assert_eq!(verdict.status(), None);
            assert_eq!(verdict.text(), token);
        }
    }

    #[test]
    fn non_success_status_never_authorizes() {
        assert!(!Verdict::from_response(400, "OPEN_GATE").authorizes_entry());
        assert!(!Verdict::from_response(502, "OPEN_GATE").authorizes_entry());
    }

    #[test]
    fn display_includes_status() {
        assert_eq!(Verdict::from_response(200, "FULL").to_string(), "FULL (200)");
        assert_eq!(Verdict::local_error(ERROR_CONNECT).to_string(), "ERROR_CONNECT");
    }
}
