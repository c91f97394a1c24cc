//! 거래소 에러 타입.
//!
//! 스트림 연결과 플러시 경로는 에러를 밖으로 던지지 않고 로그 후 재연결/무시로 처리합니다.
//! 이 타입은 REST 조회와 단일 세션 내부에서만 전파됩니다.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// 거래소 관련 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 네트워크/연결 에러
    #[error("네트워크 에러: {0}")]
    NetworkError(String),

    /// 연결 끊김 (서버 종료, 무응답)
    #[error("연결 끊김: {0}")]
    Disconnected(String),

    /// 요청 한도 초과
    #[error("요청 한도 초과")]
    RateLimited,

    /// API 에러 응답
    #[error("API 에러 {code}: {message}")]
    ApiError { code: i32, message: String },

    /// 파싱/역직렬화 에러
    #[error("파싱 에러: {0}")]
    ParseError(String),

    /// WebSocket 에러
    #[error("WebSocket 에러: {0}")]
    WebSocket(String),

    /// 타임아웃
    #[error("요청 타임아웃: {0}")]
    Timeout(String),

    /// 알 수 없는 에러
    #[error("알 수 없는 에러: {0}")]
    Unknown(String),
}

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

impl ExchangeError {
    /// HTTP 상태 코드와 본문으로 에러를 만듭니다.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        if status == 429 || status == 418 {
            ExchangeError::RateLimited
        } else {
            ExchangeError::ApiError {
                code: i32::from(status),
                message: body.into(),
            }
        }
    }

    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::NetworkError(_)
            | ExchangeError::Disconnected(_)
            | ExchangeError::RateLimited
            | ExchangeError::Timeout(_)
            | ExchangeError::WebSocket(_) => true,
            ExchangeError::ApiError { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// 권장 재시도 대기 시간(밀리초) 반환.
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            ExchangeError::RateLimited => Some(60_000),
            ExchangeError::NetworkError(_) => Some(1_000),
            ExchangeError::Disconnected(_) => Some(1_000),
            ExchangeError::Timeout(_) => Some(500),
            ExchangeError::WebSocket(_) => Some(1_000),
            ExchangeError::ApiError { code, .. } if *code >= 500 => Some(1_000),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ExchangeError::NetworkError(err.to_string())
        } else if err.is_decode() {
            ExchangeError::ParseError(err.to_string())
        } else {
            ExchangeError::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}

impl From<tungstenite::Error> for ExchangeError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                ExchangeError::Disconnected(err.to_string())
            }
            tungstenite::Error::Io(e) => ExchangeError::NetworkError(e.to_string()),
            other => ExchangeError::WebSocket(other.to_string()),
        }
    }
}
