//! Upbit 티커 스트림.
//!
//! 구독 요청은 JSON 배열 하나로 보냅니다:
//!
//! ```json
//! [{"ticket":"<uuid>"},{"type":"ticker","codes":["KRW-BTC"],"isOnlyRealtime":true},{"format":"SIMPLE"}]
//! ```
//!
//! 응답은 UTF-8 JSON을 담은 바이너리 프레임이며 SIMPLE 포맷의 축약 필드명을 씁니다.

use super::StreamProtocol;
use crate::ExchangeResult;
use kimp_core::TickerUpdate;
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// 구독 요청 배열의 각 항목.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestField<'a> {
    Ticket {
        ticket: &'a str,
    },
    Type {
        #[serde(rename = "type")]
        kind: &'a str,
        codes: &'a [String],
        #[serde(rename = "isOnlyRealtime")]
        is_only_realtime: bool,
    },
    Format {
        format: &'a str,
    },
}

/// Upbit 티커 프로토콜.
#[derive(Debug, Clone)]
pub struct UpbitProtocol {
    url: String,
    codes: Vec<String>,
    ticket: String,
}

impl UpbitProtocol {
    /// 구독할 마켓 코드로 생성합니다. 티켓은 인스턴스마다 새로 발급합니다.
    pub fn new(url: impl Into<String>, codes: Vec<String>) -> Self {
        Self {
            url: url.into(),
            codes,
            ticket: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// 텍스트 한 건을 티커 업데이트로 해석합니다.
    fn parse(text: &str) -> Option<(String, TickerUpdate)> {
        let update: TickerUpdate = match serde_json::from_str(text) {
            Ok(update) => update,
            Err(e) => {
                debug!(error = %e, "Upbit 프레임 파싱 실패, 무시");
                return None;
            }
        };

        if !update.is_ticker() {
            return None;
        }

        match update.code.clone() {
            Some(code) => Some((code, update)),
            None => {
                if text.contains("\"error\"") {
                    warn!(frame = %text, "Upbit 에러 응답");
                }
                None
            }
        }
    }
}

impl StreamProtocol for UpbitProtocol {
    type Output = (String, TickerUpdate);

    fn name(&self) -> &'static str {
        "upbit"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn subscription_frames(&self) -> ExchangeResult<Vec<String>> {
        if self.codes.is_empty() {
            return Ok(Vec::new());
        }

        let request = [
            RequestField::Ticket {
                ticket: &self.ticket,
            },
            RequestField::Type {
                kind: "ticker",
                codes: &self.codes,
                is_only_realtime: true,
            },
            RequestField::Format { format: "SIMPLE" },
        ];

        Ok(vec![serde_json::to_string(&request)?])
    }

    fn decode(&self, message: &Message) -> Option<Self::Output> {
        match message {
            Message::Binary(data) => match std::str::from_utf8(data) {
                Ok(text) => Self::parse(text),
                Err(e) => {
                    debug!(error = %e, "Upbit 바이너리 프레임이 UTF-8이 아님");
                    None
                }
            },
            Message::Text(text) => Self::parse(text.as_str()),
            _ => None,
        }
    }
}
