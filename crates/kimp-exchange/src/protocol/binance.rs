//! Binance 결합 스트림.
//!
//! `/stream` 엔드포인트에 접속한 뒤 `SUBSCRIBE` 요청으로 `{symbol}@ticker` 또는
//! `{symbol}@aggTrade` 스트림을 구독합니다. 이벤트는 `{"stream":..,"data":{..}}`로 감싸져 옵니다.

use super::StreamProtocol;
use crate::ExchangeResult;
use kimp_core::{binance_stream_name, BinanceStreamKind, QuoteUpdate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// 요청 하나에 담을 최대 스트림 수.
const MAX_STREAMS_PER_REQUEST: usize = 200;

/// Binance WebSocket 구독 메시지.
#[derive(Debug, Serialize)]
struct SubscribeMessage<'a> {
    method: &'static str,
    params: &'a [String],
    id: u64,
}

/// 결합 스트림 봉투.
#[derive(Debug, Deserialize)]
struct Envelope {
    data: WsEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "e")]
enum WsEvent {
    #[serde(rename = "24hrTicker")]
    Ticker(WsTicker),
    #[serde(rename = "aggTrade")]
    AggTrade(WsAggTrade),
}

/// 24시간 롤링 티커 이벤트.
#[derive(Debug, Deserialize)]
struct WsTicker {
    #[serde(rename = "E")]
    event_time: Option<i64>,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    last_price: Decimal,
    #[serde(rename = "q")]
    quote_volume: Option<Decimal>,
}

/// 집계 체결 이벤트.
#[derive(Debug, Deserialize)]
struct WsAggTrade {
    #[serde(rename = "E")]
    event_time: Option<i64>,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: Decimal,
}

impl WsEvent {
    fn into_update(self) -> (String, QuoteUpdate) {
        match self {
            WsEvent::Ticker(t) => (
                t.symbol,
                QuoteUpdate {
                    price: Some(t.last_price),
                    quote_volume: t.quote_volume,
                    event_time: t.event_time,
                },
            ),
            WsEvent::AggTrade(t) => (
                t.symbol,
                QuoteUpdate {
                    price: Some(t.price),
                    quote_volume: None,
                    event_time: t.event_time,
                },
            ),
        }
    }
}

/// Binance 시세 프로토콜.
#[derive(Debug, Clone)]
pub struct BinanceProtocol {
    url: String,
    streams: Vec<String>,
}

impl BinanceProtocol {
    /// Binance 심볼(예: "BTCUSDT") 목록으로 생성합니다.
    pub fn new(url: impl Into<String>, symbols: impl IntoIterator<Item = String>, kind: BinanceStreamKind) -> Self {
        let mut streams: Vec<String> = symbols
            .into_iter()
            .map(|symbol| binance_stream_name(&symbol, kind))
            .collect();
        streams.sort();
        streams.dedup();

        Self {
            url: url.into(),
            streams,
        }
    }

    pub fn streams(&self) -> &[String] {
        &self.streams
    }

    fn parse(text: &str) -> Option<(String, QuoteUpdate)> {
        // 결합 스트림이 기본이고, 단일 스트림(/ws) 접속이면 이벤트가 그대로 옵니다
        let event = serde_json::from_str::<Envelope>(text)
            .map(|envelope| envelope.data)
            .or_else(|_| serde_json::from_str::<WsEvent>(text));

        match event {
            Ok(event) => Some(event.into_update()),
            Err(e) => {
                debug!(error = %e, "Binance 프레임 무시 (구독 응답 또는 알 수 없는 이벤트)");
                None
            }
        }
    }
}

impl StreamProtocol for BinanceProtocol {
    type Output = (String, QuoteUpdate);

    fn name(&self) -> &'static str {
        "binance"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn subscription_frames(&self) -> ExchangeResult<Vec<String>> {
        self.streams
            .chunks(MAX_STREAMS_PER_REQUEST)
            .enumerate()
            .map(|(i, params)| -> ExchangeResult<String> {
                let message = SubscribeMessage {
                    method: "SUBSCRIBE",
                    params,
                    id: i as u64 + 1,
                };
                Ok(serde_json::to_string(&message)?)
            })
            .collect()
    }

    fn decode(&self, message: &Message) -> Option<Self::Output> {
        match message {
            Message::Text(text) => Self::parse(text.as_str()),
            Message::Binary(data) => std::str::from_utf8(data).ok().and_then(Self::parse),
            _ => None,
        }
    }
}
