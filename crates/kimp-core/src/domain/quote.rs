//! Binance 시세와 원/달러 환율.

use crate::buffer::Coalesce;
use crate::types::{Price, Volume};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Binance USDT 마켓의 최신 시세.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BinanceQuote {
    /// Binance 심볼 (예: "BTCUSDT")
    pub symbol: String,
    /// 최근 체결가 (USDT)
    pub price: Price,
    /// 24시간 거래대금 (USDT). aggTrade 스트림만 구독하면 REST 시드 값이 유지됩니다.
    pub quote_volume: Option<Volume>,
    /// 이벤트 시각
    pub event_time: Option<DateTime<Utc>>,
}

impl BinanceQuote {
    /// 가격이 유효한지(양수) 확인합니다.
    pub fn has_price(&self) -> bool {
        self.price > Decimal::ZERO
    }
}

/// 한 메시지가 실어 나르는 부분 시세.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuoteUpdate {
    pub price: Option<Price>,
    pub quote_volume: Option<Volume>,
    /// 이벤트 타임스탬프 (ms)
    pub event_time: Option<i64>,
}

impl Coalesce for BinanceQuote {
    type Update = QuoteUpdate;

    fn seed(key: &str) -> Self {
        Self {
            symbol: key.to_string(),
            ..Default::default()
        }
    }

    fn coalesce(&mut self, update: &QuoteUpdate) {
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(volume) = update.quote_volume {
            self.quote_volume = Some(volume);
        }
        if let Some(ms) = update.event_time {
            self.event_time = DateTime::from_timestamp_millis(ms);
        }
    }
}

/// 원/달러 환율.
///
/// 전용 폴러만 기록하며 병합기는 읽기만 합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForexRate {
    /// 1 USD당 원화 기준 가격
    pub base_price: Price,
    /// 조회 시각
    pub fetched_at: DateTime<Utc>,
}

impl ForexRate {
    /// 새 환율을 생성합니다.
    pub fn new(base_price: Price) -> Self {
        Self {
            base_price,
            fetched_at: Utc::now(),
        }
    }

    /// 환율이 유효한지(양수) 확인합니다.
    pub fn is_valid(&self) -> bool {
        self.base_price > Decimal::ZERO
    }
}
