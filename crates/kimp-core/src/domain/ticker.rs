//! Upbit 티커 데이터.
//!
//! - `MarketTicker` - 마켓 코드별 최신 티커 레코드
//! - `TickerUpdate` - 한 메시지가 실어 나르는 부분 레코드
//!
//! Upbit는 SIMPLE 포맷(축약 필드명)과 DEFAULT 포맷(전체 필드명)을 모두 보내고,
//! REST 스냅샷은 `code` 대신 `market`을 씁니다. `TickerUpdate`는 세 형식을
//! 모두 받아들입니다.

use crate::buffer::Coalesce;
use crate::types::{Percentage, Price, Volume};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 전일 종가 대비 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChangeDirection {
    /// 상승
    Rise,
    /// 보합
    #[default]
    Even,
    /// 하락
    Fall,
}

impl ChangeDirection {
    /// Upbit 코드 문자열("RISE", "EVEN", "FALL")에서 변환합니다.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "RISE" => Some(Self::Rise),
            "EVEN" => Some(Self::Even),
            "FALL" => Some(Self::Fall),
            _ => None,
        }
    }
}

/// 마켓 거래 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarketState {
    /// 입금 지원 (거래 전)
    Preview,
    /// 거래 지원
    #[default]
    Active,
    /// 거래 지원 종료
    Delisted,
}

impl MarketState {
    /// Upbit 코드 문자열에서 변환합니다.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "PREVIEW" => Some(Self::Preview),
            "ACTIVE" => Some(Self::Active),
            "DELISTED" => Some(Self::Delisted),
            _ => None,
        }
    }
}

/// 유의 종목 여부.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarketWarning {
    /// 해당 없음 (Upbit "NONE")
    #[default]
    Normal,
    /// 투자유의 (Upbit "CAUTION")
    Caution,
}

impl MarketWarning {
    /// Upbit 코드 문자열에서 변환합니다.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "NONE" => Some(Self::Normal),
            "CAUTION" => Some(Self::Caution),
            _ => None,
        }
    }
}

/// 화면 표시용 상태 플래그.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickerStatus {
    pub active: bool,
    pub caution: bool,
    pub delisted: bool,
}

/// 마켓 코드별 최신 티커 레코드.
///
/// 스트림 메시지 핸들러가 버퍼를 통해서만 갱신합니다.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketTicker {
    /// 마켓 코드 (예: "KRW-BTC")
    pub code: String,
    /// 현재가
    pub trade_price: Price,
    /// 시가
    pub opening_price: Price,
    /// 고가
    pub high_price: Price,
    /// 저가
    pub low_price: Price,
    /// 전일 종가
    pub prev_closing_price: Price,
    /// 전일 대비 방향
    pub change: ChangeDirection,
    /// 부호가 있는 전일 대비 값
    pub signed_change_price: Price,
    /// 부호가 있는 전일 대비 등락율 (0.01 = 1%)
    pub signed_change_rate: Percentage,
    /// 가장 최근 거래량
    pub trade_volume: Volume,
    /// 24시간 누적 거래량
    pub acc_trade_volume_24h: Volume,
    /// 24시간 누적 거래대금
    pub acc_trade_price_24h: Volume,
    /// 체결 시각
    pub trade_timestamp: Option<DateTime<Utc>>,
    /// 메시지 생성 시각
    pub timestamp: Option<DateTime<Utc>>,
    /// 거래 상태
    pub market_state: MarketState,
    /// 유의 종목 여부
    pub market_warning: MarketWarning,
    /// 거래 정지 여부
    pub is_trading_suspended: bool,
    /// 거래지원 종료일
    pub delisting_date: Option<String>,
}

impl MarketTicker {
    /// 빈 티커를 생성합니다.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    /// 부분 레코드를 얕게 병합합니다.
    ///
    /// 메시지에 없는 필드는 기존 값을 유지합니다.
    pub fn apply(&mut self, update: &TickerUpdate) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = update.$field { self.$field = v; })*
            };
        }

        merge!(
            trade_price,
            opening_price,
            high_price,
            low_price,
            prev_closing_price,
            signed_change_price,
            signed_change_rate,
            trade_volume,
            acc_trade_volume_24h,
            acc_trade_price_24h,
        );

        if let Some(direction) = update.change.as_deref().and_then(ChangeDirection::from_code) {
            self.change = direction;
        }
        if let Some(ms) = update.trade_timestamp {
            self.trade_timestamp = DateTime::from_timestamp_millis(ms);
        }
        if let Some(ms) = update.timestamp {
            self.timestamp = DateTime::from_timestamp_millis(ms);
        }
        if let Some(state) = update.market_state.as_deref().and_then(MarketState::from_code) {
            self.market_state = state;
        }
        if let Some(warning) = update
            .market_warning
            .as_deref()
            .and_then(MarketWarning::from_code)
        {
            self.market_warning = warning;
        }
        if let Some(suspended) = update.is_trading_suspended {
            self.is_trading_suspended = suspended;
        }
        if let Some(date) = &update.delisting_date {
            self.delisting_date = Some(date.clone());
        }
    }

    /// 상태 플래그를 반환합니다.
    pub fn status(&self) -> TickerStatus {
        let delisted = self.market_state == MarketState::Delisted || self.delisting_date.is_some();
        TickerStatus {
            active: self.market_state == MarketState::Active && !self.is_trading_suspended && !delisted,
            caution: self.market_warning == MarketWarning::Caution,
            delisted,
        }
    }

    /// 현재가가 유효한지(양수) 확인합니다.
    pub fn has_price(&self) -> bool {
        self.trade_price > Decimal::ZERO
    }
}

impl Coalesce for MarketTicker {
    type Update = TickerUpdate;

    fn seed(key: &str) -> Self {
        Self::new(key)
    }

    fn coalesce(&mut self, update: &TickerUpdate) {
        self.apply(update);
    }
}

/// 한 메시지가 실어 나르는 부분 티커 레코드.
///
/// SIMPLE 포맷의 축약 필드명을 기본으로 하고 전체 필드명을 별칭으로 받습니다.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TickerUpdate {
    /// 메시지 타입 ("ticker")
    #[serde(rename = "ty", alias = "type")]
    pub kind: Option<String>,
    /// 마켓 코드
    #[serde(rename = "cd", alias = "code", alias = "market")]
    pub code: Option<String>,
    #[serde(rename = "tp", alias = "trade_price")]
    pub trade_price: Option<Decimal>,
    #[serde(rename = "op", alias = "opening_price")]
    pub opening_price: Option<Decimal>,
    #[serde(rename = "hp", alias = "high_price")]
    pub high_price: Option<Decimal>,
    #[serde(rename = "lp", alias = "low_price")]
    pub low_price: Option<Decimal>,
    #[serde(rename = "pcp", alias = "prev_closing_price")]
    pub prev_closing_price: Option<Decimal>,
    /// "RISE" | "EVEN" | "FALL"
    #[serde(rename = "c", alias = "change")]
    pub change: Option<String>,
    #[serde(rename = "scp", alias = "signed_change_price")]
    pub signed_change_price: Option<Decimal>,
    #[serde(rename = "scr", alias = "signed_change_rate")]
    pub signed_change_rate: Option<Decimal>,
    #[serde(rename = "tv", alias = "trade_volume")]
    pub trade_volume: Option<Decimal>,
    #[serde(rename = "atv24h", alias = "acc_trade_volume_24h")]
    pub acc_trade_volume_24h: Option<Decimal>,
    #[serde(rename = "atp24h", alias = "acc_trade_price_24h")]
    pub acc_trade_price_24h: Option<Decimal>,
    /// 체결 타임스탬프 (ms)
    #[serde(rename = "ttms", alias = "trade_timestamp")]
    pub trade_timestamp: Option<i64>,
    /// 메시지 타임스탬프 (ms)
    #[serde(rename = "tms", alias = "timestamp")]
    pub timestamp: Option<i64>,
    /// "PREVIEW" | "ACTIVE" | "DELISTED"
    #[serde(rename = "ms", alias = "market_state")]
    pub market_state: Option<String>,
    /// "NONE" | "CAUTION"
    #[serde(rename = "mw", alias = "market_warning")]
    pub market_warning: Option<String>,
    #[serde(rename = "its", alias = "is_trading_suspended")]
    pub is_trading_suspended: Option<bool>,
    #[serde(rename = "dd", alias = "delisting_date")]
    pub delisting_date: Option<String>,
    /// "SNAPSHOT" | "REALTIME"
    #[serde(rename = "st", alias = "stream_type")]
    pub stream_type: Option<String>,
}

impl TickerUpdate {
    /// 티커 메시지인지 확인합니다. REST 응답처럼 타입이 없으면 티커로 간주합니다.
    pub fn is_ticker(&self) -> bool {
        self.kind.as_deref().map_or(true, |kind| kind == "ticker")
    }
}
