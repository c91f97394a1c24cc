//! 거래소 간 병합과 김치 프리미엄 계산.
//!
//! 프리미엄은 Upbit 현재가 대비 백분율입니다:
//!
//! ```text
//! binance_krw = binance_price(USDT) * forex(KRW/USD)
//! premium     = (1 - binance_krw / upbit_price) * 100
//! price_gap   = upbit_price - binance_krw
//! ```
//!
//! 양수면 Upbit가 해외 환산가보다 비싸게 거래되는 상태입니다.
//! Binance 시세나 환율이 없거나 계산이 불가능하면 관련 필드는 `None`으로 남습니다 (0이 아님).

use super::{BinanceQuote, ForexRate, MarketTicker};
use crate::types::{to_binance_symbol, Percentage, Price, Volume};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Binance 시세와 환율로 보강한 Upbit 티커.
///
/// 저장하지 않고 항상 최신 티커 + 최신 시세 + 최신 환율에서 다시 계산합니다.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CrossExchangeTicker {
    /// Upbit 티커
    pub ticker: MarketTicker,
    /// 대응 Binance 심볼 (매핑이 없으면 `None`)
    pub binance_symbol: Option<String>,
    /// 원화 환산 Binance 가격
    pub binance_price: Option<Price>,
    /// 원화 환산 Binance 24시간 거래대금
    pub binance_volume: Option<Volume>,
    /// 프리미엄 (%)
    pub premium: Option<Percentage>,
    /// 원화 가격 차이 (Upbit - Binance 환산가)
    pub price_gap: Option<Price>,
}

impl CrossExchangeTicker {
    /// 마켓 코드.
    pub fn code(&self) -> &str {
        &self.ticker.code
    }
}

/// Upbit 티커를 Binance 시세, 환율과 병합합니다.
///
/// 매핑된 시세 조회는 호출자 책임입니다 ([`Merger::merge_ticker`] 참조).
pub fn merge(
    ticker: MarketTicker,
    quote: Option<&BinanceQuote>,
    forex: Option<&ForexRate>,
) -> CrossExchangeTicker {
    let binance_symbol = to_binance_symbol(&ticker.code);

    let rate = forex.filter(|f| f.is_valid()).map(|f| f.base_price);
    let quote = quote.filter(|q| q.has_price());

    let (binance_price, binance_volume) = match (quote, rate) {
        (Some(q), Some(rate)) => (
            q.price.checked_mul(rate),
            q.quote_volume.and_then(|v| v.checked_mul(rate)),
        ),
        _ => (None, None),
    };

    let (premium, price_gap) = match binance_price {
        Some(krw) if ticker.has_price() => (
            premium_pct(ticker.trade_price, krw),
            ticker.trade_price.checked_sub(krw),
        ),
        _ => (None, None),
    };

    CrossExchangeTicker {
        ticker,
        binance_symbol,
        binance_price,
        binance_volume,
        premium,
        price_gap,
    }
}

/// `(1 - binance_krw / upbit_price) * 100`. 0 나누기와 오버플로는 `None`.
fn premium_pct(upbit_price: Price, binance_krw: Price) -> Option<Percentage> {
    let ratio = binance_krw.checked_div(upbit_price)?;
    (Decimal::ONE - ratio).checked_mul(Decimal::ONE_HUNDRED)
}

/// 최신 Binance 시세 캐시를 들고 있는 병합기.
///
/// Binance 쪽 버퍼를 비울 때 캐시를 갱신하고, Upbit 쪽 버퍼를 비울 때
/// 매핑된 심볼로 캐시를 조회해 병합합니다.
#[derive(Debug, Default)]
pub struct Merger {
    quotes: HashMap<String, BinanceQuote>,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 초기 시세로 생성합니다.
    pub fn with_quotes(quotes: impl IntoIterator<Item = BinanceQuote>) -> Self {
        let mut merger = Self::new();
        merger.update_quotes(quotes);
        merger
    }

    /// 시세 캐시를 갱신하고 바뀐 Binance 심볼 집합을 반환합니다.
    pub fn update_quotes(&mut self, quotes: impl IntoIterator<Item = BinanceQuote>) -> HashSet<String> {
        let mut changed = HashSet::new();
        for quote in quotes {
            if self.quotes.get(&quote.symbol) != Some(&quote) {
                changed.insert(quote.symbol.clone());
                self.quotes.insert(quote.symbol.clone(), quote);
            }
        }
        changed
    }

    /// Binance 심볼로 캐시된 시세를 조회합니다.
    pub fn quote(&self, binance_symbol: &str) -> Option<&BinanceQuote> {
        self.quotes.get(binance_symbol)
    }

    /// 캐시된 시세 수.
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// 심볼 매핑을 적용해 시세를 찾고 병합합니다.
    ///
    /// 대응 시세가 없는 것은 신규 상장 등에서 흔한 정상 상황입니다.
    pub fn merge_ticker(&self, ticker: MarketTicker, forex: Option<&ForexRate>) -> CrossExchangeTicker {
        let quote = to_binance_symbol(&ticker.code).and_then(|symbol| self.quotes.get(&symbol));
        merge(ticker, quote, forex)
    }
}
