//! 마켓 코드와 거래소 간 심볼 매핑.
//!
//! Upbit 원화 마켓 `KRW-{ASSET}`은 Binance `{ASSET}USDT`에 대응합니다.
//! 두 거래소가 같은 자산을 다른 티커로 상장한 경우와 Binance에 없는 자산은
//! 예외 테이블로 관리합니다. 매핑은 상태가 없는 순수 함수입니다.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 원화 마켓 코드 접두사.
pub const KRW_MARKET_PREFIX: &str = "KRW-";

/// Binance 대응 마켓의 호가 자산.
pub const BINANCE_QUOTE_ASSET: &str = "USDT";

/// Upbit 자산명 → Binance 자산명 예외 목록.
///
/// `None`은 Binance에 대응 마켓이 없다는 뜻입니다.
const BINANCE_ASSET_EXCEPTIONS: &[(&str, Option<&str>)] = &[
    // 리브랜딩된 BitTorrent (Binance는 BTTC로 상장)
    ("BTT", Some("BTTC")),
    // NuCypher (Binance 상장 폐지)
    ("NU", None),
];

/// 원화 마켓 코드인지 확인합니다.
pub fn is_krw_market(code: &str) -> bool {
    code.len() > KRW_MARKET_PREFIX.len()
        && code
            .get(..KRW_MARKET_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(KRW_MARKET_PREFIX))
}

/// 마켓 코드에서 기준 자산을 추출합니다 (예: "KRW-BTC" → "BTC").
pub fn base_asset(code: &str) -> Option<&str> {
    let (_, asset) = code.split_once('-')?;
    if asset.is_empty() {
        None
    } else {
        Some(asset)
    }
}

/// Upbit 원화 마켓 코드를 Binance USDT 심볼로 변환합니다.
///
/// 원화 마켓이 아니거나 Binance 대응 마켓이 없으면 `None`을 반환합니다.
///
/// ```
/// use kimp_core::to_binance_symbol;
///
/// assert_eq!(to_binance_symbol("KRW-ETH").as_deref(), Some("ETHUSDT"));
/// assert_eq!(to_binance_symbol("KRW-BTT").as_deref(), Some("BTTCUSDT"));
/// assert_eq!(to_binance_symbol("KRW-NU"), None);
/// ```
pub fn to_binance_symbol(code: &str) -> Option<String> {
    if !is_krw_market(code) {
        return None;
    }
    let asset = base_asset(code)?.to_uppercase();

    let mapped = match BINANCE_ASSET_EXCEPTIONS
        .iter()
        .find(|(upbit, _)| *upbit == asset)
    {
        Some((_, binance)) => (*binance)?.to_string(),
        None => asset,
    };

    Some(format!("{}{}", mapped, BINANCE_QUOTE_ASSET))
}

/// Binance 실시간 스트림 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BinanceStreamKind {
    /// 24시간 롤링 티커 (`@ticker`)
    #[default]
    #[serde(rename = "ticker", alias = "Ticker")]
    Ticker,
    /// 집계 체결 (`@aggTrade`)
    #[serde(rename = "aggTrade", alias = "agg_trade", alias = "AggTrade")]
    AggTrade,
}

impl BinanceStreamKind {
    /// 스트림 이름 접미사.
    pub fn suffix(&self) -> &'static str {
        match self {
            BinanceStreamKind::Ticker => "ticker",
            BinanceStreamKind::AggTrade => "aggTrade",
        }
    }
}

impl fmt::Display for BinanceStreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Binance 스트림 이름을 반환합니다 (예: "BTCUSDT" → "btcusdt@ticker").
pub fn binance_stream_name(symbol: &str, kind: BinanceStreamKind) -> String {
    format!("{}@{}", symbol.to_lowercase(), kind.suffix())
}
