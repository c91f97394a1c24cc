//! Upbit 마켓 목록.

use crate::types::is_krw_market;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upbit `/v1/market/all` 응답 행.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketInfo {
    /// 마켓 코드 (예: "KRW-BTC")
    pub market: String,
    /// 한글 이름 (예: "비트코인")
    pub korean_name: String,
    /// 영문 이름 (예: "Bitcoin")
    pub english_name: String,
    /// 유의 종목 여부 ("NONE" | "CAUTION")
    #[serde(default)]
    pub market_warning: Option<String>,
}

impl MarketInfo {
    pub fn new(
        market: impl Into<String>,
        korean_name: impl Into<String>,
        english_name: impl Into<String>,
    ) -> Self {
        Self {
            market: market.into(),
            korean_name: korean_name.into(),
            english_name: english_name.into(),
            market_warning: None,
        }
    }
}

/// 마켓 코드로 조회하는 마켓 목록.
#[derive(Debug, Clone, Default)]
pub struct MarketCatalog {
    markets: HashMap<String, MarketInfo>,
}

impl MarketCatalog {
    pub fn new(markets: impl IntoIterator<Item = MarketInfo>) -> Self {
        Self {
            markets: markets
                .into_iter()
                .map(|info| (info.market.clone(), info))
                .collect(),
        }
    }

    pub fn get(&self, code: &str) -> Option<&MarketInfo> {
        self.markets.get(code)
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// 원화 마켓 코드 목록 (코드순).
    pub fn krw_markets(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .markets
            .keys()
            .filter(|code| is_krw_market(code))
            .cloned()
            .collect();
        codes.sort();
        codes
    }
}
