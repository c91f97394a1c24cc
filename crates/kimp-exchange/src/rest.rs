//! REST 스냅샷 조회.
//!
//! 첫 화면이 빈 표가 되지 않도록 스트림 연결 전에 마켓 목록과 현재 시세를 받아
//! 게시 상태를 미리 채웁니다. 스트림은 실시간 값만 받으므로(`isOnlyRealtime`)
//! 여기서 받은 값이 부분 업데이트의 병합 기반이 됩니다.

use crate::http::get_json;
use crate::ExchangeResult;
use kimp_core::{
    is_krw_market, BinanceConfig, BinanceQuote, CrossExchangeTicker, ForexRate, MarketCatalog,
    MarketInfo, MarketTicker, Merger, PublishedMarketState, TickerUpdate, UpbitConfig,
    BINANCE_QUOTE_ASSET,
};
use chrono::DateTime;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// `/v1/ticker` 한 번에 요청할 최대 마켓 수.
const UPBIT_TICKER_CHUNK: usize = 100;

/// REST 요청 타임아웃 (초).
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Binance `/api/v3/ticker/24hr` 응답 행.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24hr {
    symbol: String,
    last_price: Decimal,
    quote_volume: Option<Decimal>,
    close_time: Option<i64>,
}

/// 초기 시세 스냅샷.
#[derive(Debug, Clone, Default)]
pub struct MarketSeed {
    /// Upbit 마켓 목록
    pub catalog: MarketCatalog,
    /// 구독 대상 마켓의 현재 티커
    pub tickers: Vec<MarketTicker>,
    /// Binance USDT 마켓 시세
    pub quotes: Vec<BinanceQuote>,
    /// 원/달러 환율
    pub forex: Option<ForexRate>,
}

impl MarketSeed {
    /// 스트림과 같은 병합기로 초기 병합 결과를 만듭니다.
    pub fn merged(&self) -> Vec<CrossExchangeTicker> {
        let merger = Merger::with_quotes(self.quotes.iter().cloned());
        self.tickers
            .iter()
            .map(|ticker| merger.merge_ticker(ticker.clone(), self.forex.as_ref()))
            .collect()
    }

    /// 초기 병합 결과로 채운 게시 상태를 생성합니다.
    pub fn published_state(&self) -> PublishedMarketState {
        PublishedMarketState::seeded(self.merged())
    }

    /// 구독할 Upbit 마켓 코드 (티커를 받은 순서가 아니라 코드순).
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.tickers.iter().map(|t| t.code.clone()).collect();
        codes.sort();
        codes
    }
}

/// Upbit / Binance REST 클라이언트.
#[derive(Debug, Clone)]
pub struct SnapshotClient {
    client: Client,
    upbit_url: String,
    binance_url: String,
}

impl SnapshotClient {
    pub fn new(upbit: &UpbitConfig, binance: &BinanceConfig) -> ExchangeResult<Self> {
        Self::with_urls(&upbit.rest_url, &binance.rest_url)
    }

    /// 기본 URL을 직접 지정합니다.
    pub fn with_urls(upbit_url: &str, binance_url: &str) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            upbit_url: upbit_url.trim_end_matches('/').to_string(),
            binance_url: binance_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upbit 전체 마켓 목록.
    pub async fn fetch_markets(&self) -> ExchangeResult<Vec<MarketInfo>> {
        let url = format!("{}/v1/market/all", self.upbit_url);
        get_json(&self.client, &url, &[("isDetails", "true")]).await
    }

    /// Upbit 현재 티커. 요청 URL 길이 제한 때문에 나눠서 조회합니다.
    pub async fn fetch_upbit_tickers(&self, codes: &[String]) -> ExchangeResult<Vec<MarketTicker>> {
        let url = format!("{}/v1/ticker", self.upbit_url);
        let mut tickers = Vec::with_capacity(codes.len());

        for chunk in codes.chunks(UPBIT_TICKER_CHUNK) {
            let markets = chunk.join(",");
            let updates: Vec<TickerUpdate> = get_json(&self.client, &url, &[("markets", markets.as_str())]).await?;

            tickers.extend(updates.into_iter().filter_map(|update| {
                let mut ticker = MarketTicker::new(update.code.clone()?);
                ticker.apply(&update);
                Some(ticker)
            }));
        }

        Ok(tickers)
    }

    /// Binance USDT 마켓 24시간 시세.
    pub async fn fetch_binance_quotes(&self) -> ExchangeResult<Vec<BinanceQuote>> {
        let url = format!("{}/api/v3/ticker/24hr", self.binance_url);
        let rows: Vec<Ticker24hr> = get_json(&self.client, &url, &[]).await?;

        Ok(rows
            .into_iter()
            .filter(|row| row.symbol.ends_with(BINANCE_QUOTE_ASSET))
            .map(|row| BinanceQuote {
                symbol: row.symbol,
                price: row.last_price,
                quote_volume: row.quote_volume,
                event_time: row.close_time.and_then(DateTime::from_timestamp_millis),
            })
            .collect())
    }

    /// 초기 스냅샷을 조회합니다.
    ///
    /// `codes`가 비어 있으면 전체 원화 마켓을 대상으로 합니다. 마켓 목록 조회 실패만
    /// 에러이고, 티커/Binance 시세 조회 실패는 빈 값으로 두고 스트림에 맡깁니다.
    pub async fn seed(&self, codes: &[String], forex: Option<ForexRate>) -> ExchangeResult<MarketSeed> {
        let catalog = MarketCatalog::new(self.fetch_markets().await?);

        let codes: Vec<String> = if codes.is_empty() {
            catalog.krw_markets()
        } else {
            codes.iter().filter(|c| is_krw_market(c)).cloned().collect()
        };

        let tickers = match self.fetch_upbit_tickers(&codes).await {
            Ok(tickers) => tickers,
            Err(e) => {
                warn!(error = %e, "Upbit 티커 스냅샷 실패, 스트림 값으로 채움");
                codes.iter().map(MarketTicker::new).collect()
            }
        };

        let quotes = match self.fetch_binance_quotes().await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(error = %e, "Binance 시세 스냅샷 실패, 프리미엄은 스트림 수신 후 표시");
                Vec::new()
            }
        };

        info!(
            markets = catalog.len(),
            tickers = tickers.len(),
            quotes = quotes.len(),
            forex = forex.is_some(),
            "초기 스냅샷 조회 완료"
        );

        Ok(MarketSeed {
            catalog,
            tickers,
            quotes,
            forex,
        })
    }
}
