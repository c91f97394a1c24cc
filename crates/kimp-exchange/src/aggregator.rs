//! 시세 집계기.
//!
//! 두 거래소 연결, 거래소별 버퍼와 플러시 타이머, 환율 조회 태스크를 묶어
//! 하나의 [`PublishedMarketState`]에 게시합니다.
//!
//! ```text
//! Upbit WS   → MessageBuffer<MarketTicker> ─(100ms)→ merge ─┐
//! Binance WS → MessageBuffer<BinanceQuote> ─(300ms)→ 재병합 ─┼→ PublishedMarketState
//! 환율 조회  → watch<Option<ForexRate>> ──────(변경 시)→ 재병합 ─┘
//! ```
//!
//! 세 게시 경로는 병합기 잠금을 잡은 채 게시하므로 서로의 결과를 덮어쓰지 않습니다.
//! [`MarketAggregator::open`] 한 번에 [`MarketAggregator::close`] 한 번이 대응하고,
//! drop도 `close`를 호출합니다.

use crate::connection::{ConnectionOptions, ConnectionState, StreamConnection};
use crate::flush::{shared_buffer, FlushHandle, FlushScheduler};
use crate::forex::{ForexClient, ForexPoller, RateSource};
use crate::protocol::{BinanceProtocol, UpbitProtocol};
use crate::rest::MarketSeed;
use crate::ExchangeResult;
use kimp_core::{
    is_krw_market, to_binance_symbol, AppConfig, BinanceQuote, CrossExchangeTicker, ForexRate,
    MarketCatalog, MarketTicker, Merger, MessageBuffer, PublishedMarketState,
};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 거래소별 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStates {
    pub upbit: ConnectionState,
    pub binance: ConnectionState,
}

impl ConnectionStates {
    /// 두 연결이 모두 열려 있는지 확인합니다.
    pub fn all_open(&self) -> bool {
        self.upbit == ConnectionState::Open && self.binance == ConnectionState::Open
    }
}

type SharedMerger = Arc<Mutex<Merger>>;

/// 실시간 시세 집계기.
pub struct MarketAggregator {
    state: Arc<PublishedMarketState>,
    catalog: MarketCatalog,
    upbit: StreamConnection<UpbitProtocol>,
    binance: StreamConnection<BinanceProtocol>,
    upbit_flush: FlushHandle,
    binance_flush: FlushHandle,
    forex: ForexPoller,
    forex_watch: CancellationToken,
    forex_task: Option<JoinHandle<()>>,
    closed: AtomicBool,
}

impl MarketAggregator {
    /// 설정의 환율 API를 사용해 집계를 시작합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn open(config: &AppConfig, seed: MarketSeed) -> ExchangeResult<Self> {
        let client = ForexClient::new(&config.forex)?;
        Ok(Self::open_with(config, seed, client))
    }

    /// 환율 공급원을 지정해 집계를 시작합니다.
    pub fn open_with<S>(config: &AppConfig, seed: MarketSeed, rate_source: S) -> Self
    where
        S: RateSource + 'static,
    {
        let MarketSeed {
            catalog,
            tickers,
            quotes,
            forex,
        } = seed;

        let codes = subscription_codes(config, &catalog, &tickers);
        let symbols = binance_symbols(&codes, &quotes);

        let merger: SharedMerger = Arc::new(Mutex::new(Merger::with_quotes(quotes.iter().cloned())));
        let state = {
            let merger = lock(&merger);
            Arc::new(PublishedMarketState::seeded(
                tickers
                    .iter()
                    .map(|ticker| merger.merge_ticker(ticker.clone(), forex.as_ref())),
            ))
        };

        let applied_rate = forex.as_ref().map(|rate| rate.base_price);
        let forex_poller = ForexPoller::spawn(rate_source, config.forex.poll_interval(), forex);
        let forex_rx = forex_poller.subscribe();

        // Upbit: 티커 버퍼 → 병합 → 게시
        let upbit_buffer = shared_buffer(MessageBuffer::with_records(
            tickers.into_iter().map(|ticker| (ticker.code.clone(), ticker)),
        ));
        let upbit_flush = FlushScheduler::start(config.upbit.flush_interval(), upbit_buffer.clone(), {
            let state = state.clone();
            let merger = merger.clone();
            let forex = forex_rx.clone();
            move |tickers: HashMap<String, MarketTicker>| publish_tickers(&state, &merger, &forex, tickers)
        });

        // Binance: 시세 캐시 갱신 → 바뀐 심볼에 매핑된 게시 티커만 재병합
        let binance_buffer = shared_buffer(MessageBuffer::with_records(
            quotes.into_iter().map(|quote| (quote.symbol.clone(), quote)),
        ));
        let binance_flush = FlushScheduler::start(config.binance.flush_interval(), binance_buffer.clone(), {
            let state = state.clone();
            let merger = merger.clone();
            let forex = forex_rx.clone();
            move |quotes: HashMap<String, BinanceQuote>| publish_quotes(&state, &merger, &forex, quotes)
        });

        // 환율: 값이 바뀌면 전체 재병합
        let forex_watch = CancellationToken::new();
        let forex_task = tokio::spawn(watch_forex(
            forex_rx,
            state.clone(),
            merger,
            applied_rate,
            forex_watch.clone(),
        ));

        let options = ConnectionOptions::from(&config.connection);
        let upbit = StreamConnection::new(
            UpbitProtocol::new(config.upbit.ws_url.clone(), codes.clone()),
            options.clone(),
        );
        let binance = StreamConnection::new(
            BinanceProtocol::new(config.binance.ws_url.clone(), symbols, config.binance.stream),
            options,
        );

        upbit.connect(move |(code, update)| {
            upbit_buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .apply(&code, &update);
        });
        binance.connect(move |(symbol, update)| {
            binance_buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .apply(&symbol, &update);
        });

        info!(
            codes = codes.len(),
            streams = binance.protocol().streams().len(),
            seeded = state.get_snapshot().len(),
            "시세 집계 시작"
        );

        Self {
            state,
            catalog,
            upbit,
            binance,
            upbit_flush,
            binance_flush,
            forex: forex_poller,
            forex_watch,
            forex_task: Some(forex_task),
            closed: AtomicBool::new(false),
        }
    }

    /// 게시 상태.
    pub fn state(&self) -> Arc<PublishedMarketState> {
        self.state.clone()
    }

    /// 마켓 목록.
    pub fn catalog(&self) -> &MarketCatalog {
        &self.catalog
    }

    /// 연결 상태 표시등.
    pub fn connection_states(&self) -> ConnectionStates {
        ConnectionStates {
            upbit: self.upbit.state(),
            binance: self.binance.state(),
        }
    }

    pub fn upbit(&self) -> &StreamConnection<UpbitProtocol> {
        &self.upbit
    }

    pub fn binance(&self) -> &StreamConnection<BinanceProtocol> {
        &self.binance
    }

    /// 최신 환율.
    pub fn forex(&self) -> Option<ForexRate> {
        self.forex.latest()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 모든 연결과 타이머를 멈춥니다. 두 번째 호출부터는 아무것도 하지 않습니다.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.upbit.disconnect();
        self.binance.disconnect();
        self.upbit_flush.cancel();
        self.binance_flush.cancel();
        self.forex.stop();
        self.forex_watch.cancel();

        info!("시세 집계 종료");
    }

    /// 닫고 백그라운드 태스크 종료까지 기다립니다.
    pub async fn shutdown(mut self) {
        self.close();
        self.upbit.shutdown().await;
        self.binance.shutdown().await;
        if let Some(task) = self.forex_task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MarketAggregator {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MarketAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketAggregator")
            .field("connections", &self.connection_states())
            .field("version", &self.state.version())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 구독할 Upbit 마켓 코드. 설정이 비어 있으면 시드 티커, 그마저 없으면 마켓 목록 전체.
fn subscription_codes(config: &AppConfig, catalog: &MarketCatalog, tickers: &[MarketTicker]) -> Vec<String> {
    let codes: BTreeSet<String> = if !config.upbit.codes.is_empty() {
        config.upbit.codes.iter().cloned().collect()
    } else if !tickers.is_empty() {
        tickers.iter().map(|t| t.code.clone()).collect()
    } else {
        catalog.krw_markets().into_iter().collect()
    };

    codes.into_iter().filter(|code| is_krw_market(code)).collect()
}

/// 구독할 Binance 심볼. 시드 시세가 있으면 실제 상장된 심볼로 제한합니다.
fn binance_symbols(codes: &[String], quotes: &[BinanceQuote]) -> Vec<String> {
    let listed: HashSet<&str> = quotes.iter().map(|q| q.symbol.as_str()).collect();

    codes
        .iter()
        .filter_map(|code| to_binance_symbol(code))
        .filter(|symbol| listed.is_empty() || listed.contains(symbol.as_str()))
        .collect()
}

fn lock(merger: &SharedMerger) -> std::sync::MutexGuard<'_, Merger> {
    merger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Upbit 플러시: 티커를 병합해 게시합니다.
///
/// 환율은 병합기 잠금을 잡은 뒤에 읽어야 환율 재병합과 엇갈려도 옛 환율로 덮어쓰지 않습니다.
fn publish_tickers(
    state: &PublishedMarketState,
    merger: &SharedMerger,
    forex: &watch::Receiver<Option<ForexRate>>,
    tickers: HashMap<String, MarketTicker>,
) {
    let merger = lock(merger);
    let rate = forex.borrow().clone();
    let merged = tickers
        .into_iter()
        .map(|(code, ticker)| (code, merger.merge_ticker(ticker, rate.as_ref())))
        .collect();
    state.update(merged);
}

/// Binance 플러시: 시세 캐시를 갱신하고 바뀐 심볼에 매핑된 티커만 재병합합니다.
fn publish_quotes(
    state: &PublishedMarketState,
    merger: &SharedMerger,
    forex: &watch::Receiver<Option<ForexRate>>,
    quotes: HashMap<String, BinanceQuote>,
) {
    let mut merger = lock(merger);
    let changed = merger.update_quotes(quotes.into_values());
    if changed.is_empty() {
        return;
    }
    let rate = forex.borrow().clone();
    let remerged = remerge(state, &merger, rate.as_ref(), |ticker| {
        ticker
            .binance_symbol
            .as_ref()
            .is_some_and(|symbol| changed.contains(symbol))
    });
    state.update(remerged);
}

/// 게시된 티커 중 `filter`에 맞는 것을 다시 병합합니다.
fn remerge<F>(
    state: &PublishedMarketState,
    merger: &Merger,
    rate: Option<&ForexRate>,
    filter: F,
) -> HashMap<String, CrossExchangeTicker>
where
    F: Fn(&CrossExchangeTicker) -> bool,
{
    state
        .get_snapshot()
        .values()
        .filter(|ticker| filter(ticker))
        .map(|ticker| {
            (
                ticker.code().to_string(),
                merger.merge_ticker(ticker.ticker.clone(), rate),
            )
        })
        .collect()
}

/// 환율이 바뀔 때마다 매핑된 티커를 재병합합니다.
///
/// 조회 시각만 다르고 환율 값이 같으면 건너뜁니다.
async fn watch_forex(
    mut rx: watch::Receiver<Option<ForexRate>>,
    state: Arc<PublishedMarketState>,
    merger: SharedMerger,
    mut applied: Option<Decimal>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let merger = lock(&merger);
                let rate = rx.borrow_and_update().clone();
                let base_price = rate.as_ref().map(|r| r.base_price);
                if base_price == applied {
                    continue;
                }
                applied = base_price;

                let remerged = remerge(&state, &merger, rate.as_ref(), |ticker| ticker.binance_symbol.is_some());
                debug!(tickers = remerged.len(), rate = ?base_price, "환율 변경, 재병합");
                state.update(remerged);
            }
        }
    }
}
