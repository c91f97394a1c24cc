//! 실시간 시세판.
//!
//! REST 스냅샷으로 표를 채운 뒤 스트림을 열고, 설정한 주기마다 정렬을 다시 계산해
//! 터미널에 표를 다시 그립니다. 가격 자체는 매 플러시마다 게시되지만 순서는
//! 이 주기에만 바뀝니다.

use anyhow::{Context, Result};
use kimp_core::{
    init_logging, AppConfig, DecimalExt, Favorites, ForexRate, LogConfig, MarketCatalog,
    MarketSnapshot, PriceMove, PublishedMarketState, SortFilterView, SortState, StateChange,
    ViewQuery,
};
use kimp_exchange::{ConnectionStates, ForexClient, MarketAggregator, RateSource, SnapshotClient};
use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// 거래대금 표시 단위 (백만 원).
const VOLUME_UNIT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// watch 명령 설정.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// 설정 파일 경로
    pub config_path: PathBuf,
    /// 정렬 상태
    pub sort: SortState,
    /// 검색어
    pub search: String,
    /// 최대 표시 행 수 (0 = 전체)
    pub limit: usize,
}

/// 표 한 번을 그리는 데 필요한 입력.
pub struct Board<'a> {
    pub snapshot: &'a MarketSnapshot,
    pub order: &'a [String],
    pub catalog: &'a MarketCatalog,
    pub favorites: &'a Favorites,
    pub state: &'a PublishedMarketState,
    pub connections: ConnectionStates,
    pub forex: Option<&'a ForexRate>,
    pub limit: usize,
}

/// 시세판을 실행합니다. Ctrl-C로 종료합니다.
pub async fn run_watch(options: WatchOptions) -> Result<()> {
    let config = AppConfig::load(&options.config_path)
        .with_context(|| format!("설정을 읽을 수 없습니다: {}", options.config_path.display()))?;

    // 표는 stdout에 그리므로 로그는 stderr로
    init_logging(LogConfig::from(&config.logging).with_stderr(true))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    let forex_client = ForexClient::new(&config.forex)?;
    let initial_forex = match forex_client.fetch().await {
        Ok(rate) => Some(rate),
        Err(e) => {
            warn!(error = %e, "초기 환율 조회 실패, 프리미엄은 환율 수신 후 표시");
            None
        }
    };

    let snapshot_client = SnapshotClient::new(&config.upbit, &config.binance)?;
    let seed = snapshot_client
        .seed(&config.upbit.codes, initial_forex)
        .await
        .context("초기 스냅샷 조회 실패")?;

    let favorites = Favorites::load(&config.view.favorites_path).unwrap_or_else(|e| {
        warn!(error = %e, "즐겨찾기를 읽을 수 없어 빈 목록으로 시작");
        Favorites::new()
    });

    let mut view = SortFilterView::new(seed.catalog.clone());
    let query = ViewQuery::new(options.sort, options.search.clone());
    let aggregator = MarketAggregator::open_with(&config, seed, forex_client);
    let state = aggregator.state();

    let changes = Arc::new(AtomicU64::new(0));
    let subscription = state.subscribe({
        let changes = changes.clone();
        move |change: &StateChange| {
            changes.fetch_add(change.changed.len() as u64, Ordering::Relaxed);
        }
    });

    let mut refresh = tokio::time::interval(config.view.refresh_interval());
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(
        sort = %options.sort.column,
        search = %options.search,
        refresh_ms = config.view.refresh_interval_ms,
        "시세판 시작"
    );

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("종료 신호 수신");
                break;
            }
            _ = refresh.tick() => {
                let snapshot = state.get_snapshot();
                let order = view.recompute(&snapshot, &query, &favorites);
                let forex = aggregator.forex();

                let table = render_board(&Board {
                    snapshot: &snapshot,
                    order: &order,
                    catalog: view.catalog(),
                    favorites: &favorites,
                    state: &state,
                    connections: aggregator.connection_states(),
                    forex: forex.as_ref(),
                    limit: options.limit,
                });

                // 화면 지우고 처음부터
                print!("\x1b[2J\x1b[H{}", table);
                println!("갱신된 티커 누적: {}", changes.load(Ordering::Relaxed));
            }
        }
    }

    subscription.unsubscribe();
    aggregator.shutdown().await;
    Ok(())
}

/// 시세판 문자열을 만듭니다.
pub fn render_board(board: &Board<'_>) -> String {
    let mut out = String::new();

    let forex = board
        .forex
        .map(|rate| rate.base_price.to_krw_string())
        .unwrap_or_else(|| "-".to_string());
    let _ = writeln!(
        out,
        "Upbit: {}  Binance: {}  환율: {}  v{}",
        board.connections.upbit,
        board.connections.binance,
        forex,
        board.state.version()
    );
    let _ = writeln!(
        out,
        "{:<2}{:<12} {:<14} {:>16} {:>9} {:>9} {:>14} {:>12}",
        "", "코드", "이름", "현재가", "전일대비", "김프", "가격차", "거래대금(백만)"
    );

    let rows = if board.limit == 0 {
        board.order.len()
    } else {
        board.limit.min(board.order.len())
    };

    for code in &board.order[..rows] {
        let Some(ticker) = board.snapshot.get(code) else {
            continue;
        };

        let star = if board.favorites.contains(code) { "★" } else { "" };
        let name = board
            .catalog
            .get(code)
            .map(|info| info.korean_name.as_str())
            .unwrap_or("");
        let arrow = match board.state.revision(code).map(|r| r.last_move) {
            Some(PriceMove::Up) => "▲",
            Some(PriceMove::Down) => "▼",
            _ => " ",
        };
        let status = ticker.ticker.status();
        let flag = if status.caution {
            "!"
        } else if !status.active {
            "x"
        } else {
            ""
        };

        let premium = ticker
            .premium
            .map(|p| p.to_signed_percent_string())
            .unwrap_or_else(|| "-".to_string());
        let gap = ticker
            .price_gap
            .map(|g| g.to_krw_string())
            .unwrap_or_else(|| "-".to_string());
        let change = (ticker.ticker.signed_change_rate * Decimal::ONE_HUNDRED).to_signed_percent_string();
        let volume = (ticker.ticker.acc_trade_price_24h / VOLUME_UNIT).to_krw_string();

        let _ = writeln!(
            out,
            "{:<2}{:<12} {:<14} {:>15}{} {:>9} {:>9} {:>14} {:>12}",
            star,
            format!("{}{}", code, flag),
            name,
            ticker.ticker.trade_price.to_krw_string(),
            arrow,
            change,
            premium,
            gap,
            volume
        );
    }

    out
}
