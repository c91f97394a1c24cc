//! 버퍼 → 병합기 → 게시 상태 → 정렬 뷰 통합 테스트
//!
//! 네트워크 없이 거래소 메시지 형태의 입력을 흘려 보내 화면이 받는 결과를 확인합니다.

use kimp_core::{
    BinanceQuote, CrossExchangeTicker, Favorites, ForexRate, MarketCatalog, MarketInfo, MarketTicker,
    Merger, MessageBuffer, PublishedMarketState, QuoteUpdate, SortColumn, SortDirection,
    SortFilterView, SortState, TickerUpdate, ViewQuery,
};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn simple_frame(code: &str, price: &str, volume: &str) -> TickerUpdate {
    let json = format!(
        r#"{{"ty":"ticker","cd":"{}","tp":{},"atp24h":{},"c":"RISE","st":"REALTIME"}}"#,
        code, price, volume
    );
    serde_json::from_str(&json).unwrap()
}

fn catalog() -> MarketCatalog {
    MarketCatalog::new(vec![
        MarketInfo::new("KRW-BTC", "비트코인", "Bitcoin"),
        MarketInfo::new("KRW-ETH", "이더리움", "Ethereum"),
        MarketInfo::new("KRW-NU", "누사이퍼", "NuCypher"),
    ])
}

/// Upbit 플러시 한 번에 해당하는 처리
fn flush_upbit(
    buffer: &mut MessageBuffer<MarketTicker>,
    merger: &Merger,
    forex: Option<&ForexRate>,
    state: &PublishedMarketState,
) {
    if let Some(drained) = buffer.drain_if_dirty() {
        let merged: HashMap<String, CrossExchangeTicker> = drained
            .into_iter()
            .map(|(code, ticker)| (code, merger.merge_ticker(ticker, forex)))
            .collect();
        state.update(merged);
    }
}

#[test]
fn test_burst_of_frames_publishes_once_with_latest_values() {
    let state = PublishedMarketState::new();
    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = notifications.clone();
    let _subscription = state.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut quotes: MessageBuffer<BinanceQuote> = MessageBuffer::new();
    quotes.apply(
        "BTCUSDT",
        &QuoteUpdate {
            price: Some(dec!(70000)),
            quote_volume: Some(dec!(1000)),
            event_time: None,
        },
    );
    let mut merger = Merger::new();
    merger.update_quotes(quotes.drain_if_dirty().unwrap().into_values());

    let forex = ForexRate::new(dec!(1300));
    let mut tickers: MessageBuffer<MarketTicker> = MessageBuffer::new();
    for price in ["99000000", "101000000", "100000000"] {
        tickers.apply("KRW-BTC", &simple_frame("KRW-BTC", price, "5000000000"));
    }
    tickers.apply("KRW-NU", &simple_frame("KRW-NU", "150", "1000"));

    flush_upbit(&mut tickers, &merger, Some(&forex), &state);
    // 새 메시지가 없으면 다음 플러시는 아무 일도 하지 않음
    flush_upbit(&mut tickers, &merger, Some(&forex), &state);

    assert_eq!(notifications.load(Ordering::SeqCst), 1);

    let snapshot = state.get_snapshot();
    let btc = &snapshot["KRW-BTC"];
    assert_eq!(btc.ticker.trade_price, dec!(100000000));
    assert_eq!(btc.premium, Some(dec!(9)));

    let nu = &snapshot["KRW-NU"];
    assert_eq!(nu.binance_symbol, None);
    assert_eq!(nu.premium, None);
}

#[test]
fn test_view_reflects_published_state() {
    let forex = ForexRate::new(dec!(1300));
    let merger = Merger::with_quotes(vec![BinanceQuote {
        symbol: "ETHUSDT".to_string(),
        price: dec!(2000),
        quote_volume: None,
        event_time: None,
    }]);

    let seed = ["KRW-BTC", "KRW-ETH", "KRW-NU"].map(|code| {
        let ticker = MarketTicker {
            trade_price: dec!(1000),
            ..MarketTicker::new(code)
        };
        merger.merge_ticker(ticker, Some(&forex))
    });
    let state = PublishedMarketState::seeded(seed);

    let mut view = SortFilterView::new(catalog());
    let by_premium = ViewQuery::new(SortState::new(SortColumn::Premium, SortDirection::Descending), "");

    // 프리미엄이 있는 ETH만 앞에, 나머지는 코드순
    let order = view.recompute(&state.get_snapshot(), &by_premium, &Favorites::new());
    assert_eq!(order, vec!["KRW-ETH", "KRW-BTC", "KRW-NU"]);

    let mut favorites = Favorites::new();
    favorites.toggle("KRW-NU");
    let order = view.recompute(&state.get_snapshot(), &by_premium, &favorites);
    assert_eq!(order, vec!["KRW-NU", "KRW-ETH", "KRW-BTC"]);

    let search = ViewQuery::new(SortState::default(), "bit");
    assert_eq!(
        view.recompute(&state.get_snapshot(), &search, &favorites),
        vec!["KRW-BTC"]
    );
}
