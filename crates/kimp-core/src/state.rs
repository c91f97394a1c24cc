//! 게시 상태.
//!
//! 화면이 렌더링하는 단일 진실 공급원(마켓 코드 → 병합 티커)입니다.
//! 전역 싱글톤이 아니라 생성해서 주입하는 객체이므로 테스트마다 독립 인스턴스를 쓸 수 있습니다.
//!
//! # 갱신 규칙
//!
//! - `update`는 기존 상태에 얕게 병합합니다. 전달되지 않은 심볼은 그대로 남습니다.
//! - 바꾸지 않은 항목은 같은 `Arc`를 유지하므로 `Arc::ptr_eq`로 변경 여부를 판단할 수 있습니다.
//! - 구독자는 `update` 호출당 정확히 한 번 알림을 받습니다 (심볼마다가 아님).
//! - 가격 움직임(`last_move`)은 Upbit 현재가가 바뀔 때만 갱신됩니다.

use crate::domain::CrossExchangeTicker;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tracing::debug;

/// 마켓 코드 → 병합 티커 스냅샷.
pub type MarketSnapshot = Arc<HashMap<String, Arc<CrossExchangeTicker>>>;

/// 직전 값 대비 가격 움직임 (변경 하이라이트용).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceMove {
    Up,
    Down,
    #[default]
    Flat,
}

/// 심볼별 변경 신호.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbolRevision {
    /// 이 심볼이 갱신된 횟수
    pub revision: u64,
    /// 마지막으로 Upbit 가격이 바뀐 방향
    pub last_move: PriceMove,
    /// 마지막 갱신이 일어난 상태 버전
    pub version: u64,
}

/// 구독자에게 전달되는 변경 알림.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// 갱신 후 스냅샷
    pub snapshot: MarketSnapshot,
    /// 이번 갱신에서 바뀐 마켓 코드 (코드순)
    pub changed: Vec<String>,
    /// 상태 버전 (갱신마다 1 증가)
    pub version: u64,
}

type Listener = Arc<dyn Fn(&StateChange) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

struct Inner {
    snapshot: MarketSnapshot,
    revisions: HashMap<String, SymbolRevision>,
    version: u64,
}

/// 외부에 게시되는 시세 상태.
pub struct PublishedMarketState {
    inner: RwLock<Inner>,
    registry: Arc<Mutex<ListenerRegistry>>,
}

impl Default for PublishedMarketState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PublishedMarketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("PublishedMarketState")
            .field("symbols", &inner.snapshot.len())
            .field("version", &inner.version)
            .finish()
    }
}

impl PublishedMarketState {
    /// 빈 상태를 생성합니다.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                snapshot: Arc::new(HashMap::new()),
                revisions: HashMap::new(),
                version: 0,
            }),
            registry: Arc::new(Mutex::new(ListenerRegistry::default())),
        }
    }

    /// 서버 스냅샷으로 동기적으로 초기화된 상태를 생성합니다.
    ///
    /// 구독자가 붙기 전에 채워지므로 첫 화면이 빈 표가 되지 않습니다.
    pub fn seeded(initial: impl IntoIterator<Item = CrossExchangeTicker>) -> Self {
        let snapshot: HashMap<String, Arc<CrossExchangeTicker>> = initial
            .into_iter()
            .map(|t| (t.ticker.code.clone(), Arc::new(t)))
            .collect();

        let state = Self::new();
        {
            let mut inner = state.inner.write().unwrap_or_else(PoisonError::into_inner);
            inner.snapshot = Arc::new(snapshot);
        }
        state
    }

    /// 현재 스냅샷을 반환합니다. `Arc` 복제이므로 비용이 작습니다.
    pub fn get_snapshot(&self) -> MarketSnapshot {
        self.read().snapshot.clone()
    }

    /// 단일 심볼을 조회합니다.
    pub fn get(&self, code: &str) -> Option<Arc<CrossExchangeTicker>> {
        self.read().snapshot.get(code).cloned()
    }

    /// 현재 상태 버전.
    pub fn version(&self) -> u64 {
        self.read().version
    }

    /// 심볼별 변경 신호를 조회합니다.
    pub fn revision(&self, code: &str) -> Option<SymbolRevision> {
        self.read().revisions.get(code).copied()
    }

    /// 부분 상태를 얕게 병합하고 구독자에게 한 번 알립니다.
    ///
    /// 기존 값과 같은 항목은 건너뛰고 기존 `Arc`를 유지합니다. 바뀐 항목이 하나도
    /// 없으면 버전을 올리지 않고 알림도 보내지 않습니다.
    pub fn update(&self, partial: HashMap<String, CrossExchangeTicker>) {
        if partial.is_empty() {
            return;
        }

        let change = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            let version = inner.version + 1;

            let mut next: HashMap<String, Arc<CrossExchangeTicker>> = (*inner.snapshot).clone();
            let mut changed = Vec::with_capacity(partial.len());

            for (code, ticker) in partial {
                let prev_price = match next.get(&code) {
                    Some(prev) if **prev == ticker => continue,
                    Some(prev) => Some(prev.ticker.trade_price),
                    None => None,
                };

                let revision = inner.revisions.entry(code.clone()).or_default();
                revision.revision += 1;
                revision.version = version;
                // 가격이 그대로인 재병합은 직전 움직임을 유지
                match prev_price {
                    Some(prev) if ticker.ticker.trade_price > prev => revision.last_move = PriceMove::Up,
                    Some(prev) if ticker.ticker.trade_price < prev => revision.last_move = PriceMove::Down,
                    Some(_) => {}
                    None => revision.last_move = PriceMove::Flat,
                }

                next.insert(code.clone(), Arc::new(ticker));
                changed.push(code);
            }

            if changed.is_empty() {
                return;
            }
            changed.sort();

            inner.snapshot = Arc::new(next);
            inner.version = version;

            StateChange {
                snapshot: inner.snapshot.clone(),
                changed,
                version,
            }
        };

        debug!(
            version = change.version,
            changed = change.changed.len(),
            "게시 상태 갱신"
        );
        self.notify(&change);
    }

    /// 변경 알림을 구독합니다.
    ///
    /// 반환된 [`Subscription`]을 `unsubscribe`하거나 drop하면 구독이 해제됩니다.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// 현재 구독자 수.
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }

    fn notify(&self, change: &StateChange) {
        // 콜백 안에서 구독 해제가 가능하도록 잠금 밖에서 호출
        let listeners: Vec<Listener> = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        for listener in listeners {
            listener(change);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 구독 핸들. drop 시 자동으로 구독을 해제합니다.
#[must_use = "Subscription을 버리면 즉시 구독이 해제됩니다"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<ListenerRegistry>>,
}

impl Subscription {
    /// 구독을 해제합니다.
    pub fn unsubscribe(self) {
        // Drop에서 처리
    }

    fn detach(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketTicker;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(code: &str, price: Decimal) -> CrossExchangeTicker {
        CrossExchangeTicker {
            ticker: MarketTicker {
                trade_price: price,
                ..MarketTicker::new(code)
            },
            ..Default::default()
        }
    }

    fn partial(entries: Vec<CrossExchangeTicker>) -> HashMap<String, CrossExchangeTicker> {
        entries
            .into_iter()
            .map(|e| (e.ticker.code.clone(), e))
            .collect()
    }

    #[test]
    fn test_seeded_state_is_available_before_subscribe() {
        let state = PublishedMarketState::seeded(vec![entry("KRW-BTC", dec!(1))]);
        assert_eq!(state.get_snapshot().len(), 1);
        assert_eq!(state.version(), 0);
    }

    #[test]
    fn test_batch_update_notifies_once() {
        let state = PublishedMarketState::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let _sub = state.subscribe(move |change| {
            assert_eq!(change.changed.len(), 50);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let batch = (0..50)
            .map(|i| entry(&format!("KRW-C{:02}", i), Decimal::from(i + 1)))
            .collect();
        state.update(partial(batch));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.get_snapshot().len(), 50);
    }

    #[test]
    fn test_update_retains_untouched_entries_by_reference() {
        let state = PublishedMarketState::seeded(vec![entry("KRW-BTC", dec!(1)), entry("KRW-ETH", dec!(2))]);
        let before = state.get_snapshot();

        state.update(partial(vec![entry("KRW-ETH", dec!(3))]));
        let after = state.get_snapshot();

        assert!(Arc::ptr_eq(&before["KRW-BTC"], &after["KRW-BTC"]));
        assert!(!Arc::ptr_eq(&before["KRW-ETH"], &after["KRW-ETH"]));
        assert_eq!(after["KRW-ETH"].ticker.trade_price, dec!(3));
        // 이전 스냅샷은 변하지 않음
        assert_eq!(before["KRW-ETH"].ticker.trade_price, dec!(2));
    }

    #[test]
    fn test_empty_update_is_silent() {
        let state = PublishedMarketState::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let _sub = state.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        state.update(HashMap::new());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.version(), 0);
    }

    #[test]
    fn test_dropped_subscription_stops_notifications() {
        let state = PublishedMarketState::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let sub = state.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(state.subscriber_count(), 1);

        state.update(partial(vec![entry("KRW-BTC", dec!(1))]));
        sub.unsubscribe();
        state.update(partial(vec![entry("KRW-BTC", dec!(2))]));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.subscriber_count(), 0);
    }

    #[test]
    fn test_revision_tracks_price_moves() {
        let state = PublishedMarketState::seeded(vec![entry("KRW-BTC", dec!(100))]);
        assert!(state.revision("KRW-BTC").is_none());

        state.update(partial(vec![entry("KRW-BTC", dec!(101))]));
        let rev = state.revision("KRW-BTC").unwrap();
        assert_eq!(rev.revision, 1);
        assert_eq!(rev.last_move, PriceMove::Up);

        state.update(partial(vec![entry("KRW-BTC", dec!(99))]));
        let rev = state.revision("KRW-BTC").unwrap();
        assert_eq!(rev.revision, 2);
        assert_eq!(rev.last_move, PriceMove::Down);
        assert_eq!(rev.version, 2);
    }

    #[test]
    fn test_remerge_with_same_price_keeps_move() {
        let state = PublishedMarketState::seeded(vec![entry("KRW-BTC", dec!(100))]);
        state.update(partial(vec![entry("KRW-BTC", dec!(110))]));

        // 가격은 그대로, 프리미엄만 바뀐 재병합
        let mut remerged = entry("KRW-BTC", dec!(110));
        remerged.premium = Some(dec!(9));
        state.update(partial(vec![remerged]));

        let rev = state.revision("KRW-BTC").unwrap();
        assert_eq!(rev.revision, 2);
        assert_eq!(rev.last_move, PriceMove::Up);
        assert_eq!(state.get("KRW-BTC").unwrap().premium, Some(dec!(9)));
    }

    #[test]
    fn test_identical_update_is_silent() {
        let state = PublishedMarketState::seeded(vec![entry("KRW-BTC", dec!(100))]);
        let before = state.get_snapshot();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let _sub = state.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        state.update(partial(vec![entry("KRW-BTC", dec!(100))]));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.version(), 0);
        assert!(state.revision("KRW-BTC").is_none());
        assert!(Arc::ptr_eq(&before, &state.get_snapshot()));
    }
}
