//! 주기적 버퍼 플러시.
//!
//! 고정 주기마다 버퍼를 확인해 바뀐 레코드가 있을 때만 `on_flush`를 호출합니다.
//! 주기가 짧을수록 지연은 줄고 게시 횟수는 늘어나므로 거래소별 설정으로 둡니다.

use kimp_core::{Coalesce, MessageBuffer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// 여러 태스크가 함께 쓰는 메시지 버퍼.
pub type SharedBuffer<R> = Arc<Mutex<MessageBuffer<R>>>;

/// 공유 버퍼를 생성합니다.
pub fn shared_buffer<R: Coalesce>(buffer: MessageBuffer<R>) -> SharedBuffer<R> {
    Arc::new(Mutex::new(buffer))
}

/// 플러시 타이머 시작기.
pub struct FlushScheduler;

impl FlushScheduler {
    /// 플러시 타이머를 시작합니다. 첫 플러시는 `interval` 뒤입니다.
    ///
    /// 반환된 핸들을 취소하거나 drop하면 타이머가 멈춥니다.
    pub fn start<R, F>(interval: Duration, buffer: SharedBuffer<R>, mut on_flush: F) -> FlushHandle
    where
        R: Coalesce + Send + 'static,
        F: FnMut(HashMap<String, R>) + Send + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // 잠금은 비우는 동안만 유지
                        let drained = buffer
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .drain_if_dirty();

                        if let Some(records) = drained {
                            trace!(records = records.len(), "버퍼 플러시");
                            on_flush(records);
                        }
                    }
                }
            }
        });

        FlushHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// 실행 중인 플러시 타이머 핸들.
#[must_use = "FlushHandle을 버리면 타이머가 즉시 멈춥니다"]
pub struct FlushHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FlushHandle {
    /// 타이머를 멈춥니다. 여러 번 호출해도 안전합니다.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 타이머를 멈추고 진행 중인 플러시가 끝날 때까지 기다립니다.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for FlushHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for FlushHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kimp_core::{MarketTicker, TickerUpdate};
    use rust_decimal_macros::dec;

    fn price_update(price: rust_decimal::Decimal) -> TickerUpdate {
        TickerUpdate {
            trade_price: Some(price),
            ..Default::default()
        }
    }

    fn collector() -> (Arc<Mutex<Vec<HashMap<String, MarketTicker>>>>, impl FnMut(HashMap<String, MarketTicker>) + Send + 'static) {
        let flushes = Arc::new(Mutex::new(Vec::new()));
        let sink = flushes.clone();
        (flushes, move |records| sink.lock().unwrap().push(records))
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_buffer_does_not_flush() {
        let buffer = shared_buffer(MessageBuffer::<MarketTicker>::new());
        let (flushes, on_flush) = collector();
        let _handle = FlushScheduler::start(Duration::from_millis(100), buffer, on_flush);

        tokio::time::sleep(Duration::from_millis(550)).await;
        assert!(flushes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_latest_value_once_per_interval() {
        let buffer = shared_buffer(MessageBuffer::<MarketTicker>::new());
        let (flushes, on_flush) = collector();
        let _handle = FlushScheduler::start(Duration::from_millis(100), buffer.clone(), on_flush);

        {
            let mut buffer = buffer.lock().unwrap();
            buffer.apply("KRW-BTC", &price_update(dec!(1)));
            buffer.apply("KRW-BTC", &price_update(dec!(2)));
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        {
            let flushes = flushes.lock().unwrap();
            assert_eq!(flushes.len(), 1);
            assert_eq!(flushes[0]["KRW-BTC"].trade_price, dec!(2));
        }

        buffer.lock().unwrap().apply("KRW-ETH", &price_update(dec!(3)));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let flushes = flushes.lock().unwrap();
        assert_eq!(flushes.len(), 2);
        assert!(flushes[1].contains_key("KRW-ETH"));
        assert!(!flushes[1].contains_key("KRW-BTC"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_timer() {
        let buffer = shared_buffer(MessageBuffer::<MarketTicker>::new());
        let (flushes, on_flush) = collector();
        let handle = FlushScheduler::start(Duration::from_millis(100), buffer.clone(), on_flush);

        handle.cancel();
        assert!(handle.is_cancelled());
        buffer.lock().unwrap().apply("KRW-BTC", &price_update(dec!(1)));
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(flushes.lock().unwrap().is_empty());
        assert_eq!(buffer.lock().unwrap().dirty_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_timer() {
        let buffer = shared_buffer(MessageBuffer::<MarketTicker>::new());
        let (flushes, on_flush) = collector();
        drop(FlushScheduler::start(Duration::from_millis(100), buffer.clone(), on_flush));

        buffer.lock().unwrap().apply("KRW-BTC", &price_update(dec!(1)));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(flushes.lock().unwrap().is_empty());
    }
}
