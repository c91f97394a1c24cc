//! 원/달러 환율 조회.
//!
//! 환율은 느리게 변하므로 스트림이 아닌 주기적 HTTP 조회로 갱신합니다.
//! 조회에 실패하면 직전 환율을 유지합니다.

use crate::http::get_json;
use crate::{ExchangeError, ExchangeResult};
use async_trait::async_trait;
use kimp_core::{ForexConfig, ForexRate};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 환율 공급원.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// 최신 환율을 조회합니다.
    async fn fetch(&self) -> ExchangeResult<ForexRate>;
}

/// 환율 API 응답 행.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForexRow {
    base_price: Decimal,
}

/// 환율 HTTP 클라이언트.
#[derive(Debug, Clone)]
pub struct ForexClient {
    client: Client,
    url: String,
}

impl ForexClient {
    /// 설정으로 생성합니다.
    pub fn new(config: &ForexConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("kimp/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RateSource for ForexClient {
    async fn fetch(&self) -> ExchangeResult<ForexRate> {
        let rows: Vec<ForexRow> = get_json(&self.client, &self.url, &[]).await?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::ParseError("빈 환율 응답".to_string()))?;

        let rate = ForexRate::new(row.base_price);
        if !rate.is_valid() {
            return Err(ExchangeError::ParseError(format!(
                "유효하지 않은 환율: {}",
                row.base_price
            )));
        }

        debug!(base_price = %rate.base_price, "환율 조회");
        Ok(rate)
    }
}

/// 주기적 환율 조회 태스크.
///
/// 환율의 유일한 기록자입니다. 다른 구성 요소는 [`watch::Receiver`]로 읽기만 합니다.
pub struct ForexPoller {
    rate: watch::Receiver<Option<ForexRate>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ForexPoller {
    /// 조회 태스크를 시작합니다. 첫 조회는 즉시 실행됩니다.
    ///
    /// `initial`은 첫 조회가 끝나기 전까지 노출할 값입니다 (REST 시드 등).
    pub fn spawn<S>(source: S, interval: Duration, initial: Option<ForexRate>) -> Self
    where
        S: RateSource + 'static,
    {
        let (tx, rx) = watch::channel(initial);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let source = Arc::new(source);
        let interval = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let result = tokio::select! {
                            _ = token.cancelled() => break,
                            result = source.fetch() => result,
                        };

                        match result {
                            Ok(rate) => {
                                tx.send_replace(Some(rate));
                            }
                            Err(e) => {
                                warn!(error = %e, "환율 조회 실패, 직전 값 유지");
                            }
                        }
                    }
                }
            }

            debug!("환율 조회 태스크 종료");
        });

        info!(interval_secs = interval.as_secs(), "환율 조회 시작");
        Self {
            rate: rx,
            cancel,
            task: Some(task),
        }
    }

    /// 최신 환율.
    pub fn latest(&self) -> Option<ForexRate> {
        self.rate.borrow().clone()
    }

    /// 환율 변경을 구독합니다.
    pub fn subscribe(&self) -> watch::Receiver<Option<ForexRate>> {
        self.rate.clone()
    }

    /// 조회를 멈춥니다.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// 조회를 멈추고 태스크 종료를 기다립니다.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ForexPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 정해진 응답을 차례로 돌려주는 공급원
    struct ScriptedSource {
        responses: Mutex<Vec<ExchangeResult<ForexRate>>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RateSource for ScriptedSource {
        async fn fetch(&self) -> ExchangeResult<ForexRate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(ExchangeError::NetworkError("no more".into()))
            } else {
                responses.remove(0)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_previous_rate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            responses: Mutex::new(vec![
                Ok(ForexRate::new(dec!(1300))),
                Err(ExchangeError::Timeout("slow".into())),
                Ok(ForexRate::new(dec!(1310))),
            ]),
            calls: calls.clone(),
        };

        let poller = ForexPoller::spawn(source, Duration::from_secs(60), None);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(poller.latest().unwrap().base_price, dec!(1300));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(poller.latest().unwrap().base_price, dec!(1300));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(poller.latest().unwrap().base_price, dec!(1310));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_value_and_stop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            responses: Mutex::new(Vec::new()),
            calls: calls.clone(),
        };

        let poller = ForexPoller::spawn(source, Duration::from_secs(60), Some(ForexRate::new(dec!(1290))));
        let updates = poller.subscribe();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(poller.latest().unwrap().base_price, dec!(1290));

        poller.stop();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!updates.has_changed().unwrap_or(false));
    }

    #[tokio::test]
    async fn test_client_parses_forex_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/forex/recent")
            .match_query(mockito::Matcher::UrlEncoded("codes".into(), "FRX.KRWUSD".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"code":"FRX.KRWUSD","currencyCode":"USD","currencyName":"달러","country":"미국",
                "name":"미국 (USD/KRW)","date":"2024-01-02","time":"16:00:00","recurrenceCount":1,
                "basePrice":1301.5,"openingPrice":1298.0,"highPrice":1305.0,"lowPrice":1296.0,
                "change":"RISE","changePrice":3.5,"cashBuyingPrice":1324.27,"cashSellingPrice":1278.73,
                "ttBuyingPrice":1288.8,"ttSellingPrice":1314.2,"currencyUnit":1,"timestamp":1704178800000}]"#,
            )
            .create_async()
            .await;

        let config = ForexConfig {
            url: format!("{}/v1/forex/recent?codes=FRX.KRWUSD", server.url()),
            ..Default::default()
        };
        let rate = ForexClient::new(&config).unwrap().fetch().await.unwrap();

        assert_eq!(rate.base_price, dec!(1301.5));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_rejects_empty_and_error_responses() {
        let mut server = mockito::Server::new_async().await;
        let _empty = server.mock("GET", "/empty").with_status(200).with_body("[]").create_async().await;
        let _down = server.mock("GET", "/down").with_status(404).with_body("nope").create_async().await;

        let client = |path: &str| {
            ForexClient::new(&ForexConfig {
                url: format!("{}{}", server.url(), path),
                ..Default::default()
            })
            .unwrap()
        };

        assert!(matches!(
            client("/empty").fetch().await,
            Err(ExchangeError::ParseError(_))
        ));
        assert!(matches!(
            client("/down").fetch().await,
            Err(ExchangeError::ApiError { code: 404, .. })
        ));
    }
}
