//! REST 공통 처리.

use crate::{ExchangeError, ExchangeResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, warn};

/// 재시도 최대 횟수 (첫 시도 제외).
const MAX_RETRIES: u32 = 2;

/// 재시도 대기 상한. 요청 한도 초과 시 권장 대기(1분)를 그대로 쓰지 않습니다.
const MAX_RETRY_DELAY_MS: u64 = 5_000;

/// GET 요청 후 JSON 본문을 역직렬화합니다.
///
/// 재시도 가능한 에러는 [`ExchangeError::retry_delay_ms`]만큼 기다렸다가 다시 시도합니다.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
) -> ExchangeResult<T> {
    let mut attempt = 0;

    loop {
        match get_once(client, url, query).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                attempt += 1;
                let delay = e.retry_delay_ms().unwrap_or(1_000).min(MAX_RETRY_DELAY_MS);
                warn!(url, attempt, delay_ms = delay, error = %e, "요청 실패, 재시도");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn get_once<T: DeserializeOwned>(client: &Client, url: &str, query: &[(&str, &str)]) -> ExchangeResult<T> {
    let response = client.get(url).query(query).send().await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        error!(url, status = status.as_u16(), body = %body, "REST 요청 실패");
        return Err(ExchangeError::from_status(status.as_u16(), body));
    }

    debug!(url, bytes = body.len(), "REST 응답");
    Ok(serde_json::from_str(&body)?)
}
