//! 설정 관리.
//!
//! 모든 필드에 기본값이 있으므로 설정 파일이 없어도 동작합니다.
//! 환경 변수 `KIMP__섹션__키`로 개별 값을 덮어쓸 수 있습니다
//! (예: `KIMP__UPBIT__FLUSH_INTERVAL_MS=50`).

use crate::types::BinanceStreamKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// Upbit 설정
    pub upbit: UpbitConfig,
    /// Binance 설정
    pub binance: BinanceConfig,
    /// 환율 조회 설정
    pub forex: ForexConfig,
    /// 연결 유지 설정
    pub connection: ConnectionConfig,
    /// 화면 설정
    pub view: ViewConfig,
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Upbit 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpbitConfig {
    /// WebSocket URL
    pub ws_url: String,
    /// REST API 기본 URL
    pub rest_url: String,
    /// 버퍼 플러시 주기 (밀리초)
    pub flush_interval_ms: u64,
    /// 구독할 마켓 코드. 비어 있으면 전체 원화 마켓
    pub codes: Vec<String>,
}

impl Default for UpbitConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://api.upbit.com/websocket/v1".to_string(),
            rest_url: "https://api.upbit.com".to_string(),
            flush_interval_ms: 100,
            codes: Vec::new(),
        }
    }
}

impl UpbitConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Binance 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BinanceConfig {
    /// 결합 스트림 WebSocket URL
    pub ws_url: String,
    /// REST API 기본 URL
    pub rest_url: String,
    /// 버퍼 플러시 주기 (밀리초)
    pub flush_interval_ms: u64,
    /// 구독 스트림 종류
    pub stream: BinanceStreamKind,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://stream.binance.com:9443/stream".to_string(),
            rest_url: "https://api.binance.com".to_string(),
            flush_interval_ms: 300,
            stream: BinanceStreamKind::Ticker,
        }
    }
}

impl BinanceConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// 원/달러 환율 조회 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForexConfig {
    /// 환율 API URL
    pub url: String,
    /// 조회 주기 (초)
    pub poll_interval_secs: u64,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for ForexConfig {
    fn default() -> Self {
        Self {
            url: "https://quotation-api-cdn.dunamu.com/v1/forex/recent?codes=FRX.KRWUSD".to_string(),
            poll_interval_secs: 60,
            timeout_secs: 10,
        }
    }
}

impl ForexConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// 재연결 정책.
///
/// 기본값은 1초 고정 지연, 무제한 재시도입니다.
/// 지수 백오프는 명시적으로 선택해야 합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// 고정 지연
    Fixed { delay_ms: u64 },
    /// 지수 백오프 (base * 2^attempt, 최대 max)
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed { delay_ms: 1000 }
    }
}

impl ReconnectPolicy {
    /// `attempt`번째(0부터) 재연결 전 대기 시간.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential { base_ms, max_ms } => {
                let factor = 1u64 << attempt.min(20);
                Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }
}

/// 연결 유지 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// 재연결 정책
    pub reconnect: ReconnectPolicy,
    /// 상태 점검 주기 (밀리초)
    pub health_check_interval_ms: u64,
    /// 이 시간 동안 프레임이 없으면 끊긴 것으로 간주 (밀리초)
    pub stale_after_ms: u64,
    /// 클라이언트 Ping 주기 (밀리초)
    pub ping_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            health_check_interval_ms: 5_000,
            stale_after_ms: 30_000,
            ping_interval_ms: 30_000,
        }
    }
}

impl ConnectionConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

/// 화면 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewConfig {
    /// 정렬 재계산 주기 (밀리초)
    pub refresh_interval_ms: u64,
    /// 즐겨찾기 저장 경로
    pub favorites_path: String,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 3_000,
            favorites_path: "data/favorites.json".to_string(),
        }
    }
}

impl ViewConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다. 파일이 없으면 기본값을 씁니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("KIMP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_observed_behavior() {
        let config = AppConfig::default();
        assert_eq!(config.upbit.flush_interval(), Duration::from_millis(100));
        assert_eq!(config.binance.flush_interval(), Duration::from_millis(300));
        assert_eq!(config.connection.reconnect, ReconnectPolicy::Fixed { delay_ms: 1000 });
        assert_eq!(config.connection.health_check_interval(), Duration::from_secs(5));
        assert_eq!(config.forex.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.view.refresh_interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_fixed_delay_never_grows() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(50), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = ReconnectPolicy::Exponential {
            base_ms: 500,
            max_ms: 10_000,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.upbit.flush_interval_ms, 100);
        assert_eq!(config.binance.stream, BinanceStreamKind::Ticker);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/default.toml");
        let config = AppConfig::load(path).unwrap();
        let defaults = AppConfig::default();

        assert_eq!(config.upbit.ws_url, defaults.upbit.ws_url);
        assert_eq!(config.binance.flush_interval_ms, defaults.binance.flush_interval_ms);
        assert_eq!(config.forex.url, defaults.forex.url);
        assert_eq!(config.connection.reconnect, defaults.connection.reconnect);
        assert_eq!(config.view.favorites_path, defaults.view.favorites_path);
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kimp.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[upbit]
flush_interval_ms = 50
codes = ["KRW-BTC"]

[binance]
stream = "AggTrade"

[connection.reconnect]
mode = "exponential"
base_ms = 1000
max_ms = 30000
"#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.upbit.flush_interval_ms, 50);
        assert_eq!(config.upbit.codes, vec!["KRW-BTC"]);
        assert_eq!(config.binance.stream, BinanceStreamKind::AggTrade);
        assert_eq!(config.binance.flush_interval_ms, 300);
        assert_eq!(
            config.connection.reconnect,
            ReconnectPolicy::Exponential {
                base_ms: 1000,
                max_ms: 30000
            }
        );
    }
}
