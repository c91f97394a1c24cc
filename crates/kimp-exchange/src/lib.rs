//! 거래소 스트림 연결과 시세 집계.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - StreamConnection: 재연결과 무응답 감지를 하는 WebSocket 연결
//! - Upbit / Binance 스트림 프로토콜
//! - FlushScheduler: 버퍼를 고정 주기로 비워 게시하는 타이머
//! - 환율 조회 태스크와 REST 초기 스냅샷
//! - MarketAggregator: 위 구성 요소를 묶은 열기/닫기 단위

pub mod aggregator;
pub mod connection;
pub mod error;
pub mod flush;
pub mod forex;
mod http;
pub mod protocol;
pub mod rest;

pub use aggregator::{ConnectionStates, MarketAggregator};
pub use connection::{ConnectionOptions, ConnectionState, Handler, StreamConnection};
pub use error::*;
pub use flush::{shared_buffer, FlushHandle, FlushScheduler, SharedBuffer};
pub use forex::{ForexClient, ForexPoller, RateSource};
pub use protocol::{BinanceProtocol, StreamProtocol, UpbitProtocol};
pub use rest::{MarketSeed, SnapshotClient};
