//! # Kimp Core
//!
//! 김치 프리미엄 시세판의 핵심 도메인 모델과 집계 로직을 제공합니다.
//!
//! 이 크레이트는 네트워크와 타이머에 의존하지 않는 순수 로직만 담습니다:
//! - Upbit 티커 / Binance 시세 / 환율 데이터 모델
//! - Upbit 마켓 코드 ↔ Binance 심볼 매핑
//! - 메시지 버퍼 (심볼별 last-write-wins 병합)
//! - 거래소 간 병합 및 프리미엄 계산
//! - 게시 상태 (구독/스냅샷)
//! - 정렬/필터 뷰와 즐겨찾기
//! - 설정 관리 및 로깅 인프라

pub mod buffer;
pub mod config;
pub mod domain;
pub mod error;
pub mod favorites;
pub mod logging;
pub mod state;
pub mod types;
pub mod view;

pub use buffer::*;
pub use config::*;
pub use domain::*;
pub use error::*;
pub use favorites::Favorites;
pub use logging::*;
pub use state::*;
pub use types::*;
pub use view::*;
