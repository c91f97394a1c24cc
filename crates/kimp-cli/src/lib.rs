//! 김치 프리미엄 시세판 CLI.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 실시간 시세판 (`watch`)
//! - 즐겨찾기 관리 (`favorite`)
//! - Binance 심볼 매핑 확인 (`map`)

pub mod commands;
