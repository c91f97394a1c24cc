//! CLI 명령어 구현 모듈.

pub mod favorite;
pub mod map;
pub mod watch;
