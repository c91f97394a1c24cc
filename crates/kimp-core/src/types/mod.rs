//! 시세판 전반에서 사용되는 공통 타입.

mod decimal;
mod market_code;

pub use decimal::*;
pub use market_code::*;
