//! 시세판 도메인 모델.

mod catalog;
mod premium;
mod quote;
mod ticker;

pub use catalog::*;
pub use premium::*;
pub use quote::*;
pub use ticker::*;
