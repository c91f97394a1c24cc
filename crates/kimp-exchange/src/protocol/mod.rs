//! 거래소별 WebSocket 와이어 프로토콜.
//!
//! 연결 관리([`StreamConnection`](crate::StreamConnection))는 거래소와 무관하고,
//! 접속 URL, 구독 프레임, 수신 프레임 해석만 거래소마다 다릅니다.

mod binance;
mod upbit;

pub use binance::BinanceProtocol;
pub use upbit::UpbitProtocol;

use crate::ExchangeResult;
use tokio_tungstenite::tungstenite::Message;

/// 거래소 스트림 프로토콜.
pub trait StreamProtocol: Send + Sync + 'static {
    /// 프레임 하나에서 해석한 이벤트.
    type Output: Send + 'static;

    /// 로그용 거래소 이름.
    fn name(&self) -> &'static str;

    /// 접속 URL.
    fn url(&self) -> &str;

    /// 연결 직후 보낼 텍스트 프레임. 재연결마다 다시 보냅니다.
    fn subscription_frames(&self) -> ExchangeResult<Vec<String>>;

    /// 수신 프레임을 해석합니다.
    ///
    /// 형식이 맞지 않는 프레임은 `None`으로 버립니다. 한 프레임의 실패가
    /// 이후 프레임 처리를 막지 않아야 합니다.
    fn decode(&self, message: &Message) -> Option<Self::Output>;
}
