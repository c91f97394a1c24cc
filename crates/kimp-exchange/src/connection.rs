//! 재연결하는 WebSocket 연결.
//!
//! 연결마다 태스크 하나가 `접속 → 구독 → 수신 루프`를 돌고, 끊기면
//! [`ReconnectPolicy`]에 따라 기다렸다가 다시 접속합니다. 재시도 횟수 제한은 없습니다.
//!
//! 수신 루프는 주기적으로 마지막 프레임 수신 시각을 확인해 `close`/`error` 없이
//! 멈춘 연결도 강제로 다시 맺습니다.

use crate::protocol::StreamProtocol;
use crate::{ExchangeError, ExchangeResult};
use futures::{SinkExt, StreamExt};
use kimp_core::{ConnectionConfig, ReconnectPolicy};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

const MIN_TICK: Duration = Duration::from_millis(1);

/// 연결 상태 (화면의 연결 표시등).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// 접속 시도 중
    Connecting,
    /// 구독까지 완료
    Open,
    /// 끊김 (재연결 대기 또는 종료)
    #[default]
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// 연결 유지 옵션.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub reconnect: ReconnectPolicy,
    pub health_check_interval: Duration,
    pub stale_after: Duration,
    pub ping_interval: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

impl From<&ConnectionConfig> for ConnectionOptions {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            reconnect: config.reconnect,
            // tokio interval은 0 주기를 허용하지 않음
            health_check_interval: config.health_check_interval().max(MIN_TICK),
            stale_after: config.stale_after(),
            ping_interval: config.ping_interval().max(MIN_TICK),
        }
    }
}

/// 수신 이벤트 핸들러.
pub type Handler<T> = Box<dyn FnMut(T) + Send>;

struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// 세션이 끝난 이유.
enum SessionEnd {
    Cancelled,
    ClosedByServer,
}

/// 거래소 하나에 대한 재연결 WebSocket 연결.
pub struct StreamConnection<P: StreamProtocol> {
    protocol: Arc<P>,
    options: ConnectionOptions,
    state: Arc<watch::Sender<ConnectionState>>,
    session: Mutex<Option<Session>>,
}

impl<P: StreamProtocol> StreamConnection<P> {
    pub fn new(protocol: P, options: ConnectionOptions) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            protocol: Arc::new(protocol),
            options,
            state: Arc::new(state),
            session: Mutex::new(None),
        }
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// 현재 연결 상태.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// 연결 상태 변경을 구독합니다.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// 연결 태스크가 살아 있는지 확인합니다 (재연결 대기 포함).
    pub fn is_running(&self) -> bool {
        self.lock_session()
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
    }

    /// 연결을 시작합니다. 이미 연결 중이거나 열려 있으면 아무것도 하지 않고 `false`.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn connect<F>(&self, handler: F) -> bool
    where
        F: FnMut(P::Output) + Send + 'static,
    {
        let mut session = self.lock_session();
        if session.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!(exchange = self.protocol.name(), "이미 연결되어 있음, connect 무시");
            return false;
        }

        let cancel = CancellationToken::new();
        let span = kimp_core::stream_span!("stream", self.protocol.name(), self.protocol.url());
        let task = tokio::spawn(
            run(
                self.protocol.clone(),
                self.options.clone(),
                self.state.clone(),
                cancel.clone(),
                Box::new(handler),
            )
            .instrument(span),
        );

        *session = Some(Session { cancel, task });
        true
    }

    /// 소켓을 닫고 태스크를 멈춥니다. 핸들러도 함께 해제됩니다.
    pub fn disconnect(&self) {
        if let Some(session) = self.lock_session().take() {
            session.cancel.cancel();
            info!(exchange = self.protocol.name(), "연결 해제 요청");
        }
        self.state.send_replace(ConnectionState::Closed);
    }

    /// 연결을 해제하고 태스크 종료까지 기다립니다.
    pub async fn shutdown(&self) {
        let session = self.lock_session().take();
        if let Some(session) = session {
            session.cancel.cancel();
            if let Err(e) = session.task.await {
                warn!(exchange = self.protocol.name(), error = %e, "연결 태스크 비정상 종료");
            }
        }
        self.state.send_replace(ConnectionState::Closed);
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: StreamProtocol> Drop for StreamConnection<P> {
    fn drop(&mut self) {
        if let Some(session) = self.lock_session().take() {
            session.cancel.cancel();
        }
    }
}

impl<P: StreamProtocol> fmt::Debug for StreamConnection<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("exchange", &self.protocol.name())
            .field("state", &self.state())
            .finish()
    }
}

/// 세션 태스크 하나가 쓰는 연결 상태.
///
/// 취소된 세션은 상태를 쓰지 않습니다. 취소 확인과 쓰기는 `watch` 잠금 안에서 함께 일어나므로
/// `disconnect` 직후 `connect`한 새 세션의 상태를 옛 세션이 덮어쓰지 못합니다.
struct SessionState<'a> {
    state: &'a watch::Sender<ConnectionState>,
    cancel: &'a CancellationToken,
}

impl SessionState<'_> {
    fn set(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if self.cancel.is_cancelled() || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn get(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

/// 재연결 루프.
async fn run<P: StreamProtocol>(
    protocol: Arc<P>,
    options: ConnectionOptions,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
    mut handler: Handler<P::Output>,
) {
    let state = SessionState {
        state: &state,
        cancel: &cancel,
    };
    let mut attempt: u32 = 0;

    loop {
        state.set(ConnectionState::Connecting);

        let result = run_session(&*protocol, &options, &state, &cancel, &mut handler).await;
        let was_open = state.get() == ConnectionState::Open;
        state.set(ConnectionState::Closed);

        match result {
            Ok(SessionEnd::Cancelled) => break,
            Ok(SessionEnd::ClosedByServer) => info!("서버가 연결을 종료함"),
            Err(e) => warn!(error = %e, "연결 끊김"),
        }

        if cancel.is_cancelled() {
            break;
        }
        if was_open {
            attempt = 0;
        }

        let delay = options.reconnect.delay_for(attempt);
        attempt = attempt.saturating_add(1);
        info!(attempt, delay_ms = delay.as_millis() as u64, "재연결 대기");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("연결 태스크 종료");
}

/// 접속 한 번의 수명.
async fn run_session<P: StreamProtocol>(
    protocol: &P,
    options: &ConnectionOptions,
    state: &SessionState<'_>,
    cancel: &CancellationToken,
    handler: &mut Handler<P::Output>,
) -> ExchangeResult<SessionEnd> {
    let connected = tokio::select! {
        _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
        connected = connect_async(protocol.url()) => connected?,
    };
    let (ws_stream, _) = connected;
    let (mut write, mut read) = ws_stream.split();

    for frame in protocol.subscription_frames()? {
        write.send(Message::Text(frame.into())).await?;
    }
    state.set(ConnectionState::Open);
    info!("연결 및 구독 완료");

    let mut health = interval_at(
        Instant::now() + options.health_check_interval,
        options.health_check_interval,
    );
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ping = interval_at(Instant::now() + options.ping_interval, options.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_frame = Instant::now();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(SessionEnd::Cancelled);
            }
            message = read.next() => {
                let message = match message {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(SessionEnd::ClosedByServer),
                };
                last_frame = Instant::now();

                match message {
                    Message::Ping(payload) => write.send(Message::Pong(payload)).await?,
                    Message::Close(frame) => {
                        debug!(?frame, "Close 프레임 수신");
                        return Ok(SessionEnd::ClosedByServer);
                    }
                    other => {
                        if let Some(output) = protocol.decode(&other) {
                            handler(output);
                        }
                    }
                }
            }
            _ = health.tick() => {
                if last_frame.elapsed() >= options.stale_after {
                    return Err(ExchangeError::Disconnected(format!(
                        "{}ms 동안 수신 없음",
                        options.stale_after.as_millis()
                    )));
                }
            }
            _ = ping.tick() => {
                write.send(Message::Ping(Vec::new().into())).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let options = ConnectionOptions::default();
        assert_eq!(options.reconnect, ReconnectPolicy::Fixed { delay_ms: 1000 });
        assert_eq!(options.health_check_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert_eq!(ConnectionState::default(), ConnectionState::Closed);
    }
}
