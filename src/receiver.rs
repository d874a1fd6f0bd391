//! 수신자
//!
//! - Go-Back-N: 기대한 시퀀스만 받아들임
//! - 순서 어긋남/중복은 마지막으로 받은 시퀀스를 다시 ACK
//! - 세션은 한 번에 하나, FIN에서 상태 초기화

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::{self, LossModel, LossyChannel};
use crate::packet::{self, ControlToken, Inbound, SeqNum};
use crate::stats::ReceiverStats;
use crate::{Config, Result};

/// 수신 이벤트 채널 수신기 타입
pub type EventReceiver = mpsc::UnboundedReceiver<ReceiverEvent>;

/// 애플리케이션에 알리는 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// 핸드쉐이크 마지막 ACK 수신
    Connected,

    /// 순서대로 받아들인 청크
    Chunk { seq: SeqNum, data: Bytes },

    /// FIN 수신, 이번 세션에서 받은 전체 메시지
    SessionEnded { message: Bytes },
}

/// 응답 패킷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// 형태 C (SYN-ACK / FIN-ACK)
    Token(ControlToken),

    /// 형태 B
    Ack(SeqNum),
}

impl Reply {
    pub fn encode(&self) -> Bytes {
        match self {
            Reply::Token(token) => packet::encode_token(*token),
            Reply::Ack(seq) => packet::encode_ack(*seq),
        }
    }
}

/// 패킷 하나를 처리한 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handled {
    pub reply: Option<Reply>,
    pub event: Option<ReceiverEvent>,
}

/// 수신 세션 상태 (I/O 없음)
#[derive(Debug, Default)]
pub struct ReceiverState {
    expected_seq: SeqNum,
    last_good_seq: SeqNum,

    /// 이번 세션에서 받아들인 데이터
    message: BytesMut,

    /// 마지막 초기화 이후 세션 활동이 있었는지
    session_open: bool,
}

impl ReceiverState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected_seq(&self) -> SeqNum {
        self.expected_seq
    }

    pub fn last_good_seq(&self) -> SeqNum {
        self.last_good_seq
    }

    /// 지금까지 받은 메시지
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// 형태 A 패킷 처리
    pub fn handle(&mut self, datagram: &[u8]) -> Result<Handled> {
        let handled = match Inbound::classify(datagram)? {
            Inbound::Control(ControlToken::Syn) => {
                self.session_open = true;
                Handled {
                    reply: Some(Reply::Token(ControlToken::SynAck)),
                    event: None,
                }
            }

            Inbound::Control(ControlToken::Ack) => {
                self.session_open = true;
                Handled {
                    reply: None,
                    event: Some(ReceiverEvent::Connected),
                }
            }

            Inbound::Control(ControlToken::Fin) => {
                let event = self.session_open.then(|| ReceiverEvent::SessionEnded {
                    message: self.message.split().freeze(),
                });
                self.reset();
                Handled {
                    reply: Some(Reply::Token(ControlToken::FinAck)),
                    event,
                }
            }

            // classify는 송신자 토큰만 제어로 분류함
            Inbound::Control(_) => Handled::default(),

            Inbound::Data { seq, payload } => self.on_segment(seq, payload),
        };

        Ok(handled)
    }

    /// 데이터 세그먼트 처리
    fn on_segment(&mut self, seq: SeqNum, payload: Bytes) -> Handled {
        if seq != self.expected_seq {
            return Handled {
                reply: Some(Reply::Ack(self.last_good_seq)),
                event: None,
            };
        }

        self.session_open = true;
        self.message.extend_from_slice(&payload);
        self.last_good_seq = seq;
        self.expected_seq = self.expected_seq.wrapping_add(1);

        Handled {
            reply: Some(Reply::Ack(seq)),
            event: Some(ReceiverEvent::Chunk { seq, data: payload }),
        }
    }

    /// 세션 초기화
    pub fn reset(&mut self) {
        self.expected_seq = 0;
        self.last_good_seq = 0;
        self.message.clear();
        self.session_open = false;
    }
}

/// 수신자 핸들 (외부에서 제어용)
pub struct Receiver {
    local_addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    running: Arc<AtomicBool>,
    stats: Arc<RwLock<ReceiverStats>>,
    task: JoinHandle<()>,
}

impl Receiver {
    /// 새 수신자 생성 및 시작
    pub async fn start(config: Config) -> Result<(Self, EventReceiver)> {
        let model = channel::model_for(&config);
        Self::start_with_loss_model(config, model).await
    }

    /// 응답 송신에 손실 모델 적용
    pub async fn start_with_loss_model(
        config: Config,
        model: Box<dyn LossModel>,
    ) -> Result<(Self, EventReceiver)> {
        config.validate()?;

        let channel = LossyChannel::bind(config.bind_addr, model).await?;
        let local_addr = channel.local_addr()?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(RwLock::new(ReceiverStats::default()));

        info!("RDT Receiver started on {}", local_addr);

        let task = tokio::spawn(listen(
            channel,
            config.max_datagram,
            event_tx,
            stop_rx,
            running.clone(),
            stats.clone(),
        ));

        let receiver = Self {
            local_addr,
            stop_tx,
            running,
            stats,
            task,
        };

        Ok((receiver, event_rx))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 통계 반환
    pub fn stats(&self) -> ReceiverStats {
        self.stats.read().clone()
    }

    /// 정지 후 수신 태스크 종료 대기
    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}

/// 단일 수신 루프: 패킷 하나를 끝까지 처리한 뒤 다음 패킷을 받는다
async fn listen(
    channel: LossyChannel,
    max_datagram: usize,
    events: mpsc::UnboundedSender<ReceiverEvent>,
    mut stop: watch::Receiver<bool>,
    running: Arc<AtomicBool>,
    stats: Arc<RwLock<ReceiverStats>>,
) {
    let mut state = ReceiverState::new();
    let mut buf = vec![0u8; max_datagram];

    while running.load(Ordering::SeqCst) {
        let (len, addr) = tokio::select! {
            biased;
            _ = stop.changed() => break,
            result = channel.recv_from(&mut buf) => match result {
                Ok(received) => received,
                Err(e) => {
                    error!("수신 에러: {}", e);
                    break;
                }
            },
        };

        let handled = match state.handle(&buf[..len]) {
            Ok(handled) => handled,
            Err(e) => {
                stats.write().malformed += 1;
                warn!("패킷 무시 ({}): {}", addr, e);
                continue;
            }
        };

        record(&stats, &handled);
        log_handled(&handled);

        if let Some(reply) = handled.reply {
            if let Err(e) = channel.send_to(&reply.encode(), addr).await {
                warn!("응답 전송 실패: {}", e);
            }
        }

        if let Some(event) = handled.event {
            let _ = events.send(event);
        }
    }

    running.store(false, Ordering::SeqCst);
    debug!("수신 루프 종료");
}

fn record(stats: &RwLock<ReceiverStats>, handled: &Handled) {
    let mut stats = stats.write();

    match (&handled.reply, &handled.event) {
        (Some(Reply::Token(ControlToken::SynAck)), _) => stats.syns += 1,
        (_, Some(ReceiverEvent::SessionEnded { .. })) => stats.completed_sessions += 1,
        (Some(Reply::Ack(_)), Some(ReceiverEvent::Chunk { data, .. })) => {
            stats.accepted_segments += 1;
            stats.accepted_bytes += data.len() as u64;
        }
        (Some(Reply::Ack(_)), None) => stats.rejected_segments += 1,
        _ => {}
    }

    if matches!(handled.reply, Some(Reply::Ack(_))) {
        stats.acks_sent += 1;
    }
}

fn log_handled(handled: &Handled) {
    match (&handled.reply, &handled.event) {
        (Some(Reply::Token(token)), _) => info!("제어 메시지 응답: {}", token),
        (None, Some(ReceiverEvent::Connected)) => info!("ACK 수신, 연결 수립"),
        (Some(Reply::Ack(seq)), Some(ReceiverEvent::Chunk { data, .. })) => {
            debug!("세그먼트 수신: seq={}, {} bytes", seq, data.len())
        }
        (Some(Reply::Ack(seq)), None) => debug!("순서 어긋남, 마지막 ACK 재전송: {}", seq),
        _ => {}
    }
}

/// 다음 세션 종료까지 기다려 전체 메시지 반환
pub async fn next_message(events: &mut EventReceiver) -> Option<Bytes> {
    while let Some(event) = events.recv().await {
        if let ReceiverEvent::SessionEnded { message } = event {
            return Some(message);
        }
    }
    None
}
