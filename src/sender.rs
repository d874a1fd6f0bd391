//! 송신자
//!
//! - 3-way 핸드쉐이크 (SYN -> SYN-ACK -> ACK)
//! - 혼잡 윈도우만큼 세그먼트 전송, 주기적으로 다시 채움
//! - 별도 태스크에서 ACK 수신, 타임아웃 시 Go-Back-N 재전송
//! - FIN -> FIN-ACK 종료

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::{LossModel, LossyChannel, RecvOutcome, SendOutcome};
use crate::packet::{self, ControlToken, SeqNum};
use crate::session::{Segment, SenderSession};
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 송신자 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    #[default]
    Idle,
    Handshaking,
    Transferring,
    Terminating,
    Closed,
}

/// 두 태스크(윈도우 채우기 / ACK 수신)가 공유하는 세션
struct SharedSession {
    session: Mutex<SenderSession>,
    channel: Arc<LossyChannel>,
    peer: SocketAddr,
    stats: Arc<RwLock<TransferStats>>,

    /// 종료 핸드쉐이크 시작 전 false로 바뀜
    running: AtomicBool,
}

impl SharedSession {
    /// 데이터 세그먼트 전송
    async fn transmit(&self, segment: &Segment, retransmit: bool) -> Result<()> {
        let bytes = packet::encode_framed(segment.seq, &segment.payload);
        let outcome = self.channel.send_to(&bytes, self.peer).await?;

        {
            let mut stats = self.stats.write();
            stats.transmissions += 1;
            if retransmit {
                stats.retransmissions += 1;
            }
            if outcome == SendOutcome::Dropped {
                stats.simulated_drops += 1;
            }
        }

        match outcome {
            SendOutcome::Sent => debug!("세그먼트 전송: seq={}", segment.seq),
            SendOutcome::Dropped => debug!("SIMULATED LOSS: seq={}", segment.seq),
        }
        Ok(())
    }

    /// 타임아웃 처리: 윈도우 축소 후 미확인 구간 전체 재전송
    async fn handle_timeout(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let resend = session.on_timeout();
        self.stats.write().timeouts += 1;

        info!(
            cwnd = session.congestion_window(),
            ssthresh = session.congestion_threshold(),
            base = session.window_base(),
            resend = resend.len(),
            "타임아웃, 재전송"
        );

        for segment in &resend {
            self.transmit(segment, true).await?;
        }
        Ok(())
    }

    /// ACK 하나 처리
    async fn on_ack(&self, ack_seq: SeqNum) {
        let mut session = self.session.lock().await;
        let outcome = session.on_ack(ack_seq);

        {
            let mut stats = self.stats.write();
            stats.acks_received += 1;
            if !outcome.known {
                stats.ignored_acks += 1;
            }
        }

        debug!(
            ack = ack_seq,
            base = session.window_base(),
            cwnd = session.congestion_window(),
            advanced = outcome.advanced,
            "ACK 수신"
        );
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// ACK 수신 루프
///
/// 타임아웃은 재전송 타이머를 겸한다. 종료 신호가 오면 조용히 끝난다.
async fn listen_for_acks(
    shared: Arc<SharedSession>,
    mut shutdown: watch::Receiver<bool>,
    config: Config,
) -> Result<()> {
    let mut buf = vec![0u8; config.max_datagram];

    loop {
        let outcome = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!("ACK 수신 태스크 종료 신호");
                return Ok(());
            }
            outcome = shared.channel.recv_timeout(&mut buf, config.recv_timeout) => outcome,
        };

        if !shared.is_running() {
            return Ok(());
        }

        match outcome {
            RecvOutcome::Datagram { len, .. } => match packet::decode_ack(&buf[..len]) {
                Ok(ack_seq) => shared.on_ack(ack_seq).await,
                Err(e) => {
                    shared.stats.write().ignored_acks += 1;
                    debug!("ACK가 아닌 패킷 무시: {}", e);
                }
            },
            RecvOutcome::TimedOut => {
                if let Err(e) = shared.handle_timeout().await {
                    if shared.is_running() {
                        error!("재전송 실패: {}", e);
                        return Err(Error::ListenerFailed(e.to_string()));
                    }
                    return Ok(());
                }
            }
            RecvOutcome::Failed(e) => {
                if shared.is_running() {
                    error!("ACK 수신 에러: {}", e);
                    return Err(Error::ListenerFailed(e.to_string()));
                }
                return Ok(());
            }
        }
    }
}

/// 송신자
pub struct Sender {
    /// 설정
    config: Config,

    /// 채널 (종료 후 None)
    channel: Option<Arc<LossyChannel>>,

    /// 현재 상태
    state: SenderState,

    /// 전송 통계
    stats: Arc<RwLock<TransferStats>>,
}

impl Sender {
    /// 설정대로 소켓을 바인딩하고 송신자 생성
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let channel = LossyChannel::from_config(&config).await?;
        Ok(Self::with_channel(config, channel))
    }

    /// 손실 모델을 직접 지정
    pub async fn with_loss_model(config: Config, model: Box<dyn LossModel>) -> Result<Self> {
        config.validate()?;
        let channel = LossyChannel::bind(config.bind_addr, model).await?;
        Ok(Self::with_channel(config, channel))
    }

    pub fn with_channel(config: Config, channel: LossyChannel) -> Self {
        Self {
            config,
            channel: Some(Arc::new(channel)),
            state: SenderState::Idle,
            stats: Arc::new(RwLock::new(TransferStats::new())),
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.channel()?.local_addr()
    }

    /// 통계 반환
    pub fn stats(&self) -> TransferStats {
        self.stats.read().clone()
    }

    fn channel(&self) -> Result<&Arc<LossyChannel>> {
        self.channel.as_ref().ok_or(Error::ConnectionClosed)
    }

    /// 시퀀스 0으로 제어 메시지 전송 (형태 A)
    async fn send_control(&self, token: ControlToken) -> Result<()> {
        let bytes = packet::encode_framed(0, token.as_bytes());
        let outcome = self.channel()?.send_to(&bytes, self.config.peer_addr).await?;

        match outcome {
            SendOutcome::Sent => debug!("{} 전송 (seq=0)", token),
            SendOutcome::Dropped => {
                self.stats.write().simulated_drops += 1;
                debug!("SIMULATED LOSS: {}", token);
            }
        }
        Ok(())
    }

    fn check_retries(&self, stage: &'static str, attempts: u32) -> Result<()> {
        match self.config.max_retries {
            Some(max) if attempts > max => Err(Error::RetriesExhausted { stage, attempts }),
            _ => Ok(()),
        }
    }

    /// 제어 토큰 하나를 보내고 기대하는 응답이 올 때까지 재전송
    ///
    /// 반환값은 총 송신 횟수.
    async fn exchange(
        &self,
        stage: &'static str,
        request: ControlToken,
        reply: ControlToken,
    ) -> Result<u32> {
        let mut buf = vec![0u8; self.config.max_datagram];
        let mut attempts = 1;
        self.send_control(request).await?;

        loop {
            match self.channel()?.recv_timeout(&mut buf, self.config.recv_timeout).await {
                RecvOutcome::Datagram { len, from } => {
                    if packet::decode_token(&buf[..len]) == Some(reply) {
                        return Ok(attempts);
                    }
                    debug!("{} 대기 중 다른 패킷 무시: {} bytes from {}", reply, len, from);
                }
                RecvOutcome::TimedOut => {
                    self.check_retries(stage, attempts)?;
                    warn!("{} 타임아웃, {} 재전송", stage, request);
                    self.send_control(request).await?;
                    attempts += 1;
                }
                RecvOutcome::Failed(e) => return Err(e.into()),
            }
        }
    }

    /// 연결 수립 (3-way 핸드쉐이크)
    pub async fn establish_connection(&mut self) -> Result<()> {
        if self.state == SenderState::Closed {
            return Err(Error::ConnectionClosed);
        }

        self.state = SenderState::Handshaking;
        info!("SYN 전송 -> {}", self.config.peer_addr);

        let attempts = self
            .exchange("handshake", ControlToken::Syn, ControlToken::SynAck)
            .await?;
        self.stats.write().handshake_attempts = attempts;

        info!("SYN-ACK 수신, ACK 전송 (시도 {}회)", attempts);
        self.send_control(ControlToken::Ack).await?;
        self.state = SenderState::Transferring;
        Ok(())
    }

    /// 연결 종료 (FIN -> FIN-ACK) 후 소켓 닫기
    pub async fn terminate_connection(&mut self) -> Result<()> {
        if self.state == SenderState::Closed {
            return Err(Error::ConnectionClosed);
        }

        self.state = SenderState::Terminating;
        info!("FIN 전송");

        let attempts = self
            .exchange("teardown", ControlToken::Fin, ControlToken::FinAck)
            .await?;
        self.stats.write().teardown_attempts = attempts;

        info!("FIN-ACK 수신, 소켓 종료");
        self.channel = None;
        self.state = SenderState::Closed;
        Ok(())
    }

    /// 데이터 전송
    ///
    /// 핸드쉐이크, 윈도우 기반 전송, 종료까지 수행하고 통계를 반환한다.
    pub async fn send_data(mut self, data: &[u8]) -> Result<TransferStats> {
        let session = SenderSession::from_message(
            data,
            self.config.chunk_size,
            self.config.initial_congestion_window,
            self.config.congestion_threshold,
            self.config.ack_mode,
        );

        {
            let mut stats = self.stats.write();
            stats.total_segments = session.len() as u64;
            stats.total_bytes = data.len() as u64;
        }
        info!(
            "{} bytes -> {} 세그먼트 (chunk_size={})",
            data.len(),
            self.config.segment_count(data.len()),
            self.config.chunk_size
        );

        self.establish_connection().await?;

        let shared = Arc::new(SharedSession {
            session: Mutex::new(session),
            channel: self.channel()?.clone(),
            peer: self.config.peer_addr,
            stats: self.stats.clone(),
            running: AtomicBool::new(true),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener: JoinHandle<Result<()>> = tokio::spawn(listen_for_acks(
            shared.clone(),
            shutdown_rx,
            self.config.clone(),
        ));

        let fill_result = Self::fill_loop(&shared, &listener, self.config.poll_interval).await;

        // 남은 미확인 세그먼트가 있으면 한 번 더 재전송
        let final_result = match fill_result {
            Ok(()) => Self::final_pass(&shared).await,
            Err(e) => Err(e),
        };

        // 종료 신호 -> 리스너 합류 -> 그 다음에만 소켓을 종료 핸드쉐이크에 사용
        shared.running.store(false, Ordering::SeqCst);
        let _ = shutdown_tx.send(true);
        let listener_result = match listener.await {
            Ok(result) => result,
            Err(e) => Err(Error::ListenerFailed(e.to_string())),
        };

        {
            let session = shared.session.lock().await;
            self.stats.write().record_session(&session);
        }
        drop(shared);

        final_result?;
        self.terminate_connection().await?;

        let mut stats = self.stats.write();
        stats.finish();
        info!("전송 완료: {}", stats.summary());

        listener_result?;
        Ok(stats.clone())
    }

    async fn final_pass(shared: &SharedSession) -> Result<()> {
        let mut session = shared.session.lock().await;
        if !session.has_unacked() {
            return Ok(());
        }

        let resend = session.on_timeout();
        shared.stats.write().timeouts += 1;
        for segment in &resend {
            shared.transmit(segment, true).await?;
        }
        Ok(())
    }

    /// window_base가 끝에 닿을 때까지 윈도우 채우기 반복
    async fn fill_loop(
        shared: &SharedSession,
        listener: &JoinHandle<Result<()>>,
        poll_interval: std::time::Duration,
    ) -> Result<()> {
        loop {
            {
                let mut session = shared.session.lock().await;
                if session.is_complete() {
                    return Ok(());
                }

                for segment in session.fill_window() {
                    shared.transmit(&segment, false).await?;
                }
            }

            // 리스너가 죽으면 더 이상 진행할 수 없음
            if listener.is_finished() {
                warn!("ACK 수신 태스크가 먼저 종료됨, 전송 중단");
                return Ok(());
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}
