//! 프로토콜 설정

use std::net::SocketAddr;
use std::time::Duration;

use crate::{Error, Result, DEFAULT_CHUNK_SIZE, DEFAULT_PORT, MAX_DATAGRAM_SIZE};

/// ACK 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// ACK 받은 시퀀스만 확인 처리
    #[default]
    Selective,

    /// ACK 받은 시퀀스까지 윈도우 안의 모든 시퀀스를 확인 처리
    /// (수신자는 순서대로 받은 위치만 ACK 하므로 안전함)
    Cumulative,
}

/// RDT 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 상대방 주소 (송신자 -> 수신자)
    pub peer_addr: SocketAddr,

    /// 로컬 바인드 주소
    pub bind_addr: SocketAddr,

    /// 청크 크기 (바이트)
    /// 혼잡 윈도우와 무관하게 메시지를 얼마나 잘게 나눌지만 결정
    pub chunk_size: usize,

    /// 초기 혼잡 윈도우 (세그먼트 수)
    pub initial_congestion_window: u32,

    /// 초기 혼잡 임계값 (slow start / congestion avoidance 경계)
    pub congestion_threshold: u32,

    /// 수신 타임아웃 = 재전송 타이머
    pub recv_timeout: Duration,

    /// 윈도우 채우기 루프 대기 간격
    pub poll_interval: Duration,

    /// 시뮬레이션 손실 확률 (0.0 ~ 1.0 미만)
    pub loss_probability: f64,

    /// 손실 RNG 시드 (None이면 매번 다른 결과)
    pub loss_seed: Option<u64>,

    /// 수신 버퍼 크기 (바이트)
    pub max_datagram: usize,

    /// 핸드쉐이크/종료 재전송 한도 (None이면 무한 재시도)
    pub max_retries: Option<u32>,

    /// ACK 처리 방식
    pub ack_mode: AckMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            peer_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            chunk_size: DEFAULT_CHUNK_SIZE,
            initial_congestion_window: 1,
            congestion_threshold: 8,
            recv_timeout: Duration::from_millis(650),
            poll_interval: Duration::from_millis(200),
            loss_probability: 0.05,     // 5% 송신 실패
            loss_seed: None,
            max_datagram: MAX_DATAGRAM_SIZE,
            max_retries: None,
            ack_mode: AckMode::Selective,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 수신자 기본 설정 (고정 포트에서 대기)
    pub fn receiver() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            loss_probability: 0.0,
            ..Self::default()
        }
    }

    /// 손실 없는 채널
    pub fn lossless() -> Self {
        Self {
            loss_probability: 0.0,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            chunk_size: 4,
            loss_probability: 0.20,
            recv_timeout: Duration::from_millis(800),
            ack_mode: AckMode::Cumulative,
            ..Self::default()
        }
    }

    /// 루프백 테스트용 짧은 타이머
    pub fn fast_local() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            recv_timeout: Duration::from_millis(80),
            poll_interval: Duration::from_millis(5),
            loss_probability: 0.0,
            ..Self::default()
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size는 1 이상이어야 함".into()));
        }
        if self.initial_congestion_window == 0 || self.congestion_threshold == 0 {
            return Err(Error::InvalidConfig(
                "혼잡 윈도우와 임계값은 1 이상이어야 함".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.loss_probability) {
            return Err(Error::InvalidConfig(format!(
                "loss_probability는 [0, 1) 범위여야 함: {}",
                self.loss_probability
            )));
        }
        if self.chunk_size + crate::packet::SEQ_LEN > self.max_datagram {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {} + 헤더가 max_datagram {}을 넘음",
                self.chunk_size, self.max_datagram
            )));
        }
        if self.recv_timeout.is_zero() {
            return Err(Error::InvalidConfig("recv_timeout은 0일 수 없음".into()));
        }
        Ok(())
    }

    /// 메시지를 나눴을 때 세그먼트 수
    pub fn segment_count(&self, message_len: usize) -> usize {
        (message_len + self.chunk_size - 1) / self.chunk_size
    }
}
