//! 에러 타입 정의

use thiserror::Error;

/// RDT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("잘못된 패킷: {reason} (len={len})")]
    MalformedPacket { reason: &'static str, len: usize },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("재전송 한도 초과: stage={stage}, attempts={attempts}")]
    RetriesExhausted { stage: &'static str, attempts: u32 },

    #[error("ACK 수신 태스크 실패: {0}")]
    ListenerFailed(String),

    #[error("연결 종료")]
    ConnectionClosed,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
