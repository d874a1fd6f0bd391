//! # RDT (Reliable Datagram Transfer)
//!
//! UDP 위에서 동작하는 최소한의 신뢰성 전송 프로토콜
//!
//! ## 핵심 특징
//! - **3-way 핸드쉐이크**: SYN -> SYN-ACK -> ACK
//! - **슬라이딩 윈도우**: 혼잡 윈도우만큼 세그먼트 동시 전송
//! - **AIMD 혼잡제어**: slow start / congestion avoidance, 타임아웃 시 윈도우 1로
//! - **Go-Back-N**: 타임아웃 시 미확인 구간 전체 재전송
//! - **손실 주입**: 송신 패킷을 확률적으로 버리는 채널로 불안정한 네트워크 재현

pub mod channel;
pub mod config;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod stats;

pub use channel::{LossModel, LossyChannel, NoLoss, RandomLoss, ScriptedLoss};
pub use config::{AckMode, Config};
pub use error::{Error, Result};
pub use packet::{ControlToken, SeqNum};
pub use receiver::{Receiver, ReceiverEvent, ReceiverState};
pub use sender::{Sender, SenderState};
pub use session::SenderSession;
pub use stats::{ReceiverStats, TransferStats};

/// 기본 수신 포트
pub const DEFAULT_PORT: u16 = 12345;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 1;

/// 기본 수신 버퍼 크기 (바이트)
pub const MAX_DATAGRAM_SIZE: usize = 1024;
