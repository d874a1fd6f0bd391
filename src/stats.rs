//! 전송 통계

use std::time::{Duration, Instant};

use crate::session::SenderSession;

/// 송신측 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 종료까지 걸린 시간 (종료 전이면 None)
    pub finished_in: Option<Duration>,

    /// 총 세그먼트 수
    pub total_segments: u64,

    /// 총 데이터 바이트
    pub total_bytes: u64,

    /// 데이터 세그먼트 송신 시도 수 (재전송 포함)
    pub transmissions: u64,

    /// 재전송 세그먼트 수
    pub retransmissions: u64,

    /// 시뮬레이션으로 버려진 패킷 수 (제어 메시지 포함)
    pub simulated_drops: u64,

    /// 타임아웃 횟수
    pub timeouts: u64,

    /// 수신한 ACK 수
    pub acks_received: u64,

    /// 윈도우 밖이거나 해석 불가한 ACK 수
    pub ignored_acks: u64,

    /// SYN 송신 횟수
    pub handshake_attempts: u32,

    /// FIN 송신 횟수
    pub teardown_attempts: u32,

    /// 최종 window_base
    pub final_window_base: u32,

    /// 최종 혼잡 윈도우
    pub final_congestion_window: u32,

    /// 최종 혼잡 임계값
    pub final_congestion_threshold: u32,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            finished_in: None,
            total_segments: 0,
            total_bytes: 0,
            transmissions: 0,
            retransmissions: 0,
            simulated_drops: 0,
            timeouts: 0,
            acks_received: 0,
            ignored_acks: 0,
            handshake_attempts: 0,
            teardown_attempts: 0,
            final_window_base: 0,
            final_congestion_window: 0,
            final_congestion_threshold: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.finished_in.unwrap_or_else(|| self.start_time.elapsed())
    }

    /// 세션 최종 상태 기록
    pub fn record_session(&mut self, session: &SenderSession) {
        self.final_window_base = session.window_base();
        self.final_congestion_window = session.congestion_window();
        self.final_congestion_threshold = session.congestion_threshold();
    }

    /// 종료 시각 고정
    pub fn finish(&mut self) {
        self.finished_in = Some(self.start_time.elapsed());
    }

    /// 재전송 비율
    pub fn retransmission_ratio(&self) -> f64 {
        if self.transmissions == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.transmissions as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Segments: {}/{} | Bytes: {} | Tx: {} (retx {:.1}%) | Drops: {} | Timeouts: {} | ACKs: {} | cwnd: {} ssthresh: {}",
            self.elapsed().as_secs_f64(),
            self.final_window_base,
            self.total_segments,
            self.total_bytes,
            self.transmissions,
            self.retransmission_ratio() * 100.0,
            self.simulated_drops,
            self.timeouts,
            self.acks_received,
            self.final_congestion_window,
            self.final_congestion_threshold,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 수신측 통계
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    /// 받아들인 세그먼트 수
    pub accepted_segments: u64,

    /// 받아들인 바이트
    pub accepted_bytes: u64,

    /// 중복/순서 어긋남으로 거부한 세그먼트 수
    pub rejected_segments: u64,

    /// 보낸 ACK 수
    pub acks_sent: u64,

    /// 처리한 핸드쉐이크 SYN 수
    pub syns: u64,

    /// 끝난 세션 수
    pub completed_sessions: u64,

    /// 해석 불가 패킷 수
    pub malformed: u64,
}
