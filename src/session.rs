//! 송신 세션 상태
//!
//! 슬라이딩 윈도우 + AIMD 혼잡 제어 + Go-Back-N 재전송 대상 계산.
//! 소켓 I/O는 하지 않는다. 호출자(`Sender`)가 반환된 세그먼트를 전송한다.
//!
//! ```text
//!  window_base          next_seq
//!      │                   │
//!  ────┼───────────────────┼──────────────────▶ seq
//!      │ <── in flight ──▶ │ <── sendable ───▶
//!      └── congestion_window ──┘
//! ```

use std::collections::HashMap;

use bytes::Bytes;

use crate::config::AckMode;
use crate::packet::SeqNum;

/// 전송할 세그먼트 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub seq: SeqNum,
    pub payload: Bytes,
}

/// ACK 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckOutcome {
    /// 윈도우 안의 시퀀스였는지
    pub known: bool,

    /// window_base가 전진한 칸 수
    pub advanced: u32,
}

/// 송신 세션 (전송 1회당 하나)
#[derive(Debug)]
pub struct SenderSession {
    window_base: SeqNum,
    next_seq: SeqNum,
    congestion_window: u32,
    congestion_threshold: u32,
    data_buffer: Vec<Bytes>,
    ack_status: HashMap<SeqNum, bool>,
    ack_mode: AckMode,
}

impl SenderSession {
    pub fn new(
        data_buffer: Vec<Bytes>,
        congestion_window: u32,
        congestion_threshold: u32,
        ack_mode: AckMode,
    ) -> Self {
        Self {
            window_base: 0,
            next_seq: 0,
            congestion_window: congestion_window.max(1),
            congestion_threshold: congestion_threshold.max(1),
            data_buffer,
            ack_status: HashMap::new(),
            ack_mode,
        }
    }

    /// 메시지를 청크로 분할해 세션 생성
    pub fn from_message(
        data: &[u8],
        chunk_size: usize,
        congestion_window: u32,
        congestion_threshold: u32,
        ack_mode: AckMode,
    ) -> Self {
        let chunks = split_into_chunks(data, chunk_size);
        Self::new(chunks, congestion_window, congestion_threshold, ack_mode)
    }

    pub fn window_base(&self) -> SeqNum {
        self.window_base
    }

    pub fn next_seq(&self) -> SeqNum {
        self.next_seq
    }

    pub fn congestion_window(&self) -> u32 {
        self.congestion_window
    }

    pub fn congestion_threshold(&self) -> u32 {
        self.congestion_threshold
    }

    /// 전체 세그먼트 수
    pub fn len(&self) -> usize {
        self.data_buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_buffer.is_empty()
    }

    /// 모든 세그먼트가 확인되었는지
    pub fn is_complete(&self) -> bool {
        self.window_base as usize >= self.data_buffer.len()
    }

    pub fn is_acked(&self, seq: SeqNum) -> bool {
        self.ack_status.get(&seq).copied().unwrap_or(false)
    }

    /// `[window_base, next_seq)` 중 미확인 세그먼트가 있는지
    pub fn has_unacked(&self) -> bool {
        (self.window_base..self.next_seq).any(|seq| !self.is_acked(seq))
    }

    /// 윈도우 채우기
    ///
    /// `[window_base, window_base + congestion_window)` 범위의 아직 보내지 않은
    /// 세그먼트를 반환하고 `next_seq`를 전진시킨다.
    ///
    /// seq 0이 확인되기 전에는 seq 0만 보낸다. 아무것도 받지 못한 수신자는
    /// 순서 어긋난 세그먼트에 ACK 0을 돌려주므로, 그 전에 seq 1 이상이 나가면
    /// 진짜 ACK 0과 구분할 수 없다.
    pub fn fill_window(&mut self) -> Vec<Segment> {
        let window = if self.window_base == 0 {
            1
        } else {
            self.congestion_window
        };
        let limit = self
            .window_base
            .saturating_add(window)
            .min(self.data_buffer.len() as SeqNum);

        let mut segments = Vec::new();
        while self.next_seq < limit {
            let seq = self.next_seq;
            segments.push(Segment {
                seq,
                payload: self.data_buffer[seq as usize].clone(),
            });
            self.ack_status.insert(seq, false);
            self.next_seq += 1;
        }
        segments
    }

    /// 타임아웃 처리 (multiplicative decrease + Go-Back-N)
    ///
    /// 임계값을 현재 윈도우의 절반(최소 1)으로, 윈도우를 1로 줄이고
    /// `[window_base, next_seq)`의 미확인 세그먼트 전체를 오름차순으로 반환한다.
    pub fn on_timeout(&mut self) -> Vec<Segment> {
        self.congestion_threshold = (self.congestion_window / 2).max(1);
        self.congestion_window = 1;

        (self.window_base..self.next_seq)
            .filter(|&seq| !self.is_acked(seq))
            .map(|seq| Segment {
                seq,
                payload: self.data_buffer[seq as usize].clone(),
            })
            .collect()
    }

    /// ACK 처리
    pub fn on_ack(&mut self, ack_seq: SeqNum) -> AckOutcome {
        let Some(acked) = self.ack_status.get_mut(&ack_seq) else {
            return AckOutcome::default();
        };
        *acked = true;

        if self.ack_mode == AckMode::Cumulative && ack_seq > self.window_base {
            for seq in self.window_base..ack_seq {
                self.ack_status.insert(seq, true);
            }
        }

        let mut advanced = 0;
        if ack_seq == self.window_base || self.ack_mode == AckMode::Cumulative {
            while self.is_acked(self.window_base) {
                self.window_base += 1;
                advanced += 1;
                self.grow_window();
            }
        }

        AckOutcome {
            known: true,
            advanced,
        }
    }

    /// 전진 1칸당 윈도우 증가 (slow start / congestion avoidance)
    fn grow_window(&mut self) {
        if self.congestion_window < self.congestion_threshold {
            self.congestion_window = self.congestion_window.saturating_mul(2);
        } else {
            self.congestion_window = self.congestion_window.saturating_add(1);
        }
    }
}

/// 데이터를 고정 크기 청크로 분할
pub fn split_into_chunks(data: &[u8], chunk_size: usize) -> Vec<Bytes> {
    let data = Bytes::copy_from_slice(data);
    let chunk_size = chunk_size.max(1);

    (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(message: &[u8], cwnd: u32, ssthresh: u32) -> SenderSession {
        SenderSession::from_message(message, 1, cwnd, ssthresh, AckMode::Selective)
    }

    fn seqs(segments: &[Segment]) -> Vec<SeqNum> {
        segments.iter().map(|s| s.seq).collect()
    }

    #[test]
    fn test_split_into_chunks() {
        let chunks = split_into_chunks(b"abcdefg", 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].as_ref(), b"abc");
        assert_eq!(chunks[2].as_ref(), b"g");
        assert!(split_into_chunks(b"", 3).is_empty());
    }

    #[test]
    fn test_fill_respects_congestion_window() {
        let mut s = session(b"abcdef", 1, 8);
        assert_eq!(seqs(&s.fill_window()), vec![0]);
        // 이미 보낸 세그먼트는 다시 채우지 않음
        assert!(s.fill_window().is_empty());
        assert_eq!(s.next_seq(), 1);
        assert!(s.has_unacked());
    }

    #[test]
    fn test_slow_start_then_avoidance() {
        let mut s = session(&[0u8; 64], 1, 4);

        s.fill_window();
        assert_eq!(s.on_ack(0).advanced, 1);
        assert_eq!(s.congestion_window(), 2);

        assert_eq!(seqs(&s.fill_window()), vec![1, 2]);
        s.on_ack(1);
        assert_eq!(s.congestion_window(), 4);

        // 임계값 도달 후 +1
        s.on_ack(2);
        assert_eq!(s.congestion_window(), 5);
        assert_eq!(s.window_base(), 3);
    }

    #[test]
    fn test_first_segment_sent_alone() {
        let mut s = session(b"abcdef", 4, 8);
        assert_eq!(seqs(&s.fill_window()), vec![0]);
        assert!(s.fill_window().is_empty());

        // 재전송도 seq 0뿐
        assert_eq!(seqs(&s.on_timeout()), vec![0]);

        s.on_ack(0);
        assert_eq!(s.window_base(), 1);
        assert_eq!(seqs(&s.fill_window()), vec![1, 2]);
    }

    #[test]
    fn test_out_of_order_ack_holds_base() {
        let mut s = session(b"abcdef", 2, 8);
        s.fill_window();
        s.on_ack(0); // cwnd 4
        assert_eq!(seqs(&s.fill_window()), vec![1, 2, 3, 4]);

        let outcome = s.on_ack(3);
        assert!(outcome.known);
        assert_eq!(outcome.advanced, 0);
        assert_eq!(s.window_base(), 1);

        s.on_ack(2);
        assert_eq!(s.window_base(), 1);

        // 1 도착 시 연속 구간 전체 전진
        let outcome = s.on_ack(1);
        assert_eq!(outcome.advanced, 3);
        assert_eq!(s.window_base(), 4);
        // 4 -> 8 (slow start) -> 9 -> 10
        assert_eq!(s.congestion_window(), 10);
    }

    #[test]
    fn test_unknown_and_duplicate_ack() {
        let mut s = session(b"ab", 1, 8);
        s.fill_window();

        assert_eq!(s.on_ack(9), AckOutcome::default());

        s.on_ack(0);
        let cwnd = s.congestion_window();
        let dup = s.on_ack(0);
        assert!(dup.known);
        assert_eq!(dup.advanced, 0);
        assert_eq!(s.congestion_window(), cwnd);
    }

    #[test]
    fn test_timeout_halves_threshold_and_goes_back_n() {
        let mut s = session(&[7u8; 16], 1, 16);
        s.fill_window();
        s.on_ack(0); // cwnd 2
        assert_eq!(seqs(&s.fill_window()), vec![1, 2]);
        s.on_ack(1); // cwnd 4
        assert_eq!(seqs(&s.fill_window()), vec![3, 4, 5]);
        s.on_ack(3);

        let resend = s.on_timeout();
        assert_eq!(s.congestion_threshold(), 2);
        assert_eq!(s.congestion_window(), 1);
        // 3은 이미 확인되었으므로 제외
        assert_eq!(seqs(&resend), vec![2, 4, 5]);
        assert_eq!(s.window_base(), 2);
    }

    #[test]
    fn test_timeout_floor() {
        let mut s = session(b"a", 1, 8);
        s.fill_window();
        s.on_timeout();
        assert_eq!(s.congestion_threshold(), 1);
        assert_eq!(s.congestion_window(), 1);
        s.on_timeout();
        assert_eq!(s.congestion_threshold(), 1);
        assert_eq!(s.congestion_window(), 1);
    }

    #[test]
    fn test_cumulative_mode_recovers_lost_ack() {
        let mut s = SenderSession::from_message(b"abcd", 1, 4, 8, AckMode::Cumulative);
        s.fill_window();
        s.on_ack(0);
        assert_eq!(seqs(&s.fill_window()), vec![1, 2, 3]);

        // ACK 1 유실, ACK 2 도착
        let outcome = s.on_ack(2);
        assert_eq!(outcome.advanced, 2);
        assert_eq!(s.window_base(), 3);
    }

    #[test]
    fn test_invariants_hold_over_random_run() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let mut s = session(&[1u8; 200], 1, 8);
        let mut last_base = 0;

        for _ in 0..5000 {
            if s.is_complete() {
                break;
            }
            match rng.gen_range(0..10) {
                0 => {
                    let before = s.congestion_window();
                    s.on_timeout();
                    assert_eq!(s.congestion_threshold(), (before / 2).max(1));
                    assert_eq!(s.congestion_window(), 1);
                }
                1..=3 => {
                    s.fill_window();
                }
                _ => {
                    if s.next_seq() > s.window_base() {
                        let seq = rng.gen_range(s.window_base()..s.next_seq());
                        s.on_ack(seq);
                    }
                }
            }

            assert!(s.window_base() >= last_base);
            assert!(s.window_base() <= s.next_seq());
            assert!(s.next_seq() as usize <= s.len());
            assert!(s.congestion_window() >= 1);
            assert!(s.congestion_threshold() >= 1);
            for seq in 0..s.window_base() {
                assert!(s.is_acked(seq));
            }
            last_base = s.window_base();
        }
    }
}
