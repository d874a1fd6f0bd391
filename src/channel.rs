//! 손실 주입 채널
//!
//! 실제 UDP 소켓을 감싸고 송신 패킷을 확률적으로 버린다.
//! 프로토콜 로직이 아니라 전송 계층의 속성이므로 `LossModel`로 교체 가능.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::{Config, Result};

/// 송신 패킷 손실 모델
pub trait LossModel: Send + Sync {
    /// 이번 송신을 버릴지 결정
    fn should_drop(&self) -> bool;
}

/// 손실 없음
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLoss;

impl LossModel for NoLoss {
    fn should_drop(&self) -> bool {
        false
    }
}

/// 확률적 손실
#[derive(Debug)]
pub struct RandomLoss {
    probability: f64,
    rng: Mutex<StdRng>,
}

impl RandomLoss {
    /// `seed`가 있으면 재현 가능한 손실 패턴
    pub fn new(probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }
}

impl LossModel for RandomLoss {
    fn should_drop(&self) -> bool {
        self.rng.lock().gen::<f64>() < self.probability
    }
}

/// 지정한 순번(0부터)의 송신만 버림
#[derive(Debug)]
pub struct ScriptedLoss {
    drops: HashSet<u64>,
    counter: AtomicU64,
}

impl ScriptedLoss {
    pub fn new(drops: impl IntoIterator<Item = u64>) -> Self {
        Self {
            drops: drops.into_iter().collect(),
            counter: AtomicU64::new(0),
        }
    }

    /// 지금까지 모델에 질의된 송신 수
    pub fn attempts(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl LossModel for ScriptedLoss {
    fn should_drop(&self) -> bool {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.drops.contains(&n)
    }
}

impl<T: LossModel + ?Sized> LossModel for Arc<T> {
    fn should_drop(&self) -> bool {
        (**self).should_drop()
    }
}

/// 송신 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Dropped,
}

/// 수신 결과 (데이터 / 타임아웃 / 치명적 에러)
#[derive(Debug)]
pub enum RecvOutcome {
    Datagram { len: usize, from: SocketAddr },
    TimedOut,
    Failed(io::Error),
}

/// 손실 주입 UDP 채널
pub struct LossyChannel {
    socket: Arc<UdpSocket>,
    model: Box<dyn LossModel>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl LossyChannel {
    /// 소켓 바인딩 후 채널 생성
    pub async fn bind(addr: SocketAddr, model: Box<dyn LossModel>) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::new(Arc::new(socket), model))
    }

    /// 설정의 손실 확률로 채널 생성
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::bind(config.bind_addr, model_for(config)).await
    }

    pub fn new(socket: Arc<UdpSocket>, model: Box<dyn LossModel>) -> Self {
        Self {
            socket,
            model,
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 손실 모델을 거쳐 전송
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<SendOutcome> {
        if self.model.should_drop() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("SIMULATED LOSS: {} bytes -> {}", data.len(), addr);
            return Ok(SendOutcome::Dropped);
        }

        self.socket.send_to(data, addr).await?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(SendOutcome::Sent)
    }

    /// 타임아웃이 있는 수신
    pub async fn recv_timeout(&self, buf: &mut [u8], timeout: Duration) -> RecvOutcome {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((len, from))) => RecvOutcome::Datagram { len, from },
            Ok(Err(e)) => RecvOutcome::Failed(e),
            Err(_) => RecvOutcome::TimedOut,
        }
    }

    /// 타임아웃 없는 수신
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        Ok(self.socket.recv_from(buf).await?)
    }

    /// 실제로 소켓에 쓴 패킷 수
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// 시뮬레이션으로 버린 패킷 수
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// 설정에 맞는 손실 모델
pub fn model_for(config: &Config) -> Box<dyn LossModel> {
    if config.loss_probability > 0.0 {
        Box::new(RandomLoss::new(config.loss_probability, config.loss_seed))
    } else {
        Box::new(NoLoss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_loss() {
        let model = ScriptedLoss::new([0, 2]);
        assert!(model.should_drop());
        assert!(!model.should_drop());
        assert!(model.should_drop());
        assert!(!model.should_drop());
        assert_eq!(model.attempts(), 4);
    }

    #[test]
    fn test_random_loss_bounds() {
        let never = RandomLoss::new(0.0, Some(1));
        assert!((0..1000).all(|_| !never.should_drop()));

        let seeded_a = RandomLoss::new(0.3, Some(42));
        let seeded_b = RandomLoss::new(0.3, Some(42));
        let a: Vec<bool> = (0..100).map(|_| seeded_a.should_drop()).collect();
        let b: Vec<bool> = (0..100).map(|_| seeded_b.should_drop()).collect();
        assert_eq!(a, b);
        assert!(a.iter().any(|&d| d));
        assert!(a.iter().any(|&d| !d));
    }

    #[tokio::test]
    async fn test_dropped_send_never_arrives() {
        let local: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let rx = LossyChannel::bind(local, Box::new(NoLoss)).await.unwrap();
        let tx = LossyChannel::bind(local, Box::new(ScriptedLoss::new([0])))
            .await
            .unwrap();
        let rx_addr = rx.local_addr().unwrap();

        assert_eq!(tx.send_to(b"first", rx_addr).await.unwrap(), SendOutcome::Dropped);
        assert_eq!(tx.send_to(b"second", rx_addr).await.unwrap(), SendOutcome::Sent);
        assert_eq!(tx.dropped_count(), 1);
        assert_eq!(tx.sent_count(), 1);

        let mut buf = [0u8; 64];
        match rx.recv_timeout(&mut buf, Duration::from_secs(2)).await {
            RecvOutcome::Datagram { len, .. } => assert_eq!(&buf[..len], b"second"),
            other => panic!("unexpected: {other:?}"),
        }

        assert!(matches!(
            rx.recv_timeout(&mut buf, Duration::from_millis(30)).await,
            RecvOutcome::TimedOut
        ));
    }
}
