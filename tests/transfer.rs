//! 루프백 UDP 위에서 송신자와 수신자를 실제로 연결하는 통합 테스트

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use rdt::receiver::{next_message, EventReceiver};
use rdt::{
    AckMode, Config, LossModel, NoLoss, RandomLoss, Receiver, ReceiverEvent, ScriptedLoss, Sender,
    TransferStats,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(60);

async fn start_receiver(model: Box<dyn LossModel>) -> (Receiver, EventReceiver) {
    Receiver::start_with_loss_model(Config::fast_local(), model)
        .await
        .expect("receiver start")
}

fn sender_config(receiver: &Receiver) -> Config {
    Config {
        peer_addr: receiver.local_addr(),
        ..Config::fast_local()
    }
}

async fn transfer(config: Config, model: Box<dyn LossModel>, message: &[u8]) -> TransferStats {
    let sender = Sender::with_loss_model(config, model).await.expect("sender bind");
    tokio::time::timeout(TEST_TIMEOUT, sender.send_data(message))
        .await
        .expect("transfer timed out")
        .expect("transfer failed")
}

/// SessionEnded까지의 이벤트 수집
async fn collect_session(events: &mut EventReceiver) -> Vec<ReceiverEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        let done = matches!(event, ReceiverEvent::SessionEnded { .. });
        collected.push(event);
        if done {
            break;
        }
    }
    collected
}

#[tokio::test]
async fn lossless_two_chunk_transfer() {
    let (receiver, mut events) = start_receiver(Box::new(NoLoss)).await;

    let stats = transfer(sender_config(&receiver), Box::new(NoLoss), b"AB").await;
    assert_eq!(stats.total_segments, 2);
    assert_eq!(stats.final_window_base, 2);
    assert_eq!(stats.handshake_attempts, 1);
    assert!(stats.teardown_attempts >= 1);

    let session = collect_session(&mut events).await;
    let chunks: Vec<(u32, Bytes)> = session
        .iter()
        .filter_map(|event| match event {
            ReceiverEvent::Chunk { seq, data } => Some((*seq, data.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        chunks,
        vec![(0, Bytes::from_static(b"A")), (1, Bytes::from_static(b"B"))]
    );
    assert!(session.contains(&ReceiverEvent::Connected));
    assert_eq!(
        session.last(),
        Some(&ReceiverEvent::SessionEnded {
            message: Bytes::from_static(b"AB")
        })
    );

    receiver.stop().await;
}

#[tokio::test]
async fn dropped_syn_is_retransmitted() {
    let (receiver, mut events) = start_receiver(Box::new(NoLoss)).await;

    // 송신 0번째 = 첫 SYN
    let stats = transfer(
        sender_config(&receiver),
        Box::new(ScriptedLoss::new([0])),
        b"AB",
    )
    .await;

    assert_eq!(stats.handshake_attempts, 2);
    assert_eq!(stats.simulated_drops, 1);
    assert_eq!(next_message(&mut events).await.unwrap().as_ref(), b"AB");
    assert_eq!(receiver.stats().syns, 1);

    receiver.stop().await;
}

#[tokio::test]
async fn dropped_data_ack_triggers_go_back_n() {
    // 수신자 송신 0번째 = SYN-ACK, 1번째 = seq 0에 대한 ACK
    let (receiver, mut events) = start_receiver(Box::new(ScriptedLoss::new([1]))).await;

    let stats = transfer(sender_config(&receiver), Box::new(NoLoss), b"AB").await;

    assert!(stats.timeouts >= 1);
    assert!(stats.retransmissions >= 1);
    assert_eq!(stats.final_window_base, 2);
    assert_eq!(next_message(&mut events).await.unwrap().as_ref(), b"AB");

    // 재전송된 seq 0은 중복으로 거부되고 한 번만 받아들여짐
    let receiver_stats = receiver.stats();
    assert_eq!(receiver_stats.accepted_segments, 2);
    assert!(receiver_stats.rejected_segments >= 1);

    receiver.stop().await;
}

#[tokio::test]
async fn cumulative_mode_survives_lost_ack_with_window_in_flight() {
    // 수신자 송신: SYN-ACK(0), ACK 0(1), ACK 1(2) 유실, 이후 ACK 2.. 도착
    let (receiver, mut events) = start_receiver(Box::new(ScriptedLoss::new([2]))).await;

    let config = Config {
        initial_congestion_window: 4,
        ack_mode: AckMode::Cumulative,
        ..sender_config(&receiver)
    };
    let message = b"abcdefgh";
    let stats = transfer(config, Box::new(NoLoss), message).await;

    assert_eq!(stats.final_window_base, message.len() as u32);
    assert_eq!(next_message(&mut events).await.unwrap().as_ref(), message);

    receiver.stop().await;
}

async fn lost_first_segment_with_wide_window(ack_mode: AckMode) {
    let (receiver, mut events) = start_receiver(Box::new(NoLoss)).await;

    // 송신 순서: SYN(0), ACK(1), seq0(2)
    let config = Config {
        initial_congestion_window: 2,
        ack_mode,
        ..sender_config(&receiver)
    };
    let stats = transfer(config, Box::new(ScriptedLoss::new([2])), b"abcd").await;

    assert_eq!(stats.final_window_base, 4);
    assert!(stats.timeouts >= 1);
    assert_eq!(next_message(&mut events).await.unwrap().as_ref(), b"abcd");

    receiver.stop().await;
}

#[tokio::test]
async fn lost_first_segment_with_wide_window_selective() {
    lost_first_segment_with_wide_window(AckMode::Selective).await;
}

#[tokio::test]
async fn lost_first_segment_with_wide_window_cumulative() {
    lost_first_segment_with_wide_window(AckMode::Cumulative).await;
}

#[tokio::test]
async fn random_loss_still_delivers_in_order() {
    let (receiver, mut events) = start_receiver(Box::new(NoLoss)).await;

    let message: Vec<u8> = (0..180u32).map(|i| b'a' + (i % 26) as u8).collect();
    let config = Config {
        chunk_size: 3,
        loss_probability: 0.2,
        loss_seed: Some(7),
        ..sender_config(&receiver)
    };
    let model = Box::new(RandomLoss::new(config.loss_probability, config.loss_seed));
    let stats = transfer(config, model, &message).await;

    assert_eq!(stats.total_segments, 60);
    assert_eq!(stats.final_window_base, 60);
    assert!(stats.simulated_drops > 0);
    assert!(stats.final_congestion_window >= 1);
    assert!(stats.final_congestion_threshold >= 1);

    let received = next_message(&mut events).await.unwrap();
    assert_eq!(received.as_ref(), message.as_slice());

    receiver.stop().await;
}

#[tokio::test]
async fn receiver_resets_between_sessions() {
    let (receiver, mut events) = start_receiver(Box::new(NoLoss)).await;

    transfer(sender_config(&receiver), Box::new(NoLoss), b"first").await;
    assert_eq!(next_message(&mut events).await.unwrap().as_ref(), b"first");

    // 두 번째 송신자는 시퀀스 0부터 다시 시작
    transfer(sender_config(&receiver), Box::new(NoLoss), b"second").await;
    assert_eq!(next_message(&mut events).await.unwrap().as_ref(), b"second");

    assert_eq!(receiver.stats().completed_sessions, 2);
    receiver.stop().await;
}

#[tokio::test]
async fn empty_message_only_handshakes_and_closes() {
    let (receiver, mut events) = start_receiver(Box::new(NoLoss)).await;

    let stats = transfer(sender_config(&receiver), Box::new(NoLoss), b"").await;
    assert_eq!(stats.total_segments, 0);
    assert_eq!(stats.transmissions, 0);

    assert_eq!(next_message(&mut events).await.unwrap().len(), 0);
    receiver.stop().await;
}

#[tokio::test]
async fn dropped_fin_is_retransmitted() {
    let (receiver, mut events) = start_receiver(Box::new(NoLoss)).await;

    // 송신 순서: SYN(0), ACK(1), seq0(2), FIN(3)
    let model = Arc::new(ScriptedLoss::new([3]));
    let stats = transfer(sender_config(&receiver), Box::new(model.clone()), b"Z").await;

    assert_eq!(stats.teardown_attempts, 2);
    assert!(model.attempts() >= 5);
    assert_eq!(next_message(&mut events).await.unwrap().as_ref(), b"Z");

    receiver.stop().await;
}
