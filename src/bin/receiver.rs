//! RDT 수신자 - Reliable Datagram Transfer
//!
//! Go-Back-N 수신자. 먼저 실행해 두고 송신자를 연결한다.
//!
//! 사용법:
//!   cargo run --release --bin rdt-receiver -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin rdt-receiver -- --bind 0.0.0.0:12345

use std::net::SocketAddr;
use std::str::FromStr;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rdt::receiver::{Receiver, ReceiverEvent};
use rdt::Config;

fn parse_value<T: FromStr>(args: &[String], i: usize, name: &str) -> T {
    match args.get(i + 1).map(|v| v.parse()) {
        Some(Ok(value)) => value,
        _ => {
            eprintln!("{} 값이 올바르지 않음", name);
            std::process::exit(2);
        }
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::receiver();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                config.bind_addr = parse_value::<SocketAddr>(&args, i, "--bind");
                i += 1;
            }
            "--loss" => {
                config.loss_probability = parse_value(&args, i, "--loss");
                i += 1;
            }
            "--seed" => {
                config.loss_seed = Some(parse_value(&args, i, "--seed"));
                i += 1;
            }
            "--help" | "-h" => {
                println!(
                    r#"RDT Receiver - Reliable Datagram Transfer 수신자

사용법:
  cargo run --release --bin rdt-receiver -- [OPTIONS]

옵션:
  -b, --bind <ADDR>   바인드 주소 (기본: 0.0.0.0:12345)
  --loss <P>          ACK 송신 손실 확률 0.0~1.0 미만 (기본: 0)
                      0보다 크면 송신자는 --cumulative로 실행해야 함
  --seed <N>          손실 RNG 시드
  -h, --help          이 도움말 출력

로그 레벨은 RUST_LOG 환경변수로 조정 (예: RUST_LOG=rdt=debug)
"#
                );
                std::process::exit(0);
            }
            other => warn!("알 수 없는 옵션 무시: {}", other),
        }
        i += 1;
    }

    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = parse_args();

    info!("RDT Receiver starting...");
    info!("Bind address: {}", config.bind_addr);
    if config.loss_probability > 0.0 {
        warn!(
            "ACK 손실 {:.1}%: 송신자가 --cumulative 없이 실행되면 유실된 ACK에서 멈출 수 있음",
            config.loss_probability * 100.0
        );
    }

    let (receiver, mut events) = Receiver::start(config).await?;
    info!("Listening for packets on {}", receiver.local_addr());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ReceiverEvent::Connected) => info!("Connection established"),
                Some(ReceiverEvent::Chunk { seq, data }) => {
                    info!("Received packet with sequence number {}: {}", seq, String::from_utf8_lossy(&data));
                }
                Some(ReceiverEvent::SessionEnded { message }) => {
                    info!("Session closed, {} bytes received", message.len());
                    info!("Message: {}", String::from_utf8_lossy(&message));
                    let stats = receiver.stats();
                    info!(
                        "  accepted={} rejected={} acks={} sessions={}",
                        stats.accepted_segments,
                        stats.rejected_segments,
                        stats.acks_sent,
                        stats.completed_sessions
                    );
                }
                None => {
                    if !receiver.is_running() {
                        warn!("수신 루프가 종료됨");
                    }
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }

    receiver.stop().await;
    Ok(())
}
