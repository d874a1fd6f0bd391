//! RDT 송신자 - Reliable Datagram Transfer
//!
//! 핸드쉐이크 -> 윈도우 기반 전송 -> 종료. 수신자를 먼저 실행해야 한다.
//!
//! 사용법:
//!   cargo run --release --bin rdt-sender -- [OPTIONS]
//!
//! 예시:
//!   # 기본 메시지 전송 (5% 손실 시뮬레이션)
//!   cargo run --release --bin rdt-sender -- --peer 127.0.0.1:12345
//!
//!   # 파일을 100바이트 청크로, 20% 손실
//!   cargo run --release --bin rdt-sender -- -f data.txt --chunk-size 100 --loss 0.2

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rdt::{AckMode, Config, Sender};

const DEFAULT_MESSAGE: &str = "Did you know? Octopuses have three hearts and blue blood. No matter how smart they are, that's pretty freaky!";

/// 송신자 실행 설정
struct SenderArgs {
    message: Option<String>,
    file_path: Option<PathBuf>,
    config: Config,
}

fn parse_value<T: FromStr>(args: &[String], i: usize, name: &str) -> T {
    match args.get(i + 1).map(|v| v.parse()) {
        Some(Ok(value)) => value,
        _ => {
            eprintln!("{} 값이 올바르지 않음", name);
            std::process::exit(2);
        }
    }
}

fn parse_args() -> SenderArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = SenderArgs {
        message: None,
        file_path: None,
        config: Config::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--peer" | "-p" => {
                parsed.config.peer_addr = parse_value::<SocketAddr>(&args, i, "--peer");
                i += 1;
            }
            "--bind" | "-b" => {
                parsed.config.bind_addr = parse_value::<SocketAddr>(&args, i, "--bind");
                i += 1;
            }
            "--message" | "-m" => {
                parsed.message = Some(parse_value(&args, i, "--message"));
                i += 1;
            }
            "--file" | "-f" => {
                parsed.file_path = Some(parse_value(&args, i, "--file"));
                i += 1;
            }
            "--chunk-size" => {
                parsed.config.chunk_size = parse_value(&args, i, "--chunk-size");
                i += 1;
            }
            "--loss" => {
                parsed.config.loss_probability = parse_value(&args, i, "--loss");
                i += 1;
            }
            "--seed" => {
                parsed.config.loss_seed = Some(parse_value(&args, i, "--seed"));
                i += 1;
            }
            "--max-retries" => {
                parsed.config.max_retries = Some(parse_value(&args, i, "--max-retries"));
                i += 1;
            }
            "--cumulative" => {
                parsed.config.ack_mode = AckMode::Cumulative;
            }
            "--help" | "-h" => {
                println!(
                    r#"RDT Sender - Reliable Datagram Transfer 송신자

사용법:
  cargo run --release --bin rdt-sender -- [OPTIONS]

옵션:
  -p, --peer <ADDR>       수신자 주소 (기본: 127.0.0.1:12345)
  -b, --bind <ADDR>       로컬 바인드 주소 (기본: 0.0.0.0:0)
  -m, --message <TEXT>    전송할 메시지
  -f, --file <PATH>       전송할 파일 경로
  --chunk-size <SIZE>     청크 크기 바이트 (기본: 1)
  --loss <P>              송신 손실 확률 0.0~1.0 미만 (기본: 0.05)
  --seed <N>              손실 RNG 시드
  --max-retries <N>       핸드쉐이크/종료 재전송 한도 (기본: 무한)
  --cumulative            누적 ACK 처리
  -h, --help              이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            other => warn!("알 수 없는 옵션 무시: {}", other),
        }
        i += 1;
    }

    parsed
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args();

    // 전송할 데이터 준비
    let data = match (&args.file_path, &args.message) {
        (Some(path), _) => {
            info!("Loading file: {:?}", path);
            std::fs::read(path)?
        }
        (None, Some(message)) => message.clone().into_bytes(),
        (None, None) => DEFAULT_MESSAGE.as_bytes().to_vec(),
    };

    info!("RDT Sender starting...");
    info!("Peer address: {}", args.config.peer_addr);
    info!("Chunk size: {} bytes", args.config.chunk_size);
    info!("Simulated loss: {:.1}%", args.config.loss_probability * 100.0);
    info!("Data size: {} bytes", data.len());

    let sender = Sender::new(args.config).await?;
    let stats = sender.send_data(&data).await?;

    info!("Transfer complete!");
    info!("  {}", stats.summary());
    Ok(())
}
