//! 패킷 정의
//!
//! 타입 태그가 없는 세 가지 와이어 형태:
//! - A: `[seq u32 BE][payload]` - 송신자의 SYN / ACK / FIN / 데이터
//! - B: `[seq u32 BE]` - 수신자의 세그먼트 ACK
//! - C: `[ASCII 토큰]` - 수신자의 SYN-ACK / FIN-ACK (시퀀스 없음)
//!
//! 어떤 형태인지는 역할과 대화 단계로 판단한다.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// 시퀀스 번호 타입
pub type SeqNum = u32;

/// 시퀀스 헤더 길이 (바이트)
pub const SEQ_LEN: usize = 4;

/// 제어 토큰
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlToken {
    Syn,
    Ack,
    Fin,
    SynAck,
    FinAck,
}

impl ControlToken {
    /// ASCII 표현
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            ControlToken::Syn => b"SYN",
            ControlToken::Ack => b"ACK",
            ControlToken::Fin => b"FIN",
            ControlToken::SynAck => b"SYN-ACK",
            ControlToken::FinAck => b"FIN-ACK",
        }
    }

    /// 정확히 일치하는 토큰 찾기
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"SYN" => Some(ControlToken::Syn),
            b"ACK" => Some(ControlToken::Ack),
            b"FIN" => Some(ControlToken::Fin),
            b"SYN-ACK" => Some(ControlToken::SynAck),
            b"FIN-ACK" => Some(ControlToken::FinAck),
            _ => None,
        }
    }
}

impl std::fmt::Display for ControlToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 토큰은 항상 ASCII
        f.write_str(std::str::from_utf8(self.as_bytes()).unwrap_or("?"))
    }
}

/// 형태 A 인코딩
pub fn encode_framed(seq: SeqNum, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(SEQ_LEN + payload.len());
    buf.put_u32(seq);
    buf.put_slice(payload);
    buf.freeze()
}

/// 형태 A 디코딩
pub fn decode_framed(bytes: &[u8]) -> Result<(SeqNum, Bytes)> {
    if bytes.len() < SEQ_LEN {
        return Err(Error::MalformedPacket {
            reason: "시퀀스 헤더보다 짧음",
            len: bytes.len(),
        });
    }

    let mut buf = bytes;
    let seq = buf.get_u32();
    Ok((seq, Bytes::copy_from_slice(buf)))
}

/// 형태 B 인코딩
pub fn encode_ack(seq: SeqNum) -> Bytes {
    Bytes::copy_from_slice(&seq.to_be_bytes())
}

/// 형태 B 디코딩 (정확히 4바이트만 허용)
pub fn decode_ack(bytes: &[u8]) -> Result<SeqNum> {
    if bytes.len() != SEQ_LEN {
        return Err(Error::MalformedPacket {
            reason: "ACK는 4바이트여야 함",
            len: bytes.len(),
        });
    }

    let mut buf = bytes;
    Ok(buf.get_u32())
}

/// 형태 C 인코딩
pub fn encode_token(token: ControlToken) -> Bytes {
    Bytes::from_static(token.as_bytes())
}

/// 형태 C 디코딩
pub fn decode_token(bytes: &[u8]) -> Option<ControlToken> {
    ControlToken::from_bytes(bytes)
}

/// 수신자 입장에서 본 들어온 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// 송신자의 제어 메시지 (SYN / ACK / FIN)
    Control(ControlToken),

    /// 데이터 세그먼트
    Data { seq: SeqNum, payload: Bytes },
}

impl Inbound {
    /// 형태 A 패킷 분류
    ///
    /// 헤더 뒤 페이로드가 `SYN`, `ACK`, `FIN` 이면 제어 메시지,
    /// 나머지는 모두 데이터로 본다.
    pub fn classify(bytes: &[u8]) -> Result<Self> {
        let (seq, payload) = decode_framed(bytes)?;

        match ControlToken::from_bytes(&payload) {
            Some(token @ (ControlToken::Syn | ControlToken::Ack | ControlToken::Fin)) => {
                Ok(Inbound::Control(token))
            }
            _ => Ok(Inbound::Data { seq, payload }),
        }
    }
}
