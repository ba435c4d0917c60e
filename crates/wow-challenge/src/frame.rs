//! Length-prefixed wire framing (Section 4.4 of the design):
//! `[format_tag:1B][length:4B BE][payload:lengthB]`.
//!
//! The length is checked against [`MAX_FRAME_LEN`] before any payload buffer
//! is allocated, so an attacker cannot force a large allocation with a
//! forged length prefix. Reads loop until the full payload has arrived
//! (`read_exact` handles this; partial reads are never treated as EOF).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{self, Format};
use crate::{Challenge, ChallengeError, Result, Solution};

/// Maximum accepted frame payload, in bytes (Section 4.4: 10 KiB cap).
pub const MAX_FRAME_LEN: usize = 10 * 1024;

async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, tag: u8, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(ChallengeError::FrameTooLarge);
    }
    let mut header = [0u8; 5];
    header[0] = tag;
    header[1..5].copy_from_slice(&(payload.len() as u32).to_be_bytes());
    stream.write_all(&header).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<(u8, Vec<u8>)> {
    let mut header = [0u8; 5];
    stream.read_exact(&mut header).await?;
    let tag = header[0];
    let len_bytes: [u8; 4] = header[1..5]
        .try_into()
        .map_err(|_| ChallengeError::Codec("truncated frame length header".to_string()))?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_FRAME_LEN {
        return Err(ChallengeError::FrameTooLarge);
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok((tag, payload))
}

/// Write a challenge to `stream` in the given wire format.
pub async fn write_challenge<W: AsyncWrite + Unpin>(
    stream: &mut W,
    challenge: &Challenge,
    format: Format,
) -> Result<()> {
    let payload = codec::encode(challenge, format)?;
    write_frame(stream, format.tag(), &payload).await
}

/// Read a challenge from `stream`, decoding with whichever format the
/// sender tagged the frame with.
pub async fn read_challenge<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Challenge> {
    let (tag, payload) = read_frame(stream).await?;
    let format = Format::from_tag(tag)
        .ok_or_else(|| ChallengeError::Codec(format!("unknown format tag {tag}")))?;
    codec::decode(&payload, format)
}

/// Write a solution to `stream`. Solutions always travel as JSON (Section
/// 4.4 only fixes a binary layout for challenges).
pub async fn write_solution<W: AsyncWrite + Unpin>(stream: &mut W, solution: &Solution) -> Result<()> {
    let payload = codec::encode_solution(solution)?;
    write_frame(stream, Format::Json.tag(), &payload).await
}

/// Read a solution from `stream`.
pub async fn read_solution<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Solution> {
    let (tag, payload) = read_frame(stream).await?;
    if Format::from_tag(tag) != Some(Format::Json) {
        return Err(ChallengeError::Codec("solutions must be framed as JSON".into()));
    }
    codec::decode_solution(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wow_keystore::sqlite::SqliteKeyStore;

    fn secret() -> String {
        "x".repeat(wow_keystore::crypto::MIN_MASTER_SECRET_LEN)
    }

    #[tokio::test]
    async fn test_write_then_read_challenge_json() {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        let challenge =
            crate::generate(2, wow_pow::Algorithm::Sha256, "client-1", &store).expect("generate");

        let mut buf = Vec::new();
        write_challenge(&mut buf, &challenge, Format::Json).await.expect("write");

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_challenge(&mut cursor).await.expect("read");
        assert_eq!(decoded.seed, challenge.seed);
        assert_eq!(decoded.signature, challenge.signature);
    }

    #[tokio::test]
    async fn test_write_then_read_challenge_binary() {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        let challenge = crate::generate(2, wow_pow::Algorithm::Argon2id, "client-1", &store)
            .expect("generate");

        let mut buf = Vec::new();
        write_challenge(&mut buf, &challenge, Format::Binary).await.expect("write");

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_challenge(&mut cursor).await.expect("read");
        assert_eq!(decoded.argon2_params, challenge.argon2_params);
    }

    #[tokio::test]
    async fn test_write_then_read_solution() {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        let challenge =
            crate::generate(1, wow_pow::Algorithm::Sha256, "client-1", &store).expect("generate");
        let solution = Solution {
            challenge,
            nonce: "99".to_string(),
            client_id: "client-1".to_string(),
        };

        let mut buf = Vec::new();
        write_solution(&mut buf, &solution).await.expect("write");

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_solution(&mut cursor).await.expect("read");
        assert_eq!(decoded.nonce, "99");
        assert_eq!(decoded.client_id, "client-1");
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_rejected_without_reading_payload() {
        // Forge a frame header claiming a payload far past MAX_FRAME_LEN but
        // supply no payload bytes at all; rejection must happen purely from
        // the length prefix, before any read of the (nonexistent) payload.
        let mut forged = vec![Format::Json.tag()];
        forged.extend_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());

        let mut cursor = std::io::Cursor::new(forged);
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(ChallengeError::FrameTooLarge)));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_an_io_error_not_a_panic() {
        let mut forged = vec![Format::Json.tag()];
        forged.extend_from_slice(&10u32.to_be_bytes());
        forged.extend_from_slice(b"short"); // fewer than the declared 10 bytes

        let mut cursor = std::io::Cursor::new(forged);
        let result = read_frame(&mut cursor).await;
        assert!(result.is_err());
    }
}
