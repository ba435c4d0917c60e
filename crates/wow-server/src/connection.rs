//! The per-connection state machine (Section 4.7 of the design):
//! `Accepted -> ChallengeIssued -> AwaitingSolution -> Verified|Rejected ->
//! Closed`. One task per TCP conversation; the whole-conversation deadline
//! is enforced by the caller wrapping [`handle_connection`] in
//! `tokio::time::timeout`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use wow_challenge::Solution;

use crate::log_sink::LogEvent;
use crate::state::ServerState;

/// One handled TCP conversation (Section 3 of the design).
#[derive(Clone, Debug)]
pub struct ConnectionRecord {
    pub id: String,
    pub client_id: String,
    pub remote_ip: String,
    pub connected_at: u64,
    pub disconnected_at: Option<u64>,
    pub status: ConnectionStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Solving,
    Disconnected,
    Failed,
}

/// Maximum length of the ASCII nonce line read from the client (Section 6).
const MAX_NONCE_LINE_BYTES: usize = 1024;

/// Maximum length of the quote line written back (Section 6).
const MAX_QUOTE_LINE_BYTES: usize = 4 * 1024;

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Drive one accepted socket through the full state machine. Returns once
/// the conversation is closed; the caller is responsible for the
/// whole-conversation deadline (via `tokio::time::timeout`) and for
/// spawning one task per connection.
pub async fn handle_connection(state: Arc<ServerState>, stream: TcpStream, remote_addr: SocketAddr) {
    let client_id = uuid::Uuid::new_v4().to_string();
    let remote_ip = remote_addr.ip();
    let connection_id = uuid::Uuid::new_v4().to_string();

    let mut record = ConnectionRecord {
        id: connection_id,
        client_id: client_id.clone(),
        remote_ip: remote_ip.to_string(),
        connected_at: now_unix(),
        disconnected_at: None,
        status: ConnectionStatus::Connected,
    };
    emit(&state, "info", "connection accepted", &record);

    let mut stream = stream;
    if let Err(reason) = run(&state, &mut stream, &client_id, remote_ip, &mut record).await {
        record.status = ConnectionStatus::Failed;
        record.disconnected_at = Some(now_unix());
        emit(&state, "warn", reason, &record);
        let _ = stream.write_all(format!("Error: {reason}\n").as_bytes()).await;
    }

    let _ = stream.shutdown().await;
}

/// The happy-path body of the state machine; any early return is a
/// rejection reason surfaced to the client as a generic error line.
async fn run(
    state: &Arc<ServerState>,
    stream: &mut TcpStream,
    client_id: &str,
    remote_ip: std::net::IpAddr,
    record: &mut ConnectionRecord,
) -> Result<(), &'static str> {
    let behavior = state.tracker.record_connection(remote_ip).await;

    let challenge = wow_challenge::generate(
        behavior.difficulty,
        state.config.algorithm,
        client_id,
        &*state.key_store,
    )
    .map_err(|_| "failed to generate challenge")?;

    record.status = ConnectionStatus::Solving;
    emit(state, "info", "challenge issued", record);

    wow_challenge::frame::write_challenge(stream, &challenge, state.config.challenge_format)
        .await
        .map_err(|_| "failed to write challenge")?;

    let nonce = read_nonce_line(stream).await.map_err(|_| "timed out awaiting solution")?;

    let solution = Solution {
        challenge,
        nonce,
        client_id: client_id.to_string(),
    };

    let outcome = state.pipeline.validate(&solution, remote_ip);
    let solve_time_ms = now_unix().saturating_sub(record.connected_at) * 1000;

    match outcome {
        Ok(()) => {
            state.tracker.record_challenge_result(remote_ip, true, solve_time_ms).await;
            let quote = state.quote_source.get().map_err(|_| "no quote available")?;
            let quote = if quote.len() > MAX_QUOTE_LINE_BYTES {
                quote[..MAX_QUOTE_LINE_BYTES].to_string()
            } else {
                quote
            };
            stream
                .write_all(format!("{quote}\n").as_bytes())
                .await
                .map_err(|_| "failed to write quote")?;

            record.status = ConnectionStatus::Disconnected;
            record.disconnected_at = Some(now_unix());
            emit(state, "info", "verified, quote delivered", record);
            Ok(())
        }
        Err(_) => {
            state.tracker.record_challenge_result(remote_ip, false, 0).await;
            Err("Invalid proof of work")
        }
    }
}

/// Read one `\n`-terminated ASCII line, capped at
/// [`MAX_NONCE_LINE_BYTES`] (Section 6).
async fn read_nonce_line(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let mut limited = (&mut reader).take(MAX_NONCE_LINE_BYTES as u64);
    limited.read_line(&mut line).await?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

fn emit(state: &ServerState, level: &'static str, message: &str, record: &ConnectionRecord) {
    let event = LogEvent::new(level, message)
        .with_field("connection_id", &record.id)
        .with_field("client_id", &record.client_id)
        .with_field("remote_ip", &record.remote_ip)
        .with_field("status", format!("{:?}", record.status));
    state.log_sink.emit(event);
}

/// Whole-conversation timeout wrapper (Section 5: default 30 s, on expiry
/// the handler must abort and treat the connection as a failure).
pub async fn handle_connection_with_deadline(
    state: Arc<ServerState>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    deadline: Duration,
) {
    if tokio::time::timeout(deadline, handle_connection(state.clone(), stream, remote_addr))
        .await
        .is_err()
    {
        state.tracker.record_challenge_result(remote_addr.ip(), false, 0).await;
        tracing::warn!(remote_ip = %remote_addr.ip(), "connection deadline exceeded");
    }
}
