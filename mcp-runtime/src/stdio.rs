use std::collections::HashMap;
use std::sync::Arc;

use cogniz_core::auth::Credential;
use serde_json::Value;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};

use crate::server::{McpServer, RpcError, error_response};

/// How a message arrived; the answer goes back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON document per line.
    Line,
    /// `Content-Length` header block followed by the body.
    ContentLength,
}

#[derive(Debug)]
pub struct Frame {
    /// `Err` carries the JSON parse error for a well-framed message.
    pub payload: Result<Value, String>,
    pub framing: Framing,
}

/// Largest `Content-Length` body accepted on stdin.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Read the next message. `Ok(None)` on clean EOF.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Frame>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(length) = content_length(trimmed)? {
            return read_framed_body(reader, length).await.map(Some);
        }
        return Ok(Some(Frame {
            payload: serde_json::from_str(trimmed).map_err(|e| format!("Parse error: {e}")),
            framing: Framing::Line,
        }));
    }
}

fn content_length(line: &str) -> Result<Option<usize>, std::io::Error> {
    let Some((name, value)) = line.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return Ok(None);
    }
    let length = value.trim().parse::<usize>().map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Invalid Content-Length header",
        )
    })?;
    if length > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Content-Length {length} exceeds the {MAX_FRAME_BYTES} byte limit"),
        ));
    }
    Ok(Some(length))
}

async fn read_framed_body<R>(reader: &mut R, length: usize) -> Result<Frame, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    // Skip remaining headers up to the blank separator line.
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }
        if line.trim().is_empty() {
            break;
        }
    }
    let mut payload = vec![0_u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(Frame {
        payload: serde_json::from_slice(&payload).map_err(|e| format!("Parse error: {e}")),
        framing: Framing::ContentLength,
    })
}

pub async fn write_message<W>(
    writer: &mut W,
    value: &Value,
    framing: Framing,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await
}

/// Serve MCP over stdin/stdout until stdin closes.
pub async fn serve_stdio(server: McpServer, credential: Credential) -> Result<(), String> {
    serve(server, credential, BufReader::new(io::stdin()), io::stdout()).await
}

/// Each `tools/call` runs as its own task so a `notifications/cancelled`
/// can abort it; a cancelled request gets no response. Everything else is
/// answered inline, in arrival order.
pub async fn serve<R, W>(
    server: McpServer,
    credential: Credential,
    mut reader: R,
    writer: W,
) -> Result<(), String>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let credential = Arc::new(credential);
    let (tx, rx) = mpsc::unbounded_channel::<(Value, Framing)>();
    let writer_task = tokio::spawn(write_loop(writer, rx));
    let mut tasks = JoinSet::new();
    let mut in_flight: HashMap<String, AbortHandle> = HashMap::new();

    let read_result = loop {
        let frame = match read_message(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(e) => break Err(format!("Failed to read MCP message: {e}")),
        };
        while tasks.try_join_next().is_some() {}
        in_flight.retain(|_, handle| !handle.is_finished());

        let incoming = match frame.payload {
            Ok(incoming) => incoming,
            Err(message) => {
                let _ = tx.send((
                    error_response(Value::Null, RpcError::parse_error(message)),
                    frame.framing,
                ));
                continue;
            }
        };

        if let Some(request_key) = cancelled_request(&incoming) {
            if let Some(handle) = in_flight.remove(&request_key) {
                handle.abort();
                tracing::info!(
                    event = "tool_call_cancelled",
                    request_id = %request_key,
                    "Cancelled in-flight tool call"
                );
            }
            continue;
        }

        if let Some(request_key) = tool_call_key(&incoming) {
            let server = server.clone();
            let credential = Arc::clone(&credential);
            let tx = tx.clone();
            let framing = frame.framing;
            let handle = tasks.spawn(async move {
                let responses = server
                    .handle_incoming_message(incoming, Some(&credential))
                    .await;
                for response in responses {
                    let _ = tx.send((response, framing));
                }
            });
            in_flight.insert(request_key, handle);
            continue;
        }

        for response in server
            .handle_incoming_message(incoming, Some(&credential))
            .await
        {
            let _ = tx.send((response, frame.framing));
        }
    };

    while tasks.join_next().await.is_some() {}
    drop(tx);
    let write_result = writer_task
        .await
        .map_err(|e| format!("MCP writer task failed: {e}"))?;
    read_result?;
    write_result
}

async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<(Value, Framing)>,
) -> Result<(), String>
where
    W: AsyncWrite + Unpin,
{
    while let Some((response, framing)) = rx.recv().await {
        write_message(&mut writer, &response, framing)
            .await
            .map_err(|e| format!("Failed to write MCP response: {e}"))?;
    }
    Ok(())
}

fn tool_call_key(incoming: &Value) -> Option<String> {
    if incoming.get("method").and_then(Value::as_str) != Some("tools/call") {
        return None;
    }
    incoming.get("id").map(Value::to_string)
}

fn cancelled_request(incoming: &Value) -> Option<String> {
    if incoming.get("method").and_then(Value::as_str) != Some("notifications/cancelled") {
        return None;
    }
    incoming
        .get("params")
        .and_then(|params| params.get("requestId"))
        .map(Value::to_string)
}
