//! Newline-delimited JSON-RPC over the local client's stdin/stdout.
//!
//! Each request runs as its own task, so slow upstream calls do not hold up
//! the reader. Replies funnel through a single writer task to keep output
//! lines whole. Client cancellation is not propagated: a forwarded call runs
//! to completion or timeout.

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::protocol::{INVALID_REQUEST, JSONRPC_VERSION, PARSE_ERROR, RpcError};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

/// A decoded line from the client.
#[derive(Debug, PartialEq)]
enum Incoming {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
    },
    /// A reply to a server-initiated request; the bridge never sends any.
    Response,
    Invalid(Value),
}

fn decode(line: &str) -> Incoming {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return Incoming::Invalid(error_reply(
                Value::Null,
                RpcError::new(PARSE_ERROR, format!("Parse error: {e}")),
            ));
        }
    };

    let id = value.get("id").filter(|id| !id.is_null()).cloned();
    match (value.get("method").and_then(Value::as_str), id) {
        (Some(method), Some(id)) => Incoming::Request {
            id,
            method: method.to_string(),
            params: value.get("params").cloned().unwrap_or_else(|| json!({})),
        },
        (Some(method), None) => Incoming::Notification {
            method: method.to_string(),
        },
        (None, Some(_)) if value.get("result").is_some() || value.get("error").is_some() => {
            Incoming::Response
        }
        (None, id) => Incoming::Invalid(error_reply(
            id.unwrap_or(Value::Null),
            RpcError::new(INVALID_REQUEST, "Invalid Request: missing method"),
        )),
    }
}

fn result_reply(id: Value, result: Value) -> Value {
    json!({"jsonrpc": JSONRPC_VERSION, "id": id, "result": result})
}

fn error_reply(id: Value, error: RpcError) -> Value {
    json!({"jsonrpc": JSONRPC_VERSION, "id": id, "error": error})
}

async fn write_lines<W>(mut output: W, mut rx: mpsc::Receiver<String>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}

/// Serves client requests from `input` until it is closed, then waits for
/// in-flight requests to finish.
pub async fn serve<R, W>(dispatcher: Arc<Dispatcher>, input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<String>(100);
    let writer = tokio::spawn(write_lines(output, rx));
    let mut lines = BufReader::new(input).lines();
    let mut in_flight = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match decode(&line) {
            Incoming::Request { id, method, params } => {
                debug!(method = %method, id = %id, "Client request");
                let dispatcher = Arc::clone(&dispatcher);
                let tx = tx.clone();
                in_flight.spawn(async move {
                    let reply = match dispatcher.handle(&method, params).await {
                        Ok(result) => result_reply(id, result),
                        Err(err) => {
                            debug!(
                                method = %method,
                                code = err.code,
                                "Request failed: {}",
                                err.message
                            );
                            error_reply(id, err)
                        }
                    };
                    if tx.send(reply.to_string()).await.is_err() {
                        warn!(method = %method, "Client output closed before reply was written");
                    }
                });
            }
            Incoming::Notification { method } => {
                debug!(method = %method, "Client notification");
            }
            Incoming::Response => {
                debug!("Ignoring client response to unknown request");
            }
            Incoming::Invalid(reply) => {
                warn!("Rejecting malformed client message");
                if tx.send(reply.to_string()).await.is_err() {
                    warn!("Client output closed before error reply was written");
                }
            }
        }

        while let Some(joined) = in_flight.try_join_next() {
            if let Err(e) = joined {
                error!("Request task failed: {}", e);
            }
        }
    }

    info!(pending = in_flight.len(), "Client input closed");
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!("Request task failed: {}", e);
        }
    }
    drop(tx);

    match writer.await {
        Ok(result) => result?,
        Err(e) => error!("Output writer task failed: {}", e),
    }
    Ok(())
}
