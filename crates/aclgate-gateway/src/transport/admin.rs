//! Admin socket: line-delimited JSON over a Unix domain socket.
//!
//! Each connection gets its own task. Requests on one connection are answered
//! in order; each is handled on the blocking pool.

use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use aclgate_core::error::{GatewayError, Result};
use aclgate_core::protocol::admin::AdminResponse;

use crate::dispatch::AdminDispatcher;
use crate::transport::codec::{decode, encode, error_response, MAX_LINE_BYTES};

/// Bind `path`, replacing a stale socket file left by a previous run.
pub fn bind(path: &Path) -> Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale admin socket"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(GatewayError::Internal(format!(
                "remove stale socket {} failed: {e}",
                path.display()
            )))
        }
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            GatewayError::Internal(format!("create {} failed: {e}", parent.display()))
        })?;
    }
    UnixListener::bind(path)
        .map_err(|e| GatewayError::Internal(format!("bind {} failed: {e}", path.display())))
}

/// Accept connections until `shutdown` resolves.
pub async fn serve<F>(listener: UnixListener, dispatcher: AdminDispatcher, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let d = dispatcher.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_conn(stream, d).await {
                            tracing::debug!(error = %e, "admin connection closed with error");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "admin accept failed"),
            },
        }
    }
    tracing::info!("admin socket closed");
}

/// One request line as read off the socket.
enum Line {
    Request(String),
    TooLarge,
    NotUtf8,
}

async fn handle_conn(stream: UnixStream, dispatcher: AdminDispatcher) -> std::io::Result<()> {
    let (rd, mut wr) = stream.into_split();
    let mut reader = BufReader::new(rd);

    while let Some(line) = read_line(&mut reader).await? {
        let resp = match line {
            Line::Request(line) if line.trim().is_empty() => continue,
            Line::Request(line) => answer(&dispatcher, line).await,
            Line::TooLarge => error_response(&GatewayError::BadRequest("request too large".into())),
            Line::NotUtf8 => error_response(&GatewayError::BadRequest("request is not utf-8".into())),
        };
        let mut out = encode(&resp);
        out.push('\n');
        wr.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

/// Read one newline-terminated line, never buffering more than
/// `MAX_LINE_BYTES + 1` bytes of it. The tail of an oversized line is discarded.
async fn read_line<R>(reader: &mut R) -> std::io::Result<Option<Line>>
where
    R: AsyncBufRead + Unpin,
{
    let limit = MAX_LINE_BYTES as u64 + 1;
    let mut buf = Vec::new();
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&b'\n') && buf.len() > MAX_LINE_BYTES {
        loop {
            buf.clear();
            let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
            if n == 0 || buf.last() == Some(&b'\n') {
                break;
            }
        }
        return Ok(Some(Line::TooLarge));
    }

    Ok(Some(match String::from_utf8(buf) {
        Ok(line) => Line::Request(line),
        Err(_) => Line::NotUtf8,
    }))
}

async fn answer(dispatcher: &AdminDispatcher, line: String) -> AdminResponse {
    let req = match decode(&line) {
        Ok(req) => req,
        Err(e) => return error_response(&e),
    };

    let d = dispatcher.clone();
    match tokio::task::spawn_blocking(move || d.handle(req)).await {
        Ok(resp) => resp,
        Err(e) => error_response(&GatewayError::Internal(format!("admin handler failed: {e}"))),
    }
}
