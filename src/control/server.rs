use std::io;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;

use super::command::parse_command;
use super::handler::handle;
use super::response::Response;

/// Bind the control socket, replacing a stale socket file left by an earlier
/// run.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("removed stale socket {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    UnixListener::bind(path)
}

/// Accept connections until `cancel` fires. Each connection gets its own
/// task; all of them are shut down before this returns.
pub async fn serve(listener: UnixListener, engine: Arc<Engine>, cancel: CancellationToken) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    debug!("control client connected");
                    let engine = Arc::clone(&engine);
                    let cancel = cancel.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, engine, cancel).await {
                            debug!("control client error: {e}");
                        }
                    });
                }
                Err(e) => warn!("control accept failed: {e}"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    connections.shutdown().await;
    info!("control server stopped");
}

/// Serve one client: read a line, answer a line, until `QUIT`, EOF, an I/O
/// error or cancellation.
pub async fn handle_connection<S>(stream: S, engine: Arc<Engine>, cancel: CancellationToken) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read?,
        };
        if read == 0 {
            break;
        }

        let (response, quit) = match std::str::from_utf8(&buf) {
            Ok(line) => match parse_command(line) {
                Ok(command) => (handle(&engine, &command), command.verb == "QUIT"),
                Err(e) => (Response::error(e.to_string()), false),
            },
            Err(_) => (Response::error("line is not valid UTF-8"), false),
        };
        writer.write_all(response.to_line().as_bytes()).await?;
        writer.flush().await?;
        if quit {
            break;
        }
    }
    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tokio::io::duplex;

    fn engine() -> Arc<Engine> {
        let mut config = Config::default();
        config.station.callsign = "N0CALL".into();
        config.engine.decoder = "null".into();
        Arc::new(Engine::new(config).unwrap())
    }

    #[tokio::test]
    async fn test_lines_answered_until_quit() {
        let (client, server) = duplex(4096);
        let task = tokio::spawn(handle_connection(server, engine(), CancellationToken::new()));

        let (reader, mut writer) = tokio::io::split(client);
        let mut replies = BufReader::new(reader).lines();

        writer.write_all(b"PING\n\nBOGUS\nQUIT\nSTATUS\n").await.unwrap();

        let ping: Response = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert!(ping.success);
        let empty: Response = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(empty.error.as_deref(), Some("invalid command: empty command"));
        let bogus: Response = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert!(!bogus.success);
        let quit: Response = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert!(quit.success);

        assert!(replies.next_line().await.unwrap().is_none());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_answered_and_connection_kept() {
        let (client, server) = duplex(4096);
        let task = tokio::spawn(handle_connection(server, engine(), CancellationToken::new()));

        let (reader, mut writer) = tokio::io::split(client);
        let mut replies = BufReader::new(reader).lines();

        writer.write_all(b"PI\xffNG\nPING\n").await.unwrap();

        let garbled: Response = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert!(!garbled.success);
        assert_eq!(garbled.error.as_deref(), Some("line is not valid UTF-8"));
        let ping: Response = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert!(ping.success);

        writer.shutdown().await.unwrap();
        assert!(replies.next_line().await.unwrap().is_none());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_closes_connection() {
        let (client, server) = duplex(1024);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(handle_connection(server, engine(), cancel.clone()));
        cancel.cancel();
        task.await.unwrap().unwrap();
        drop(client);
    }
}
