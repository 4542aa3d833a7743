//! TCP front end
//!
//! One task per connection; commands on a connection execute in order.
//! The engine's file I/O is blocking, so each operation hops to the
//! blocking thread pool.
//!
//! Verbs: SET key value, GET key, DEL key (case-insensitive).

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task;
use tracing::{info, warn};

use bincask_core::BincaskEngine;

use crate::resp;

/// Accept connections forever, spawning a task per client.
pub async fn serve(listener: TcpListener, engine: Arc<BincaskEngine>) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        info!(%peer, "client connected");

        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            match handle_connection(socket, engine).await {
                Ok(()) => info!(%peer, "client disconnected"),
                Err(e) => warn!(%peer, error = %e, "connection error"),
            }
        });
    }
}

/// Read commands off one connection until it closes or violates the protocol.
async fn handle_connection(
    mut socket: TcpStream,
    engine: Arc<BincaskEngine>,
) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(4 * 1024);

    loop {
        // Drain every complete command currently buffered.
        loop {
            match resp::parse_command(&mut buf) {
                Ok(Some(parts)) => {
                    let reply = dispatch(&engine, parts).await;
                    socket.write_all(&reply).await?;
                }
                Ok(None) => break,
                Err(e) => {
                    // Protocol violations are unrecoverable: framing is lost.
                    socket.write_all(&resp::error(&e.to_string())).await?;
                    return Ok(());
                }
            }
        }

        if socket.read_buf(&mut buf).await? == 0 {
            return Ok(());
        }
    }
}

/// Execute one parsed command against the engine and build the reply.
async fn dispatch(engine: &Arc<BincaskEngine>, mut parts: Vec<Vec<u8>>) -> Vec<u8> {
    if parts.is_empty() {
        return resp::error("empty command");
    }
    let verb = parts[0].to_ascii_uppercase();

    match (verb.as_slice(), parts.len()) {
        (b"SET", 3) => {
            let value = parts.remove(2);
            let key = parts.remove(1);
            let engine = Arc::clone(engine);
            match task::spawn_blocking(move || engine.insert(&key, &value)).await {
                Ok(Ok(())) => resp::ok().to_vec(),
                Ok(Err(e)) => resp::error(&e.to_string()),
                Err(_) => resp::error("internal error"),
            }
        }
        (b"GET", 2) => {
            let key = parts.remove(1);
            let engine = Arc::clone(engine);
            match task::spawn_blocking(move || engine.get(&key)).await {
                Ok(Ok(Some(value))) => resp::bulk(&value),
                Ok(Ok(None)) => resp::nil().to_vec(),
                Ok(Err(e)) => resp::error(&e.to_string()),
                Err(_) => resp::error("internal error"),
            }
        }
        (b"DEL", 2) => {
            let key = parts.remove(1);
            let engine = Arc::clone(engine);
            match task::spawn_blocking(move || engine.erase(&key)).await {
                Ok(Ok(erased)) => resp::integer(erased as i64),
                Ok(Err(e)) => resp::error(&e.to_string()),
                Err(_) => resp::error("internal error"),
            }
        }
        (b"SET", n) => resp::error(&format!("wrong number of arguments for SET: {}", n - 1)),
        (b"GET", n) => resp::error(&format!("wrong number of arguments for GET: {}", n - 1)),
        (b"DEL", n) => resp::error(&format!("wrong number of arguments for DEL: {}", n - 1)),
        _ => resp::error("unknown command"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bincask_core::{Config, Mode};
    use tempfile::TempDir;

    fn test_engine() -> (Arc<BincaskEngine>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let engine = BincaskEngine::open(tmp.path(), 4, Mode::Create, Config::default()).unwrap();
        (Arc::new(engine), tmp)
    }

    fn cmd(parts: &[&[u8]]) -> Vec<Vec<u8>> {
        parts.iter().map(|p| p.to_vec()).collect()
    }

    #[tokio::test]
    async fn test_dispatch_set_get_del() {
        let (engine, _tmp) = test_engine();

        assert_eq!(dispatch(&engine, cmd(&[b"SET", b"k", b"v"])).await, b"+OK\r\n");
        assert_eq!(dispatch(&engine, cmd(&[b"GET", b"k"])).await, b"$1\r\nv\r\n");
        assert_eq!(dispatch(&engine, cmd(&[b"DEL", b"k"])).await, b":1\r\n");
        assert_eq!(dispatch(&engine, cmd(&[b"GET", b"k"])).await, b"$-1\r\n");
        assert_eq!(dispatch(&engine, cmd(&[b"DEL", b"k"])).await, b":0\r\n");
    }

    #[tokio::test]
    async fn test_dispatch_is_case_insensitive() {
        let (engine, _tmp) = test_engine();
        assert_eq!(dispatch(&engine, cmd(&[b"set", b"k", b"v"])).await, b"+OK\r\n");
        assert_eq!(dispatch(&engine, cmd(&[b"get", b"k"])).await, b"$1\r\nv\r\n");
    }

    #[tokio::test]
    async fn test_dispatch_arity_errors() {
        let (engine, _tmp) = test_engine();
        let reply = dispatch(&engine, cmd(&[b"SET", b"k"])).await;
        assert!(reply.starts_with(b"-ERR"));
        let reply = dispatch(&engine, cmd(&[b"GET"])).await;
        assert!(reply.starts_with(b"-ERR"));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_verb() {
        let (engine, _tmp) = test_engine();
        let reply = dispatch(&engine, cmd(&[b"FLUSH"])).await;
        assert!(reply.starts_with(b"-ERR"));
    }
}
