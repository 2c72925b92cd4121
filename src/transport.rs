use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::EngineConfig;
use crate::error::SendError;

/// Delivers one rendered message.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: &str) -> Result<(), SendError>;
}

/// Opens a fresh TCP connection for every message, writes the payload and a
/// trailing newline, then closes. Connections are never reused.
#[derive(Debug, Clone)]
pub struct TcpSender {
    destination: String,
    timeout: Duration,
}

impl TcpSender {
    pub fn new(destination: impl Into<String>, timeout: Duration) -> Self {
        Self {
            destination: destination.into(),
            timeout,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.destination.clone(), config.timeout)
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

#[async_trait]
impl Transport for TcpSender {
    async fn send(&self, payload: &str) -> Result<(), SendError> {
        let mut stream = bounded(self.timeout, TcpStream::connect(self.destination.as_str()))
            .await
            .map_err(|source| SendError::Dial {
                destination: self.destination.clone(),
                source,
            })?;

        let mut line = String::with_capacity(payload.len() + 1);
        line.push_str(payload);
        line.push('\n');
        let written = bounded(self.timeout, stream.write_all(line.as_bytes())).await;

        if let Err(e) = stream.shutdown().await {
            log::error!("unable to close tcp connection to {}: {e}", self.destination);
        }

        written.map_err(|source| SendError::Write {
            destination: self.destination.clone(),
            source,
        })
    }
}

/// Apply the connection timeout to one I/O step. A zero timeout waits forever.
async fn bounded<T>(timeout: Duration, fut: impl Future<Output = io::Result<T>>) -> io::Result<T> {
    if timeout.is_zero() {
        return fut.await;
    }
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("timed out after {timeout:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_writes_newline_terminated_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = String::new();
            conn.read_to_string(&mut buf).await.unwrap();
            buf
        });

        let sender = TcpSender::new(addr.to_string(), Duration::from_secs(5));
        sender.send(r#"{"lat": 1.5}"#).await.unwrap();

        assert_eq!(server.await.unwrap(), "{\"lat\": 1.5}\n");
    }

    #[tokio::test]
    async fn test_each_send_uses_a_new_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut lines = Vec::new();
            for _ in 0..2 {
                let (mut conn, _) = listener.accept().await.unwrap();
                let mut buf = String::new();
                conn.read_to_string(&mut buf).await.unwrap();
                lines.push(buf);
            }
            lines
        });

        let sender = TcpSender::new(addr.to_string(), Duration::from_secs(5));
        sender.send("one").await.unwrap();
        sender.send("two").await.unwrap();

        assert_eq!(server.await.unwrap(), vec!["one\n", "two\n"]);
    }

    #[tokio::test]
    async fn test_unreachable_destination_is_dial_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sender = TcpSender::new(addr.to_string(), Duration::from_secs(1));
        let err = sender.send("lost").await.unwrap_err();
        assert!(matches!(err, SendError::Dial { .. }));
        assert!(err.to_string().contains(&addr.to_string()));
    }

    #[tokio::test]
    async fn test_bad_address_is_dial_error() {
        let sender = TcpSender::new("not an address", Duration::from_secs(1));
        assert!(matches!(
            sender.send("x").await,
            Err(SendError::Dial { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let err = bounded(Duration::from_millis(50), std::future::pending::<io::Result<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_bounded_zero_means_no_timeout() {
        let value = bounded(Duration::ZERO, async { Ok::<_, io::Error>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
