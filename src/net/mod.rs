//! Batch transmission over HTTP-family transports.
//!
//! One connection is opened per transmitted batch; the body is sent with a
//! declared `Content-Length` (never chunked) and only the response status
//! line is interpreted. The [`Transmit`] trait is the seam between the
//! flush loop and the network, so the loop is testable without a socket.

use std::{
    fmt::Write as _,
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use rustls::pki_types::ServerName;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::TlsConnector;

use crate::{protocol::Transport, sync::AtomicDuration};

/// Default connect timeout for write and admin requests.
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur while transmitting a batch or issuing an admin
/// query.
///
/// On the write path these never reach the producer: the flush loop logs
/// them, discards the batch, and continues. Admin operations surface them
/// directly.
#[derive(Debug, Error)]
pub enum TransmitError {
    /// Transport-level I/O failure while connecting, writing the request,
    /// or reading the response.
    #[error("i/o failure during transmission")]
    Io(#[from] std::io::Error),

    /// The destination did not accept a connection within the configured
    /// connect timeout.
    #[error("timed out connecting to the destination")]
    ConnectTimeout,

    /// The destination answered with an error status the client does not
    /// handle. The batch is not retried.
    #[error("unexpected http response status: {0}")]
    UnexpectedStatus(u16),

    /// The connection closed before a complete status line arrived.
    #[error("connection closed before a complete response status line")]
    TruncatedResponse,
}

/// The host name is not a valid TLS server name.
#[derive(Debug, Error)]
#[error("invalid host name for tls: {0}")]
pub(crate) struct InvalidHost(pub(crate) String);

/// Transmission seam of the flush loop.
pub(crate) trait Transmit: Send + 'static {
    /// Streams one batch body to the destination and interprets the
    /// response.
    fn send(&mut self, body: &[u8]) -> impl Future<Output = Result<(), TransmitError>> + Send;
}

/// HTTP/1.1 batch transmitter for one destination.
pub(crate) struct HttpTransmitter {
    host: String,
    port: u16,
    tls: Option<(TlsConnector, ServerName<'static>)>,
    /// Request target of the write endpoint, query string included.
    write_target: String,
    /// Request target of the admin query endpoint, without the `q`
    /// parameter.
    query_target: String,
    host_header: String,
    connect_timeout: Arc<AtomicDuration>,
    /// Reused request-head scratch, so steady-state sends allocate nothing.
    head: String,
}

impl HttpTransmitter {
    pub(crate) fn new(
        transport: Transport,
        host: &str,
        port: u16,
        write_target: String,
        query_target: String,
        connect_timeout: Arc<AtomicDuration>,
    ) -> Result<Self, InvalidHost> {
        let tls = match transport {
            Transport::Https => {
                let mut roots = rustls::RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                let config = rustls::ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth();
                let name = ServerName::try_from(host.to_owned()).map_err(|_| InvalidHost(host.to_owned()))?;
                Some((TlsConnector::from(Arc::new(config)), name))
            }
            Transport::Http | Transport::Udp => None,
        };

        Ok(Self {
            host: host.to_owned(),
            port,
            tls,
            write_target,
            query_target,
            host_header: format!("{host}:{port}"),
            connect_timeout,
            head: String::new(),
        })
    }

    async fn connect_tcp(&self) -> Result<TcpStream, TransmitError> {
        let timeout = self.connect_timeout.load(Ordering::Relaxed);
        let stream = tokio::time::timeout(timeout, TcpStream::connect((self.host.as_str(), self.port)))
            .await
            .map_err(|_| TransmitError::ConnectTimeout)??;
        Ok(stream)
    }

    fn write_head(&mut self, method: &str, target: &str, content_length: usize) {
        self.head.clear();
        // Infallible: formatting into a String.
        let _ = write!(
            self.head,
            "{method} {target} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {content_length}\r\nConnection: close\r\n\r\n",
            self.host_header,
        );
    }

    /// Writes one request and reads back the response status.
    async fn exchange<S>(stream: &mut S, head: &[u8], body: &[u8]) -> Result<u16, TransmitError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(head).await?;

        if let Err(io) = stream.write_all(body).await {
            // Best-effort read of an error body for diagnostics before
            // propagating the write failure.
            let mut diag = [0u8; 512];
            if let Ok(n) = stream.read(&mut diag).await {
                if n > 0 {
                    tracing::debug!(
                        response = %String::from_utf8_lossy(&diag[..n]),
                        "error body received after failed request write"
                    );
                }
            }
            return Err(TransmitError::Io(io));
        }

        stream.flush().await?;
        read_status(stream).await
    }

    async fn request(&mut self, method: &str, target: String, body: &[u8]) -> Result<u16, TransmitError> {
        self.write_head(method, &target, body.len());
        match self.tls.clone() {
            None => {
                let mut stream = self.connect_tcp().await?;
                Self::exchange(&mut stream, self.head.as_bytes(), body).await
            }
            Some((connector, name)) => {
                let stream = self.connect_tcp().await?;
                let mut stream = connector.connect(name, stream).await?;
                Self::exchange(&mut stream, self.head.as_bytes(), body).await
            }
        }
    }

    /// Issues an admin query against the `/query` endpoint with a
    /// pre-encoded `q` value and returns the raw response status.
    ///
    /// Unlike the write path, admin queries also bound the response read:
    /// the whole request gets one connect-timeout budget for connecting and
    /// another for the exchange.
    pub(crate) async fn query(&mut self, method: &str, encoded_q: &str) -> Result<u16, TransmitError> {
        let target = format!("{}&q={}", self.query_target, encoded_q);
        let deadline = self.connect_timeout.load(Ordering::Relaxed).saturating_mul(2);
        match tokio::time::timeout(deadline, self.request(method, target, b"")).await {
            Ok(res) => res,
            Err(_) => Err(TransmitError::Io(std::io::ErrorKind::TimedOut.into())),
        }
    }
}

impl Transmit for HttpTransmitter {
    async fn send(&mut self, body: &[u8]) -> Result<(), TransmitError> {
        let target = self.write_target.clone();
        let status = self.request("POST", target, body).await?;

        match status {
            // Re-authentication is an extension point that is intentionally
            // not implemented; the batch is dropped either way.
            401 => {
                tracing::warn!("authentication rejected by the write endpoint (status 401)");
                Ok(())
            }
            s if s > 399 => Err(TransmitError::UnexpectedStatus(s)),
            _ => Ok(()),
        }
    }
}

/// Reads from the stream until a full status line is available and parses
/// the status code out of it.
async fn read_status<S>(stream: &mut S) -> Result<u16, TransmitError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 512];
    let mut len = 0;

    loop {
        if len == buf.len() {
            return Err(TransmitError::TruncatedResponse);
        }
        let n = stream.read(&mut buf[len..]).await?;
        if n == 0 {
            return Err(TransmitError::TruncatedResponse);
        }
        len += n;

        if let Some(eol) = buf[..len].windows(2).position(|w| w == b"\r\n") {
            return parse_status_line(&buf[..eol]).ok_or(TransmitError::TruncatedResponse);
        }
    }
}

/// Extracts the status code from an HTTP/1.x status line.
fn parse_status_line(line: &[u8]) -> Option<u16> {
    let line = std::str::from_utf8(line).ok()?;
    let mut parts = line.split(' ');
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}
