// File: connection.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::{debug, trace, warn};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::ring::default_provider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, timeout_at, Instant, Sleep};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::{EngineResult, RaceError};
use crate::target::RaceTarget;

pub const HTTP11_ALPN: &[u8] = b"http/1.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    PrefixSent,
    Failed,
    Closed,
}

enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// A dialed socket carrying a hard I/O deadline.
///
/// Once the deadline passes every read and write fails with
/// `ErrorKind::TimedOut`, including ones already parked on the socket.
pub struct RaceStream {
    transport: Transport,
    deadline: Pin<Box<Sleep>>,
}

impl RaceStream {
    fn new(transport: Transport, deadline: Instant) -> Self {
        Self {
            transport,
            deadline: Box::pin(sleep_until(deadline)),
        }
    }

    fn expired(&mut self, cx: &mut Context<'_>) -> bool {
        self.deadline.as_mut().poll(cx).is_ready()
    }

    pub fn negotiated_protocol(&self) -> Option<String> {
        match &self.transport {
            Transport::Plain(_) => None,
            Transport::Tls(tls) => tls
                .get_ref()
                .1
                .alpn_protocol()
                .map(|p| String::from_utf8_lossy(p).into_owned()),
        }
    }
}

fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "race deadline exceeded")
}

impl AsyncRead for RaceStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.expired(cx) {
            return Poll::Ready(Err(deadline_exceeded()));
        }
        match &mut this.transport {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for RaceStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.expired(cx) {
            return Poll::Ready(Err(deadline_exceeded()));
        }
        match &mut this.transport {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.expired(cx) {
            return Poll::Ready(Err(deadline_exceeded()));
        }
        match &mut this.transport {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        // Past the deadline the socket is simply dropped.
        if this.expired(cx) {
            return Poll::Ready(Ok(()));
        }
        match &mut this.transport {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

pub struct Connection {
    pub index: usize,
    pub stream: RaceStream,
    pub state: ConnectionState,
}

impl Connection {
    pub fn negotiated_protocol(&self) -> Option<String> {
        self.stream.negotiated_protocol()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("index", &self.index)
            .field("state", &self.state)
            .field("protocol", &self.negotiated_protocol())
            .finish()
    }
}

/// Accepts any server certificate. Race testing targets staging hosts and
/// intercepting proxies far more often than publicly trusted ones.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}

/// Client config offering only `http/1.1` via ALPN so the server cannot move
/// the connection to a multiplexed protocol.
pub fn tls_client_config() -> EngineResult<Arc<ClientConfig>> {
    let mut config = ClientConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerification))
        .with_no_client_auth();
    config.alpn_protocols = vec![HTTP11_ALPN.to_vec()];
    Ok(Arc::new(config))
}

/// Opens one connection. The dial and handshake are bounded by the earlier of
/// `deadline` and `connect_timeout`; the stream keeps `deadline` for all later I/O.
pub async fn dial(
    index: usize,
    target: &RaceTarget,
    connector: Option<&TlsConnector>,
    deadline: Instant,
    connect_timeout: Duration,
    verify_alpn: bool,
) -> EngineResult<Connection> {
    let dial_deadline = deadline.min(Instant::now() + connect_timeout);
    let addr = target.authority();

    trace!("Slot {}: dialing {}", index, addr);
    let tcp = match timeout_at(dial_deadline, TcpStream::connect((target.host(), target.port())))
        .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(RaceError::Dial { addr, source }),
        Err(_) => return Err(RaceError::Timeout { stage: "dial" }),
    };
    if let Err(e) = tcp.set_nodelay(true) {
        debug!("Slot {}: could not disable Nagle: {}", index, e);
    }

    let transport = match connector {
        None => Transport::Plain(tcp),
        Some(connector) => {
            let server_name = ServerName::try_from(target.host().to_string())
                .map_err(|_| RaceError::ServerName(target.host().to_string()))?;
            let tls = match timeout_at(dial_deadline, connector.connect(server_name, tcp)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => {
                    return Err(RaceError::Handshake {
                        host: target.host().to_string(),
                        source,
                    })
                }
                Err(_) => return Err(RaceError::Timeout { stage: "TLS handshake" }),
            };
            Transport::Tls(Box::new(tls))
        }
    };

    let connection = Connection {
        index,
        stream: RaceStream::new(transport, deadline),
        state: ConnectionState::Connected,
    };

    if target.use_tls() {
        let protocol = connection.negotiated_protocol();
        if protocol.as_deref() != Some("http/1.1") {
            let negotiated = protocol.unwrap_or_else(|| "no ALPN protocol".to_string());
            if verify_alpn {
                return Err(RaceError::AlpnMismatch(negotiated));
            }
            warn!(
                "Slot {}: server negotiated {} instead of http/1.1, continuing",
                index, negotiated
            );
        }
    }

    debug!("Slot {}: connected to {}", index, addr);
    Ok(connection)
}

/// Outcome of dialing every slot. Exactly one of `connections[i]` and
/// `errors[i]` is set once the join has completed.
#[derive(Debug)]
pub struct DialReport {
    pub connections: Vec<Option<Connection>>,
    pub errors: Vec<Option<RaceError>>,
}

impl DialReport {
    pub fn usable(&self) -> usize {
        self.connections.iter().filter(|c| c.is_some()).count()
    }

    /// Fails with the lowest-index error when no slot connected.
    pub fn ensure_usable(mut self) -> EngineResult<Self> {
        if self.usable() > 0 {
            return Ok(self);
        }
        let count = self.connections.len();
        let first = self
            .errors
            .iter_mut()
            .find_map(Option::take)
            .unwrap_or_else(|| RaceError::TaskAborted("no dial attempt completed".to_string()));
        Err(RaceError::AllDialsFailed {
            count,
            first: Box::new(first),
        })
    }
}

/// Dials `count` connections concurrently. A failed slot never affects its
/// siblings.
pub async fn dial_all(
    target: &RaceTarget,
    count: usize,
    connector: Option<TlsConnector>,
    deadline: Instant,
    connect_timeout: Duration,
    verify_alpn: bool,
) -> DialReport {
    let mut tasks = JoinSet::new();
    for index in 0..count {
        let target = target.clone();
        let connector = connector.clone();
        tasks.spawn(async move {
            let result = dial(
                index,
                &target,
                connector.as_ref(),
                deadline,
                connect_timeout,
                verify_alpn,
            )
            .await;
            (index, result)
        });
    }

    let mut connections: Vec<Option<Connection>> = (0..count).map(|_| None).collect();
    let mut errors: Vec<Option<RaceError>> = (0..count).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(connection))) => connections[index] = Some(connection),
            Ok((index, Err(e))) => {
                debug!("Slot {}: {}", index, e);
                errors[index] = Some(e);
            }
            Err(e) => warn!("Dial task failed: {}", e),
        }
    }

    for (index, slot) in connections.iter().enumerate() {
        if slot.is_none() && errors[index].is_none() {
            errors[index] = Some(RaceError::TaskAborted("dial task did not finish".to_string()));
        }
    }

    DialReport {
        connections,
        errors,
    }
}
