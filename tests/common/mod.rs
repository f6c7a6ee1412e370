// File: common/mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(dead_code)]

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;

use rrace::{RaceConfig, RaceTarget};

/// What the test server does once it has read a full request.
pub enum Reply {
    Send(Vec<u8>),
    /// Keeps the socket open without answering.
    Hold,
}

/// Plain TCP server that records every request byte-for-byte.
pub struct RawServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    handle: JoinHandle<()>,
}

impl RawServer {
    pub async fn start<F>(reply: F) -> RawServer
    where
        F: Fn(usize, &[u8]) -> Reply + Send + Sync + 'static,
    {
        Self::start_with(|_| true, reply).await
    }

    /// Like [`RawServer::start`], but the `n`th accepted socket is closed
    /// straight away when `keep(n)` is false.
    pub async fn start_with<K, F>(keep: K, reply: F) -> RawServer
    where
        K: Fn(usize) -> bool + Send + Sync + 'static,
        F: Fn(usize, &[u8]) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let reply = Arc::new(reply);
        let accepted = AtomicUsize::new(0);

        let recorded = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            while let Ok((socket, _)) = listener.accept().await {
                let n = accepted.fetch_add(1, Ordering::SeqCst);
                if !keep(n) {
                    drop(socket);
                    continue;
                }
                let reply = Arc::clone(&reply);
                let recorded = Arc::clone(&recorded);
                connections.spawn(async move {
                    serve(socket, n, reply.as_ref(), recorded).await;
                });
            }
        });

        RawServer {
            addr,
            requests,
            handle,
        }
    }

    pub fn target(&self) -> RaceTarget {
        RaceTarget::new("127.0.0.1", self.addr.port(), false)
    }

    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for RawServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve<F>(mut socket: TcpStream, n: usize, reply: &F, recorded: Arc<Mutex<Vec<Vec<u8>>>>)
where
    F: Fn(usize, &[u8]) -> Reply,
{
    let request = match read_request(&mut socket).await {
        Some(request) => request,
        None => return,
    };
    recorded.lock().unwrap().push(request.clone());

    match reply(n, &request) {
        Reply::Send(bytes) => {
            let _ = socket.write_all(&bytes).await;
            let _ = socket.shutdown().await;
        }
        Reply::Hold => tokio::time::sleep(Duration::from_secs(60)).await,
    }
}

/// When each part of one request reached the server.
#[derive(Debug, Clone, Copy)]
pub struct Arrival {
    /// Every byte but the last had been read.
    pub prefix_at: Instant,
    /// The last byte had been read.
    pub final_at: Instant,
}

/// Counts request bytes per socket and notes when the prefix and the final
/// byte arrived. The first accepted socket is left unread for `stall`, so its
/// prefix write cannot complete on the client until the server drains it.
pub struct ArrivalServer {
    pub addr: SocketAddr,
    arrivals: Arc<Mutex<Vec<Arrival>>>,
    drain_started: Arc<Mutex<Option<Instant>>>,
    handle: JoinHandle<()>,
}

impl ArrivalServer {
    pub async fn start(request_len: usize, stall: Duration) -> ArrivalServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        let drain_started = Arc::new(Mutex::new(None));

        let recorded = Arc::clone(&arrivals);
        let started = Arc::clone(&drain_started);
        let handle = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            let mut accepted = 0usize;
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = accepted;
                accepted += 1;
                let recorded = Arc::clone(&recorded);
                let started = Arc::clone(&started);
                connections.spawn(async move {
                    if n == 0 {
                        tokio::time::sleep(stall).await;
                        *started.lock().unwrap() = Some(Instant::now());
                    }
                    if let Some(arrival) = track_arrival(&mut socket, request_len).await {
                        recorded.lock().unwrap().push(arrival);
                        let _ = socket.write_all(&http_response("200 OK", "ok")).await;
                        let _ = socket.shutdown().await;
                    }
                });
            }
        });

        ArrivalServer {
            addr,
            arrivals,
            drain_started,
            handle,
        }
    }

    pub fn target(&self) -> RaceTarget {
        RaceTarget::new("127.0.0.1", self.addr.port(), false)
    }

    pub fn arrivals(&self) -> Vec<Arrival> {
        self.arrivals.lock().unwrap().clone()
    }

    pub fn drain_started(&self) -> Option<Instant> {
        *self.drain_started.lock().unwrap()
    }
}

impl Drop for ArrivalServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn track_arrival(socket: &mut TcpStream, request_len: usize) -> Option<Arrival> {
    let mut chunk = vec![0u8; 64 * 1024];
    let mut received = 0usize;
    let mut prefix_at = None;
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => received += n,
        }
        let now = Instant::now();
        if prefix_at.is_none() && received + 1 >= request_len {
            prefix_at = Some(now);
        }
        if received >= request_len {
            return prefix_at.map(|prefix_at| Arrival {
                prefix_at,
                final_at: now,
            });
        }
    }
}

/// TLS server on a fresh self-signed certificate, offering `alpn` (possibly
/// nothing) and answering every request with `200 OK` and body `tls`.
pub struct TlsServer {
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TlsServer {
    pub async fn start(alpn: &[&[u8]]) -> TlsServer {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_der = CertificateDer::from(cert.serialize_der().unwrap());
        let key_der =
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

        let mut config = ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .unwrap();
        config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            while let Ok((socket, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                connections.spawn(async move {
                    let Ok(mut tls) = acceptor.accept(socket).await else {
                        return;
                    };
                    if read_request(&mut tls).await.is_some() {
                        let _ = tls.write_all(&http_response("200 OK", "tls")).await;
                        let _ = tls.shutdown().await;
                    }
                });
            }
        });

        TlsServer { addr, handle }
    }

    pub fn target(&self) -> RaceTarget {
        RaceTarget::new("127.0.0.1", self.addr.port(), true)
    }
}

impl Drop for TlsServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Reads headers plus a Content-Length body.
async fn read_request<S>(socket: &mut S) -> Option<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return Some(buf);
            }
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return if buf.is_empty() { None } else { Some(buf) },
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub fn http_response(status: &str, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
    .into_bytes()
}

pub fn config_with(count: usize, timeout: Duration) -> RaceConfig {
    let mut config = RaceConfig::new();
    config.set_count(count);
    config.set_timeout(timeout);
    config.set_connect_timeout(Duration::from_secs(2));
    config
}

/// A port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
