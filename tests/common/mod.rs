//! Shared test infrastructure for engine and probe integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tempfile::TempDir;
use tokio::net::{TcpListener, UdpSocket};
use tokio_rustls::TlsAcceptor;

use pdns_exporter::config::{Config, MegaClusterConfig, RecursorConfig, SimpleClusterConfig};
use pdns_exporter::probe::{
    DnsProbeRequest, DnsProbeResult, HttpProbeRequest, HttpProbeResult, Prober, API_KEY_HEADER,
    API_PATH,
};

// --- Constants ---

pub const RECORD: &str = "health.example.com";
pub const API_TOKEN: &str = "secret";
pub const DNS_PORT: u16 = 53;
pub const HTTP_PORT: u16 = 8081;

// --- Scripted prober ---

/// How a scripted DNS target behaves.
#[derive(Debug, Clone, Copy)]
pub enum Dns {
    /// Answer with the given response code after a delay.
    Answer(ResponseCode, Duration),
    /// Fail in transport after a delay.
    Fail(Duration),
    /// Never return.
    Hang,
}

/// How a scripted balancer behaves.
#[derive(Debug, Clone, Copy)]
pub enum Http {
    /// Return the given status after a delay.
    Status(u16, Duration),
    /// Never return.
    Hang,
}

/// Answer promptly with NOERROR.
pub fn dns_ok() -> Dns {
    Dns::Answer(ResponseCode::NoError, Duration::from_millis(5))
}

/// Fail after the transport deadline.
pub fn dns_down() -> Dns {
    Dns::Fail(Duration::from_millis(300))
}

/// Return 200 promptly.
pub fn http_ok() -> Http {
    Http::Status(200, Duration::from_millis(10))
}

/// Deterministic prober keyed by target address.
///
/// Unknown addresses fail immediately.
#[derive(Default)]
pub struct ScriptedProber {
    dns: HashMap<String, Dns>,
    http: HashMap<String, Http>,
    dns_calls: AtomicUsize,
    http_calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dns(mut self, address: &str, behavior: Dns) -> Self {
        self.dns.insert(address.to_string(), behavior);
        self
    }

    pub fn http(mut self, address: &str, behavior: Http) -> Self {
        self.http.insert(address.to_string(), behavior);
        self
    }

    pub fn dns_calls(&self) -> usize {
        self.dns_calls.load(Ordering::SeqCst)
    }

    pub fn http_calls(&self) -> usize {
        self.http_calls.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe_dns(&self, request: DnsProbeRequest) -> DnsProbeResult {
        self.dns_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .dns
            .get(&request.address)
            .copied()
            .unwrap_or(Dns::Fail(Duration::ZERO));

        match behavior {
            Dns::Answer(rcode, after) => {
                tokio::time::sleep(after).await;
                let mut msg = Message::new();
                msg.set_message_type(MessageType::Response);
                msg.set_response_code(rcode);
                DnsProbeResult {
                    target_id: request.target_id,
                    available: true,
                    response: Some(msg),
                    response_time: after,
                }
            }
            Dns::Fail(after) => {
                tokio::time::sleep(after).await;
                DnsProbeResult {
                    target_id: request.target_id,
                    available: false,
                    response: None,
                    response_time: after,
                }
            }
            Dns::Hang => std::future::pending().await,
        }
    }

    async fn probe_http(&self, request: HttpProbeRequest) -> HttpProbeResult {
        self.http_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .http
            .get(&request.address)
            .copied()
            .unwrap_or(Http::Status(503, Duration::ZERO));

        match behavior {
            Http::Status(status, after) => {
                tokio::time::sleep(after).await;
                HttpProbeResult {
                    target_id: request.target_id,
                    available: status == 200,
                    status,
                }
            }
            Http::Hang => std::future::pending().await,
        }
    }
}

/// A prober whose every probe panics.
pub struct PanickingProber;

#[async_trait]
impl Prober for PanickingProber {
    async fn probe_dns(&self, request: DnsProbeRequest) -> DnsProbeResult {
        panic!("DNS probe to {} blew up", request.address);
    }

    async fn probe_http(&self, request: HttpProbeRequest) -> HttpProbeResult {
        panic!("HTTP probe to {} blew up", request.address);
    }
}

// --- Config builders ---

/// A simple cluster whose nodes are addressed `<id>-master`, `<id>-slave`
/// and `<id>-lb`.
pub fn simple_cluster(id: &str) -> SimpleClusterConfig {
    SimpleClusterConfig {
        id: id.to_string(),
        master: format!("{id}-master"),
        slave: format!("{id}-slave"),
        balancer: format!("{id}-lb"),
        dns_port: DNS_PORT,
        http_port: HTTP_PORT,
        record: RECORD.to_string(),
        api_token: API_TOKEN.to_string(),
        maintenance: false,
    }
}

pub fn mega_cluster(id: &str, simple_clusters: Vec<SimpleClusterConfig>) -> MegaClusterConfig {
    MegaClusterConfig {
        id: id.to_string(),
        simple_clusters,
    }
}

/// A recursor addressed `<id>-addr`.
pub fn recursor(id: &str) -> RecursorConfig {
    RecursorConfig {
        id: id.to_string(),
        address: format!("{id}-addr"),
        record: RECORD.to_string(),
        dns_port: DNS_PORT,
    }
}

pub fn test_config(
    mega_clusters: Vec<MegaClusterConfig>,
    recursors: Vec<RecursorConfig>,
) -> Arc<Config> {
    let mut config = Config::from_toml_str("").expect("empty config must be valid");
    config.mega_clusters = mega_clusters;
    config.recursors = recursors;
    config.validate().expect("test config must be valid");
    Arc::new(config)
}

// --- Loopback fakes ---

/// A UDP DNS responder on loopback answering every query with `rcode`.
pub struct FakeDnsServer {
    pub addr: SocketAddr,
    queries: Arc<AtomicUsize>,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl FakeDnsServer {
    pub async fn start(rcode: ResponseCode) -> Self {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("failed to bind UDP socket");
        let addr = socket.local_addr().expect("failed to get local addr");
        let queries = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = tokio::sync::oneshot::channel::<()>();

        let counter = queries.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                tokio::select! {
                    received = socket.recv_from(&mut buf) => {
                        let Ok((len, src)) = received else { continue };
                        let Ok(query) = Message::from_vec(&buf[..len]) else { continue };
                        counter.fetch_add(1, Ordering::SeqCst);
                        let response = build_response(&query, rcode);
                        let _ = socket.send_to(&response, src).await;
                    }
                    _ = &mut rx => return,
                }
            }
        });

        Self {
            addr,
            queries,
            _shutdown: tx,
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

fn build_response(query: &Message, rcode: ResponseCode) -> Vec<u8> {
    let mut response = Message::new();
    response.set_id(query.id());
    response.set_message_type(MessageType::Response);
    response.set_op_code(query.op_code());
    response.set_recursion_desired(query.recursion_desired());
    response.set_response_code(rcode);
    response.add_queries(query.queries().to_vec());

    if rcode == ResponseCode::NoError {
        for q in query.queries() {
            response.add_answer(Record::from_rdata(
                q.name().clone(),
                60,
                RData::A(A::new(192, 0, 2, 1)),
            ));
        }
    }

    response.to_vec().expect("failed to encode DNS response")
}

/// A UDP socket on loopback that swallows every query.
pub struct SilentDnsServer {
    pub addr: SocketAddr,
    _socket: UdpSocket,
}

impl SilentDnsServer {
    pub async fn start() -> Self {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("failed to bind UDP socket");
        let addr = socket.local_addr().expect("failed to get local addr");
        Self {
            addr,
            _socket: socket,
        }
    }
}

/// A balancer API on loopback: 200 for the right `X-API-Key`, 403 otherwise.
pub struct FakeBalancer {
    pub addr: SocketAddr,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl FakeBalancer {
    pub async fn start() -> Self {
        Self::start_with_status(StatusCode::OK).await
    }

    /// Answer authorized requests with `status` instead of 200.
    pub async fn start_with_status(status: StatusCode) -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("failed to bind TCP listener");
        let addr = listener.local_addr().expect("failed to get local addr");
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let app = balancer_app(status);

        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            addr,
            _shutdown: tx,
        }
    }
}

fn balancer_app(status: StatusCode) -> Router {
    Router::new().route(
        API_PATH,
        get(move |headers: HeaderMap| async move {
            match headers.get(API_KEY_HEADER) {
                Some(token) if token == API_TOKEN => status,
                _ => StatusCode::FORBIDDEN,
            }
        }),
    )
}

/// A balancer API on loopback behind mutual TLS.
///
/// Serves a self-signed certificate valid for 127.0.0.1 and only accepts
/// clients presenting that same certificate. The certificate and its key are
/// written as PEM files, ready to be used as outbound probe material.
pub struct TlsBalancer {
    pub addr: SocketAddr,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    _dir: TempDir,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TlsBalancer {
    pub async fn start() -> Self {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["127.0.0.1".to_string(), "localhost".to_string()])
                .expect("failed to generate certificate");

        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let cert_path = dir.path().join("client.pem");
        let key_path = dir.path().join("client.key");
        std::fs::write(&cert_path, cert.pem()).expect("failed to write certificate");
        std::fs::write(&key_path, key_pair.serialize_pem()).expect("failed to write key");

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut roots = RootCertStore::empty();
        roots
            .add(cert.der().clone())
            .expect("failed to trust certificate");
        let client_verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                .build()
                .expect("failed to build client verifier");
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
        let server_config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .expect("failed to select protocol versions")
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(vec![cert.der().clone()], key)
            .expect("failed to build server config");
        let acceptor = TlsAcceptor::from(Arc::new(server_config));

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("failed to bind TCP listener");
        let addr = listener.local_addr().expect("failed to get local addr");
        let (tx, mut rx) = tokio::sync::oneshot::channel::<()>();
        let app = balancer_app(StatusCode::OK);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let acceptor = acceptor.clone();
                        let service = TowerToHyperService::new(app.clone());
                        tokio::spawn(async move {
                            let Ok(tls) = acceptor.accept(stream).await else { return };
                            let _ = http1::Builder::new()
                                .serve_connection(TokioIo::new(tls), service)
                                .await;
                        });
                    }
                    _ = &mut rx => return,
                }
            }
        });

        Self {
            addr,
            cert_path,
            key_path,
            _dir: dir,
            _shutdown: tx,
        }
    }
}

/// A loopback port with nothing listening on it.
pub async fn closed_tcp_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("failed to bind TCP listener");
    listener.local_addr().expect("failed to get local addr").port()
}
