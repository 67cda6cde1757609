//! Probe primitives: one DNS query or one balancer API request against a
//! single address.
//!
//! Probes never fail. Transport and request-construction errors are logged
//! and folded into an unavailable result, so callers only ever see a typed
//! result with an availability flag.

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, error};

use crate::config::{ProbeConfig, ProbeTlsConfig};
use crate::error::ExporterError;
use crate::metrics::{self, ProbeKind, Timer};

/// Balancer API path requested by HTTP probes.
pub const API_PATH: &str = "/api/v1/servers";

/// Header carrying the balancer API credential.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Status reported when the HTTP request could not be built.
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Status reported when the HTTP request failed in transport.
pub const STATUS_UNAVAILABLE: u16 = 503;

const MAX_DNS_MESSAGE: usize = 4096;

/// One DNS probe to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsProbeRequest {
    /// Identity of the cluster or recursor the probe belongs to.
    pub target_id: String,
    /// DNS server address (IP or hostname).
    pub address: String,
    /// DNS server port.
    pub port: u16,
    /// Name to query for an A record.
    pub query_name: String,
}

/// One balancer API probe to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProbeRequest {
    /// Identity of the simple cluster the probe belongs to.
    pub target_id: String,
    /// Balancer address (IP or hostname).
    pub address: String,
    /// Balancer API port.
    pub port: u16,
    /// Credential sent as `X-API-Key`.
    pub api_token: String,
    /// Request over HTTPS.
    pub use_tls: bool,
}

impl HttpProbeRequest {
    /// The full API URL, e.g. `https://10.0.0.3:8081/api/v1/servers`.
    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        let host = match self.address.parse::<Ipv6Addr>() {
            Ok(_) => format!("[{}]", self.address),
            Err(_) => self.address.clone(),
        };
        format!("{scheme}://{host}:{}{API_PATH}", self.port)
    }
}

/// Outcome of a DNS probe.
#[derive(Debug, Clone)]
pub struct DnsProbeResult {
    /// Identity of the cluster or recursor the probe belongs to.
    pub target_id: String,
    /// True iff the exchange completed, whatever the response code.
    pub available: bool,
    /// The response message; absent on transport error.
    pub response: Option<Message>,
    /// Time spent on the exchange, including failed attempts.
    pub response_time: Duration,
}

impl DnsProbeResult {
    /// Response code of the answer, if one was received.
    pub fn response_code(&self) -> Option<u16> {
        self.response.as_ref().map(|msg| u16::from(msg.response_code()))
    }
}

/// Outcome of a balancer API probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProbeResult {
    /// Identity of the simple cluster the probe belongs to.
    pub target_id: String,
    /// True iff the request completed with status 200.
    pub available: bool,
    /// Received status, or 400/503 for construction/transport failures.
    pub status: u16,
}

/// Issues probes on behalf of the availability engines.
///
/// Implementations are shared across many concurrent probe tasks and must
/// not carry per-probe mutable state.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Issue one DNS query.
    async fn probe_dns(&self, request: DnsProbeRequest) -> DnsProbeResult;

    /// Issue one balancer API request.
    async fn probe_http(&self, request: HttpProbeRequest) -> HttpProbeResult;
}

/// DNS client issuing single A-record exchanges over UDP.
#[derive(Debug, Clone)]
pub struct DnsClient {
    timeout: Duration,
}

impl DnsClient {
    /// Create a client whose exchanges are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Send one A query and wait for the matching response.
    pub async fn probe(&self, request: &DnsProbeRequest) -> DnsProbeResult {
        let timer = Timer::start();
        let outcome = match tokio::time::timeout(self.timeout, exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(ExporterError::Timeout(self.timeout)),
        };
        let response_time = timer.elapsed();

        let response = match outcome {
            Ok(msg) => {
                debug!(
                    target_id = %request.target_id,
                    address = %request.address,
                    rcode = %msg.response_code(),
                    elapsed_ms = response_time.as_millis() as u64,
                    "DNS probe answered"
                );
                Some(msg)
            }
            Err(e) => {
                debug!(
                    target_id = %request.target_id,
                    address = %request.address,
                    port = request.port,
                    error = %e,
                    "DNS probe failed"
                );
                None
            }
        };

        let available = response.is_some();
        metrics::record_probe(ProbeKind::Dns, available);

        DnsProbeResult {
            target_id: request.target_id.clone(),
            available,
            response,
            response_time,
        }
    }
}

/// Build an A query for `query_name`, forcing it fully qualified.
fn build_query(query_name: &str, id: u16) -> Result<Message, ExporterError> {
    let name = if query_name.ends_with('.') {
        Name::from_ascii(query_name)?
    } else {
        Name::from_ascii(format!("{query_name}."))?
    };

    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    msg.add_query(Query::query(name, RecordType::A));
    Ok(msg)
}

async fn exchange(request: &DnsProbeRequest) -> Result<Message, ExporterError> {
    let target = lookup_host((request.address.as_str(), request.port))
        .await?
        .next()
        .ok_or_else(|| ExporterError::Unresolvable(request.address.clone()))?;

    let bind_addr = match target.ip() {
        IpAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        IpAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(target).await?;

    let id: u16 = rand::random();
    let query = build_query(&request.query_name, id)?;
    socket.send(&query.to_vec()?).await?;

    let mut buf = vec![0u8; MAX_DNS_MESSAGE];
    loop {
        let len = socket.recv(&mut buf).await?;
        match Message::from_vec(&buf[..len]) {
            Ok(msg) if msg.id() == id && msg.message_type() == MessageType::Response => {
                return Ok(msg);
            }
            Ok(msg) => {
                debug!(expected = id, got = msg.id(), "ignoring unrelated DNS datagram");
            }
            Err(e) => {
                debug!(error = %e, "ignoring malformed DNS datagram");
            }
        }
    }
}

/// Send one balancer API request and classify the outcome.
pub async fn probe_http(client: &reqwest::Client, request: &HttpProbeRequest) -> HttpProbeResult {
    let built = match build_http_request(client, request) {
        Ok(built) => built,
        Err(e) => {
            error!(
                target_id = %request.target_id,
                address = %request.address,
                error = %e,
                "failed to build balancer API request"
            );
            metrics::record_probe(ProbeKind::Http, false);
            return HttpProbeResult {
                target_id: request.target_id.clone(),
                available: false,
                status: STATUS_BAD_REQUEST,
            };
        }
    };

    let (available, status) = match client.execute(built).await {
        Ok(response) => {
            let status = response.status().as_u16();
            (status == 200, status)
        }
        Err(e) => {
            debug!(
                target_id = %request.target_id,
                address = %request.address,
                error = %e,
                "balancer API request failed"
            );
            (false, STATUS_UNAVAILABLE)
        }
    };

    debug!(target_id = %request.target_id, status, available, "HTTP probe finished");
    metrics::record_probe(ProbeKind::Http, available);

    HttpProbeResult {
        target_id: request.target_id.clone(),
        available,
        status,
    }
}

fn build_http_request(
    client: &reqwest::Client,
    request: &HttpProbeRequest,
) -> Result<reqwest::Request, ExporterError> {
    Ok(client
        .get(request.url())
        .header(API_KEY_HEADER, request.api_token.as_str())
        .build()?)
}

/// Build the balancer API client, with the client identity when TLS is on.
pub async fn http_client(
    probe: &ProbeConfig,
    tls: &ProbeTlsConfig,
) -> Result<reqwest::Client, ExporterError> {
    let mut builder = reqwest::Client::builder().timeout(probe.http_timeout());

    if tls.enabled {
        let (cert_path, key_path) = match (&tls.cert, &tls.key) {
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                return Err(ExporterError::Tls(
                    "certificate and key paths are required".to_string(),
                ))
            }
        };
        let cert = tokio::fs::read(cert_path).await?;
        let key = tokio::fs::read(key_path).await?;

        let mut identity_pem = cert.clone();
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(&key);

        builder = builder
            .identity(reqwest::Identity::from_pem(&identity_pem)?)
            .add_root_certificate(reqwest::Certificate::from_pem(&cert)?);
    }

    Ok(builder.build()?)
}

/// The network-backed prober, built fresh for every scrape.
#[derive(Debug, Clone)]
pub struct NetworkProber {
    dns: DnsClient,
    // None when no HTTP client could be built; balancer probes then report
    // a transport failure.
    http: Option<reqwest::Client>,
}

impl NetworkProber {
    /// Create a prober from already-built clients.
    pub fn new(dns: DnsClient, http: reqwest::Client) -> Self {
        Self {
            dns,
            http: Some(http),
        }
    }

    /// Build the DNS and HTTP clients for one scrape.
    ///
    /// Unloadable TLS material is logged and replaced by a plain client, so
    /// HTTPS balancer probes fail and their clusters report as disabled.
    pub async fn for_scrape(probe: &ProbeConfig, tls: &ProbeTlsConfig) -> Self {
        let http = match http_client(probe, tls).await {
            Ok(client) => Some(client),
            Err(e) => {
                error!(error = %e, "failed to build balancer API client, using plain client");
                match reqwest::Client::builder().timeout(probe.http_timeout()).build() {
                    Ok(client) => Some(client),
                    Err(e) => {
                        error!(error = %e, "failed to build plain balancer API client");
                        None
                    }
                }
            }
        };

        Self {
            dns: DnsClient::new(probe.dns_timeout()),
            http,
        }
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn probe_dns(&self, request: DnsProbeRequest) -> DnsProbeResult {
        self.dns.probe(&request).await
    }

    async fn probe_http(&self, request: HttpProbeRequest) -> HttpProbeResult {
        match &self.http {
            Some(client) => probe_http(client, &request).await,
            None => {
                debug!(target_id = %request.target_id, "no balancer API client");
                metrics::record_probe(ProbeKind::Http, false);
                HttpProbeResult {
                    target_id: request.target_id,
                    available: false,
                    status: STATUS_UNAVAILABLE,
                }
            }
        }
    }
}
