//! Response prober.
//!
//! Sends one GET per endpoint per environment. Every network-level problem
//! (refused connection, DNS failure, timeout, broken body) is folded into
//! `ProbeOutcome::Failure`; probing never returns an error to the caller.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{ACCEPT, HOST, USER_AGENT};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use thiserror::Error;
use tracing::debug;

use driftwatch_core::{BaseUrl, BodyShape, EndpointSpec, Environment, ProbeResult};

/// Most body bytes buffered for a full JSON parse. Larger bodies are
/// streamed through [`TopLevelScanner`] instead.
const MAX_BODY_BYTES: usize = 1024 * 1024;

const USER_AGENT_VALUE: &str = concat!("driftwatch/", env!("CARGO_PKG_VERSION"));

/// Executes a single probe against one environment.
///
/// Implementations must turn every failure into a `Failure` outcome.
pub trait Prober: Send + Sync + 'static {
    fn probe(
        &self,
        endpoint: &EndpointSpec,
        environment: Environment,
        base_url: &BaseUrl,
        timeout: Duration,
    ) -> impl Future<Output = ProbeResult> + Send;
}

/// The production prober: plain HTTP/1.1 over a fresh TCP connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpProber;

impl HttpProber {
    pub fn new() -> Self {
        Self
    }
}

impl Prober for HttpProber {
    async fn probe(
        &self,
        endpoint: &EndpointSpec,
        environment: Environment,
        base_url: &BaseUrl,
        timeout: Duration,
    ) -> ProbeResult {
        http_probe(endpoint, environment, base_url, timeout).await
    }
}

#[derive(Debug, Error)]
enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(std::io::Error),
    #[error("handshake failed: {0}")]
    Handshake(hyper::Error),
    #[error("invalid request: {0}")]
    Build(http::Error),
    #[error("request failed: {0}")]
    Request(hyper::Error),
    #[error("failed to read body: {0}")]
    Body(hyper::Error),
}

/// Probe `endpoint` on the environment at `base_url`.
///
/// Returns `Success` when the status is in the endpoint's acceptable set,
/// and `Failure` for unacceptable statuses, connection errors or timeouts.
pub async fn http_probe(
    endpoint: &EndpointSpec,
    environment: Environment,
    base_url: &BaseUrl,
    timeout: Duration,
) -> ProbeResult {
    let started = Instant::now();
    let target = base_url.request_target(&endpoint.path);

    match tokio::time::timeout(timeout, fetch(base_url, &target)).await {
        Ok(Ok((status, shape))) => {
            let latency = started.elapsed();
            if endpoint.accepts(status) {
                ProbeResult::success(endpoint, environment, status, shape, latency)
            } else {
                debug!(%environment, %target, status, "probe got unexpected status");
                ProbeResult::failure(
                    endpoint,
                    environment,
                    format!("unexpected status {status}"),
                    latency,
                )
            }
        }
        Ok(Err(e)) => {
            debug!(%environment, %target, error = %e, "probe failed");
            ProbeResult::failure(endpoint, environment, e.to_string(), started.elapsed())
        }
        Err(_) => {
            debug!(%environment, %target, ?timeout, "probe timed out");
            ProbeResult::failure(
                endpoint,
                environment,
                format!("timed out after {}ms", timeout.as_millis()),
                started.elapsed(),
            )
        }
    }
}

async fn fetch(base_url: &BaseUrl, target: &str) -> Result<(u16, BodyShape), ProbeError> {
    let stream = tokio::net::TcpStream::connect(base_url.socket_addr())
        .await
        .map_err(ProbeError::Connect)?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(ProbeError::Handshake)?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "probe connection closed with error");
        }
    });

    let req = http::Request::builder()
        .method(http::Method::GET)
        .uri(target)
        .header(HOST, base_url.host_header())
        .header(USER_AGENT, USER_AGENT_VALUE)
        .header(ACCEPT, "application/json")
        .body(Empty::<Bytes>::new())
        .map_err(ProbeError::Build)?;

    let resp = sender.send_request(req).await.map_err(ProbeError::Request)?;
    let status = resp.status().as_u16();

    let shape = read_shape(resp.into_body()).await?;
    Ok((status, shape))
}

/// Classify a response body while holding at most `MAX_BODY_BYTES` of it.
///
/// Bodies within the cap get a full JSON parse. Past the cap the buffer is
/// dropped and the shape comes from the streaming scanner, which has seen
/// every byte.
async fn read_shape(mut body: Incoming) -> Result<BodyShape, ProbeError> {
    let mut buf = Vec::new();
    let mut scanner = TopLevelScanner::default();
    let mut overflowed = false;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(ProbeError::Body)?;
        let Ok(chunk) = frame.into_data() else {
            continue;
        };
        scanner.feed(&chunk);
        if overflowed {
            continue;
        }
        if buf.len() + chunk.len() > MAX_BODY_BYTES {
            overflowed = true;
            buf = Vec::new();
        } else {
            buf.extend_from_slice(&chunk);
        }
    }

    if overflowed {
        debug!("response body exceeded buffer cap, using streamed shape");
        return Ok(scanner.finish());
    }
    Ok(BodyShape::from_bytes(&buf))
}

/// Incremental top-level JSON classifier.
///
/// Tracks nesting depth and string state only. For an object body it
/// collects the keys at depth 1; nothing below that is retained.
#[derive(Debug, Default)]
struct TopLevelScanner {
    first: Option<u8>,
    depth: u32,
    in_string: bool,
    escaped: bool,
    expecting_key: bool,
    /// Raw bytes of the top-level key being read, opening quote included.
    key: Option<Vec<u8>>,
    keys: BTreeSet<String>,
}

impl TopLevelScanner {
    fn feed(&mut self, chunk: &[u8]) {
        for &b in chunk {
            if self.first.is_none() {
                if b.is_ascii_whitespace() {
                    continue;
                }
                self.first = Some(b);
            }
            if self.first != Some(b'{') {
                return;
            }

            if self.in_string {
                if let Some(key) = &mut self.key {
                    key.push(b);
                }
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                    if let Some(raw) = self.key.take() {
                        if let Ok(key) = serde_json::from_slice::<String>(&raw) {
                            self.keys.insert(key);
                        }
                    }
                }
                continue;
            }

            match b {
                b'"' => {
                    self.in_string = true;
                    if self.depth == 1 && self.expecting_key {
                        self.key = Some(vec![b'"']);
                        self.expecting_key = false;
                    }
                }
                b'{' | b'[' => {
                    self.depth += 1;
                    if self.depth == 1 {
                        self.expecting_key = true;
                    }
                }
                b'}' | b']' => self.depth = self.depth.saturating_sub(1),
                b',' if self.depth == 1 => self.expecting_key = true,
                _ => {}
            }
        }
    }

    fn finish(self) -> BodyShape {
        match self.first {
            Some(b'{') => BodyShape::Object(self.keys),
            Some(b'[') => BodyShape::Array,
            _ => BodyShape::Scalar,
        }
    }
}
