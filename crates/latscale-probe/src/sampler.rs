//! HTTP latency sampler.

use std::time::{Duration, Instant, SystemTime};

use tracing::debug;

use latscale_core::{Endpoint, LatencySample, LatencySampler, ProbeError, ProbeTimings};

/// Samples latency with a single HTTP/1.1 `GET` per call.
#[derive(Debug, Clone)]
pub struct HttpLatencySampler {
    timeout: Duration,
}

impl HttpLatencySampler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpLatencySampler {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl LatencySampler for HttpLatencySampler {
    async fn sample(&self, endpoint: &Endpoint) -> Result<LatencySample, ProbeError> {
        let url = endpoint.url();
        let taken_at = SystemTime::now();

        let timings = tokio::time::timeout(self.timeout, round_trip(endpoint))
            .await
            .map_err(|_| {
                debug!(%url, timeout = ?self.timeout, "latency probe timed out");
                ProbeError::Unreachable(format!("{url}: timed out after {:?}", self.timeout))
            })??;

        let value = timings.first_byte.as_secs_f64() * 1000.0;
        debug!(
            %url,
            connect_ms = timings.connect.as_secs_f64() * 1000.0,
            first_byte_ms = value,
            "latency sampled"
        );

        Ok(LatencySample {
            value,
            taken_at,
            timings: Some(timings),
        })
    }
}

/// Connect, send one `GET`, and wait for the response head.
async fn round_trip(endpoint: &Endpoint) -> Result<ProbeTimings, ProbeError> {
    let authority = endpoint.authority();
    let url = endpoint.url();
    let start = Instant::now();

    let stream = tokio::net::TcpStream::connect(authority.as_str())
        .await
        .map_err(|e| {
            debug!(error = %e, %url, "latency probe connection failed");
            ProbeError::Unreachable(format!("{url}: {e}"))
        })?;
    let connect = start.elapsed();

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| {
            debug!(error = %e, %url, "latency probe handshake failed");
            ProbeError::Unreachable(format!("{url}: {e}"))
        })?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(endpoint.path.as_str())
        .header("host", authority.as_str())
        .header("user-agent", "latscale-probe/0.1")
        .body(http_body_util::Empty::<bytes::Bytes>::new())
        .map_err(|e| ProbeError::Unreachable(format!("{url}: invalid request: {e}")))?;

    let resp = sender.send_request(req).await.map_err(|e| {
        debug!(error = %e, %url, "latency probe request failed");
        ProbeError::Unreachable(format!("{url}: {e}"))
    })?;
    let first_byte = start.elapsed();

    if !resp.status().is_success() {
        debug!(status = %resp.status(), %url, "latency probe non-2xx");
    }

    Ok(ProbeTimings {
        connect,
        first_byte,
    })
}
