//! latscale-probe — latency sampling for the latscale controller.
//!
//! One plain `GET` per sample, timed from the start of the TCP connect until
//! the response head arrives. The sampler never retries; a failed
//! round-trip or an expired timeout is reported as `ProbeError::Unreachable`
//! and the caller decides what to do next.
//!
//! ```text
//! HttpLatencySampler::sample(endpoint)
//!   ├── TcpStream::connect   → timings.connect
//!   ├── http1 handshake
//!   └── send_request → head  → timings.first_byte == sample.value
//! ```

pub mod sampler;

pub use sampler::HttpLatencySampler;
