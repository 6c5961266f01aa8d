// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use crate::error::{Error, Result};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Venue actions --------
pub static ACTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("actions_total", "signed actions sent to /exchange (labels: kind, status)"),
        &["kind", "status"],
    )
    .unwrap()
});

pub static SIGN_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("sign_rejections_total", "signature prompts declined by the user").unwrap()
});

// Latency per endpoint (seconds)
pub static HTTP_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("venue_http_latency_seconds", "POST latency per endpoint"),
        &["endpoint"],
    )
    .unwrap()
});

// -------- Polling / queries --------
pub static QUERY_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("query_failures_total", "best-effort queries that fell back to defaults"),
        &["query"],
    )
    .unwrap()
});

pub static POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("polls_total", "poll iterations (label: poller)"), &["poller"])
        .unwrap()
});

pub static MARK_PRICE: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(Opts::new("mark_price", "last mark price per coin"), &["coin"]).unwrap()
});

pub static WITHDRAWABLE: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("withdrawable_usdc", "USDC withdrawable from the perp account").unwrap()
});

// -------- Lending --------
pub static HEALTH_FACTOR: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("lending_health_factor", "health factor of the lending position (999 = no debt)")
        .unwrap()
});

pub static AUTOMATION_BLOCKED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("automation_blocked_total", "automated actions skipped by debounce"),
        &["action"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry; double registration is ignored
    for m in [
        REGISTRY.register(Box::new(ACTIONS.clone())),
        REGISTRY.register(Box::new(SIGN_REJECTIONS.clone())),
        REGISTRY.register(Box::new(HTTP_LATENCY.clone())),
        REGISTRY.register(Box::new(QUERY_FAILURES.clone())),
        REGISTRY.register(Box::new(POLLS.clone())),
        REGISTRY.register(Box::new(MARK_PRICE.clone())),
        REGISTRY.register(Box::new(WITHDRAWABLE.clone())),
        REGISTRY.register(Box::new(HEALTH_FACTOR.clone())),
        REGISTRY.register(Box::new(AUTOMATION_BLOCKED.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics): tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

/// Binds now, serves on a dedicated OS thread (keeps the Tokio runtime clean).
pub fn serve_metrics(port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener =
        TcpListener::bind(&addr).map_err(|e| Error::Config(format!("metrics bind {addr}: {e}")))?;
    tracing::info!(%addr, "metrics listening (/ and /metrics)");

    thread::spawn(move || {
        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => tracing::warn!(error = %e, "metrics accept error"),
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_metrics_are_encoded() {
        init();
        init();
        ACTIONS.with_label_values(&["order", "ok"]).inc();
        POLLS.with_label_values(&["metrics_test"]).inc();
        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("actions_total"));
        assert!(text.contains(r#"polls_total{poller="metrics_test"} 1"#));
    }
}
