//! Admin HTTP API — health checks, proxy snapshots, Prometheus metrics.
//!
//! Spawned as a background task when `admin_port` is configured.
//! Endpoints:
//!   GET /health              — 200 OK, for load balancer health checks
//!   GET /api/proxies         — JSON object, proxy name → snapshot
//!   GET /api/proxies/{name}  — JSON snapshot of one proxy, 404 if unknown
//!   GET /metrics             — Prometheus exposition format

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::metrics::{ProxyMetric, ProxyMetricRegistry};

/// Shared state for admin endpoints.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<ProxyMetricRegistry>,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/proxies", get(all_proxies))
        .route("/api/proxies/{name}", get(one_proxy))
        .with_state(state)
}

/// Start the admin HTTP server on the given address.
pub async fn serve(state: AdminState, host: &str, port: u16) {
    let app = router(state);

    let addr = format!("{host}:{port}");
    match TcpListener::bind(&addr).await {
        Ok(listener) => {
            info!(addr = %addr, "admin API");
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "admin server error");
            }
        }
        Err(e) => {
            error!(addr = %addr, error = %e, "failed to bind admin port");
        }
    }
}

// ─── GET /health ─────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/json")], r#"{"status":"ok"}"#)
}

// ─── GET /api/proxies ────────────────────────────────────────────────────────

async fn all_proxies(State(state): State<AdminState>) -> Json<HashMap<String, ProxyMetric>> {
    Json(state.registry.get_all_proxy_metrics())
}

async fn one_proxy(State(state): State<AdminState>, Path(name): Path<String>) -> Response {
    match state.registry.get_proxy_metrics(&name) {
        Some(metric) => Json(metric).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "proxy not found" })),
        )
            .into_response(),
    }
}

// ─── GET /metrics ────────────────────────────────────────────────────────────

async fn metrics(State(state): State<AdminState>) -> Response {
    let snapshot = state.registry.get_all_proxy_metrics();
    let today = state.registry.today_key();
    let out = render_prometheus(&snapshot, &today);

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        out,
    )
        .into_response()
}

/// Render per-proxy gauges. Daily counters are today's bucket, zero if the
/// proxy has seen no traffic today.
pub fn render_prometheus(snapshot: &HashMap<String, ProxyMetric>, today: &str) -> String {
    let mut proxies: Vec<&ProxyMetric> = snapshot.values().collect();
    proxies.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::with_capacity(256 + proxies.len() * 256);

    out.push_str("# HELP proxystat_proxies Registered proxies.\n");
    out.push_str("# TYPE proxystat_proxies gauge\n");
    push_metric(&mut out, "proxystat_proxies", "", proxies.len() as i64);

    let families: [(&str, &str, fn(&ProxyMetric, &str) -> i64); 4] = [
        ("proxystat_current_conns", "Currently open connections.", current_conns),
        ("proxystat_flow_in_bytes", "Bytes received from clients today.", flow_in),
        ("proxystat_flow_out_bytes", "Bytes sent to clients today.", flow_out),
        ("proxystat_accept_conns", "Connections accepted today.", accept_conns),
    ];

    for (name, help, value) in families {
        out.push_str(&format!("# HELP {name} {help}\n"));
        out.push_str(&format!("# TYPE {name} gauge\n"));
        for m in &proxies {
            let labels = format!(
                r#"proxy="{}",type="{}""#,
                escape_label(&m.name),
                escape_label(&m.proxy_type)
            );
            push_metric(&mut out, name, &labels, value(m, today));
        }
    }

    out.push_str("# HELP proxystat_proxy_status Current status label of each proxy.\n");
    out.push_str("# TYPE proxystat_proxy_status gauge\n");
    for m in &proxies {
        let labels = format!(
            r#"proxy="{}",status="{}""#,
            escape_label(&m.name),
            escape_label(&m.status)
        );
        push_metric(&mut out, "proxystat_proxy_status", &labels, 1);
    }

    out
}

fn current_conns(m: &ProxyMetric, _day: &str) -> i64 {
    m.current_conns
}

fn flow_in(m: &ProxyMetric, day: &str) -> i64 {
    m.day(day).map(|d| d.flow_in).unwrap_or(0)
}

fn flow_out(m: &ProxyMetric, day: &str) -> i64 {
    m.day(day).map(|d| d.flow_out).unwrap_or(0)
}

fn accept_conns(m: &ProxyMetric, day: &str) -> i64 {
    m.day(day).map(|d| d.total_accept_conns).unwrap_or(0)
}

fn push_metric(out: &mut String, name: &str, labels: &str, value: i64) {
    if labels.is_empty() {
        out.push_str(&format!("{name} {value}\n"));
    } else {
        out.push_str(&format!("{name}{{{labels}}} {value}\n"));
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', r#"\""#)
        .replace('\n', r"\n")
}

// ─── Tests ──────────────────────────────────────────────────────────────────
