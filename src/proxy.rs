//! Forwarding runtime — one TCP listener per proxy, reporting to the registry.
//!
//! Every accepted connection opens a slot in the registry, is forwarded to the
//! proxy's upstream through a [`MeteredStream`], and releases the slot when it
//! ends, however it ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::admin::{self, AdminState};
use crate::clock::SystemClock;
use crate::config::Config;
use crate::metrics::ProxyMetricRegistry;
use crate::proxies::{ProxyDef, load_proxies};
use crate::status::ProxyStatus;
use crate::stream::MeteredStream;

static CONN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// RAII guard that reports the connection closed on drop.
pub struct ConnGuard {
    proxy: String,
    registry: Arc<ProxyMetricRegistry>,
}

impl ConnGuard {
    pub fn open(proxy: &str, registry: Arc<ProxyMetricRegistry>) -> Self {
        registry.open_connection(proxy);
        Self {
            proxy: proxy.to_string(),
            registry,
        }
    }
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.registry.close_connection(&self.proxy);
    }
}

/// Start the proxystat host: registry, admin API, and one listener per proxy.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let clock = Arc::new(SystemClock::new(config.day_zone));
    let registry = Arc::new(ProxyMetricRegistry::with_clock(
        config.daily_data_keep_days,
        clock,
    ));
    info!(
        keep_days = registry.keep_days(),
        day_zone = %config.day_zone,
        "metrics registry"
    );

    let defs = match &config.proxies_file {
        Some(path) => load_proxies(path, &config.listen_host)?,
        None => {
            warn!("no proxies file configured, serving admin API only");
            Vec::new()
        }
    };

    // ─── Admin API (if configured) ──────────────────────────────────────

    if let Some(port) = config.admin_port {
        let state = AdminState {
            registry: Arc::clone(&registry),
        };
        let host = config.admin_host.clone();
        tokio::spawn(async move {
            admin::serve(state, &host, port).await;
        });
    }

    // ─── Proxy listeners ────────────────────────────────────────────────

    for def in defs {
        start_proxy(def, Arc::clone(&registry)).await;
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    for name in registry.names() {
        registry.set_status(&name, ProxyStatus::Closed.code());
    }
    Ok(())
}

/// Register a proxy and, if the runtime can serve it, bind and spawn its accept loop.
pub async fn start_proxy(def: ProxyDef, registry: Arc<ProxyMetricRegistry>) {
    registry.register(def.info());
    registry.set_status(&def.name, ProxyStatus::Idle.code());

    if !def.is_served() {
        info!(proxy = %def.name, proxy_type = %def.proxy_type, "registered, not served");
        return;
    }

    let addr = format!("{}:{}", def.bind_addr, def.listen_port);
    match TcpListener::bind(&addr).await {
        Ok(listener) => {
            registry.set_status(&def.name, ProxyStatus::Online.code());
            info!(proxy = %def.name, addr = %addr, upstream = %def.upstream, "proxy listener");
            tokio::spawn(serve_listener(listener, def, registry));
        }
        Err(e) => {
            registry.set_status(&def.name, ProxyStatus::Offline.code());
            error!(proxy = %def.name, addr = %addr, error = %e, "failed to bind proxy port");
        }
    }
}

/// Accept loop for one proxy.
pub async fn serve_listener(listener: TcpListener, def: ProxyDef, registry: Arc<ProxyMetricRegistry>) {
    let def = Arc::new(def);
    loop {
        match listener.accept().await {
            Ok((socket, _)) => {
                let def = Arc::clone(&def);
                let registry = Arc::clone(&registry);
                let conn_id = CONN_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
                tokio::spawn(async move {
                    handle_connection(socket, &def, registry, conn_id).await;
                });
            }
            Err(e) => {
                error!(proxy = %def.name, error = %e, "accept error");
            }
        }
    }
}

async fn handle_connection(
    client: TcpStream,
    def: &ProxyDef,
    registry: Arc<ProxyMetricRegistry>,
    conn_id: u64,
) {
    let peer = client
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());
    debug!(conn_id, proxy = %def.name, peer, "new connection");

    let _guard = ConnGuard::open(&def.name, Arc::clone(&registry));

    let mut server = match TcpStream::connect(&def.upstream).await {
        Ok(s) => s,
        Err(e) => {
            warn!(conn_id, proxy = %def.name, upstream = %def.upstream, error = %e, "upstream connect failed");
            return;
        }
    };

    let mut client = MeteredStream::new(client, def.name.clone(), registry);
    match tokio::io::copy_bidirectional(&mut client, &mut server).await {
        Ok((to_upstream, to_client)) => {
            debug!(conn_id, proxy = %def.name, to_upstream, to_client, "connection closed");
        }
        Err(e) => {
            debug!(conn_id, proxy = %def.name, error = %e, "connection ended");
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn echo_upstream() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let (mut r, mut w) = socket.split();
                    let _ = tokio::io::copy(&mut r, &mut w).await;
                });
            }
        });
        addr
    }

    fn make_def(name: &str, upstream: &str) -> ProxyDef {
        ProxyDef {
            name: name.into(),
            proxy_type: "tcp".into(),
            bind_addr: "127.0.0.1".into(),
            listen_port: 0,
            upstream: upstream.into(),
            custom_domains: vec![],
            use_encryption: false,
            use_gzip: false,
            privilege_mode: false,
        }
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_forwarding_reports_traffic() {
        let upstream = echo_upstream().await;
        let registry = Arc::new(ProxyMetricRegistry::new(7));
        let def = make_def("echo", &upstream);
        registry.register(def.info());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_listener(listener, def, Arc::clone(&registry)));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ping!").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping!");

        let m = registry.get_proxy_metrics("echo").unwrap();
        assert_eq!(m.current_conns, 1);
        assert_eq!(m.daily.len(), 1);
        assert_eq!(m.daily[0].total_accept_conns, 1);

        drop(client);
        wait_for(|| registry.get_proxy_metrics("echo").unwrap().current_conns == 0).await;

        let m = registry.get_proxy_metrics("echo").unwrap();
        assert_eq!(m.daily[0].flow_in, 5);
        assert_eq!(m.daily[0].flow_out, 5);
    }

    #[tokio::test]
    async fn test_upstream_failure_releases_slot() {
        // Bind then drop to get a port with nothing listening
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap().to_string();
        drop(dead);

        let registry = Arc::new(ProxyMetricRegistry::new(7));
        let def = make_def("dead", &dead_addr);
        registry.register(def.info());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_listener(listener, def, Arc::clone(&registry)));

        let _client = TcpStream::connect(addr).await.unwrap();
        wait_for(|| {
            let m = registry.get_proxy_metrics("dead").unwrap();
            m.daily.first().map(|d| d.total_accept_conns) == Some(1) && m.current_conns == 0
        })
        .await;
    }

    #[tokio::test]
    async fn test_start_proxy_sets_status() {
        let registry = Arc::new(ProxyMetricRegistry::new(7));

        start_proxy(make_def("up", "127.0.0.1:1"), Arc::clone(&registry)).await;
        assert_eq!(registry.get_proxy_metrics("up").unwrap().status, "online");

        let mut http = make_def("web", "");
        http.proxy_type = "http".into();
        start_proxy(http, Arc::clone(&registry)).await;
        assert_eq!(registry.get_proxy_metrics("web").unwrap().status, "idle");

        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut bad = make_def("bad", "127.0.0.1:1");
        bad.listen_port = taken.local_addr().unwrap().port();
        start_proxy(bad, Arc::clone(&registry)).await;
        assert_eq!(registry.get_proxy_metrics("bad").unwrap().status, "offline");
    }

    #[test]
    fn test_conn_guard() {
        let registry = Arc::new(ProxyMetricRegistry::new(7));
        registry.register(make_def("g", "x:1").info());
        {
            let _a = ConnGuard::open("g", Arc::clone(&registry));
            let _b = ConnGuard::open("g", Arc::clone(&registry));
            assert_eq!(registry.get_proxy_metrics("g").unwrap().current_conns, 2);
        }
        let m = registry.get_proxy_metrics("g").unwrap();
        assert_eq!(m.current_conns, 0);
        assert_eq!(m.daily[0].total_accept_conns, 2);
    }
}
