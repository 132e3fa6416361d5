//! Proxy definitions — the `[[proxy]]` blocks served by the forwarding runtime.
//!
//! Each definition becomes one registry entry; `tcp` definitions also get a
//! listener. Other types are registered so their status shows up, but nothing
//! listens for them here.

use serde::Deserialize;
use std::collections::HashSet;

use crate::metrics::ProxyInfo;

// ─── TOML Deserialization ───────────────────────────────────────────────────

/// Top-level structure of the proxies TOML file.
#[derive(Debug, Deserialize)]
pub struct ProxyFile {
    #[serde(default)]
    pub proxy: Vec<ProxyToml>,
}

/// One `[[proxy]]` block as parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyToml {
    pub name: String,
    #[serde(rename = "type", default = "default_type")]
    pub proxy_type: String,
    #[serde(default)]
    pub bind_addr: Option<String>,
    pub listen_port: u16,
    #[serde(default)]
    pub upstream: String,
    #[serde(default)]
    pub custom_domains: Vec<String>,
    #[serde(default)]
    pub use_encryption: bool,
    #[serde(default)]
    pub use_gzip: bool,
    #[serde(default)]
    pub privilege_mode: bool,
}

fn default_type() -> String {
    "tcp".into()
}

// ─── Validated Definitions ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDef {
    pub name: String,
    pub proxy_type: String,
    pub bind_addr: String,
    pub listen_port: u16,
    pub upstream: String,
    pub custom_domains: Vec<String>,
    pub use_encryption: bool,
    pub use_gzip: bool,
    pub privilege_mode: bool,
}

impl ProxyDef {
    /// Only plain TCP proxies are forwarded by the built-in runtime.
    pub fn is_served(&self) -> bool {
        self.proxy_type == "tcp"
    }

    pub fn info(&self) -> ProxyInfo {
        ProxyInfo {
            name: self.name.clone(),
            proxy_type: self.proxy_type.clone(),
            bind_addr: self.bind_addr.clone(),
            listen_port: i64::from(self.listen_port),
            custom_domains: self.custom_domains.clone(),
            use_encryption: self.use_encryption,
            use_gzip: self.use_gzip,
            privilege_mode: self.privilege_mode,
        }
    }
}

/// Load proxy definitions from a TOML file and validate them.
pub fn load_proxies(path: &str, default_bind: &str) -> Result<Vec<ProxyDef>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read proxies file '{}': {}", path, e))?;
    parse_proxies(&content, default_bind).map_err(|e| format!("{}: {}", path, e))
}

pub fn parse_proxies(content: &str, default_bind: &str) -> Result<Vec<ProxyDef>, String> {
    let parsed: ProxyFile = toml::from_str(content).map_err(|e| format!("invalid TOML: {}", e))?;

    if parsed.proxy.is_empty() {
        return Err("no [[proxy]] blocks".into());
    }

    let mut names: HashSet<String> = HashSet::new();
    let mut defs = Vec::with_capacity(parsed.proxy.len());

    for p in parsed.proxy {
        let name = p.name.trim().to_string();
        if name.is_empty() {
            return Err("proxy with empty name".into());
        }
        if !names.insert(name.clone()) {
            return Err(format!("duplicate proxy name: '{}'", name));
        }
        let proxy_type = p.proxy_type.trim().to_ascii_lowercase();
        if proxy_type == "tcp" && p.upstream.trim().is_empty() {
            return Err(format!("proxy '{}' has no upstream", name));
        }

        defs.push(ProxyDef {
            name,
            proxy_type,
            bind_addr: p
                .bind_addr
                .filter(|b| !b.trim().is_empty())
                .unwrap_or_else(|| default_bind.to_string()),
            listen_port: p.listen_port,
            upstream: p.upstream.trim().to_string(),
            custom_domains: p.custom_domains,
            use_encryption: p.use_encryption,
            use_gzip: p.use_gzip,
            privilege_mode: p.privilege_mode,
        });
    }

    Ok(defs)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let defs = parse_proxies(
            r#"
[[proxy]]
name = "ssh"
listen_port = 6000
upstream = "127.0.0.1:22"
"#,
            "0.0.0.0",
        )
        .unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].proxy_type, "tcp");
        assert_eq!(defs[0].bind_addr, "0.0.0.0");
        assert!(defs[0].is_served());
        assert!(defs[0].custom_domains.is_empty());
    }

    #[test]
    fn test_parse_full() {
        let defs = parse_proxies(
            r#"
[[proxy]]
name = "web"
type = "HTTP"
bind_addr = "10.0.0.5"
listen_port = 80
custom_domains = ["a.example", "b.example"]
use_gzip = true
privilege_mode = true
"#,
            "0.0.0.0",
        )
        .unwrap();
        let web = &defs[0];
        assert_eq!(web.proxy_type, "http");
        assert!(!web.is_served());
        let info = web.info();
        assert_eq!(info.bind_addr, "10.0.0.5");
        assert_eq!(info.listen_port, 80);
        assert_eq!(info.custom_domains, vec!["a.example", "b.example"]);
        assert!(info.use_gzip);
        assert!(!info.use_encryption);
        assert!(info.privilege_mode);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = parse_proxies(
            r#"
[[proxy]]
name = "a"
listen_port = 1
upstream = "x:1"

[[proxy]]
name = "a"
listen_port = 2
upstream = "x:2"
"#,
            "0.0.0.0",
        )
        .unwrap_err();
        assert!(err.contains("duplicate"));
    }

    #[test]
    fn test_tcp_requires_upstream() {
        let err = parse_proxies("[[proxy]]\nname = \"a\"\nlisten_port = 1\n", "0.0.0.0").unwrap_err();
        assert!(err.contains("upstream"));
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(parse_proxies("", "0.0.0.0").is_err());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(parse_proxies("[[proxy]\nname=", "0.0.0.0").is_err());
    }
}
