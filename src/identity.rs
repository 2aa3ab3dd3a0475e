use async_trait::async_trait;
use serde_json::Value;
use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    process::Stdio,
    time::Duration,
};
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_TAILSCALE_BIN: &str = "tailscale";
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Maps a connection's source address to a numeric sender id.
///
/// Implementations never fail loudly: anything that cannot be resolved is `None`,
/// and `0` is never returned as an id.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, addr: IpAddr) -> Option<u64>;

    /// The host's own address on the private network, used for first-run self resolution.
    async fn self_address(&self) -> Option<IpAddr>;
}

/// Coerce a loosely typed JSON id into a positive integer.
///
/// Accepts integers, integral-or-not floats (truncated toward zero) and numeric strings.
/// Booleans, null, objects, arrays, unparsable strings and values outside `i64` are not ids.
pub fn coerce_id(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .map(f64::trunc)
            .filter(|f| (i64::MIN as f64..i64::MAX as f64).contains(f))
            .map(|f| f as i64),
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Same as [`coerce_id`] but only keeps values usable as a user id (> 0).
pub fn user_id_from_value(v: &Value) -> Option<u64> {
    coerce_id(v).filter(|id| *id > 0).map(|id| id as u64)
}

/// `tailscale whois --json <ip>`: `UserProfile.ID` is authoritative, `Node.User` is the fallback.
pub fn user_id_from_whois(doc: &Value) -> Option<u64> {
    doc.pointer("/UserProfile/ID")
        .and_then(user_id_from_value)
        .or_else(|| doc.pointer("/Node/User").and_then(user_id_from_value))
}

/// `tailscale status --json`: find the node (peers first, then self) that owns `addr`.
pub fn user_id_from_status(doc: &Value, addr: IpAddr) -> Option<u64> {
    let peers = doc
        .get("Peer")
        .and_then(|p| p.as_object())
        .into_iter()
        .flat_map(|m| m.values());
    let self_node = doc.get("Self").filter(|s| s.is_object());

    for node in peers.chain(self_node) {
        let Some(ips) = node.get("TailscaleIPs").and_then(|v| v.as_array()) else {
            continue;
        };
        let owns = ips
            .iter()
            .filter_map(|ip| ip.as_str())
            .filter_map(|ip| ip.trim().parse::<IpAddr>().ok())
            .any(|ip| ip.to_canonical() == addr);
        if owns {
            return node.get("UserID").and_then(user_id_from_value);
        }
    }
    None
}

/// First line of `tailscale ip -4` output that is a valid IPv4 address.
pub fn first_ipv4(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|l| l.trim().parse::<Ipv4Addr>().ok())
}

/// Resolves senders through the local `tailscale` CLI.
#[derive(Debug, Clone)]
pub struct TailscaleResolver {
    bin: PathBuf,
    timeout: Duration,
}

impl TailscaleResolver {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, args: &[&str]) -> Option<String> {
        let child = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let out = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                debug!(bin = %self.bin.display(), ?args, error = %e, "tailscale spawn failed");
                return None;
            }
            Err(_) => {
                debug!(bin = %self.bin.display(), ?args, "tailscale call timed out");
                return None;
            }
        };

        if !out.status.success() {
            debug!(?args, status = ?out.status.code(), "tailscale exited non-zero");
            return None;
        }
        Some(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    async fn run_json(&self, args: &[&str]) -> Option<Value> {
        let raw = self.run(args).await?;
        serde_json::from_str(&raw).ok()
    }

    pub async fn whois(&self, addr: IpAddr) -> Option<u64> {
        let ip = addr.to_string();
        let doc = self.run_json(&["whois", "--json", &ip]).await?;
        user_id_from_whois(&doc)
    }

    pub async fn status_lookup(&self, addr: IpAddr) -> Option<u64> {
        let doc = self.run_json(&["status", "--json"]).await?;
        user_id_from_status(&doc, addr)
    }
}

impl Default for TailscaleResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TAILSCALE_BIN)
    }
}

#[async_trait]
impl IdentityResolver for TailscaleResolver {
    async fn resolve(&self, addr: IpAddr) -> Option<u64> {
        let addr = addr.to_canonical();
        if let Some(id) = self.whois(addr).await {
            return Some(id);
        }
        self.status_lookup(addr).await
    }

    async fn self_address(&self) -> Option<IpAddr> {
        let out = self.run(&["ip", "-4"]).await?;
        first_ipv4(&out).map(IpAddr::V4)
    }
}
