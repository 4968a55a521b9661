//! Tailscale queries for profiles with `network = "tailscale"`
//!
//! Reads `tailscale status --json` to find out whether the local client is
//! up and whether a host belongs to the tailnet.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Command;

/// Parsed state of the local Tailscale client
#[derive(Debug, Clone, Default)]
pub struct TailscaleState {
    /// Whether the client is logged in and running
    pub running: bool,
    /// MagicDNS suffix (e.g., "tail1234.ts.net")
    pub tailnet: String,
    /// Tailscale IPs of this device
    pub self_ips: Vec<String>,
    pub peers: Vec<TailscalePeer>,
}

/// Information about a peer in the tailnet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailscalePeer {
    /// Device name (e.g., "lab-server")
    pub device_name: String,
    /// Full DNS name without the trailing dot
    pub dns_name: String,
    pub ips: Vec<String>,
    pub online: bool,
}

impl TailscaleState {
    /// Find the peer a profile host refers to
    ///
    /// Matches the device name, the full DNS name or any Tailscale IP.
    pub fn find_peer(&self, host: &str) -> Option<&TailscalePeer> {
        let host = host.trim_end_matches('.');
        self.peers.iter().find(|peer| {
            peer.device_name.eq_ignore_ascii_case(host)
                || peer.dns_name.eq_ignore_ascii_case(host)
                || peer.ips.iter().any(|ip| ip == host)
        })
    }

    /// Whether `host` is this device or a peer in the tailnet
    pub fn contains_host(&self, host: &str) -> bool {
        self.self_ips.iter().any(|ip| ip == host) || self.find_peer(host).is_some()
    }
}

/// Status response from `tailscale status --json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TailscaleStatus {
    backend_state: String,
    #[serde(rename = "Self")]
    self_node: Option<SelfNode>,
    current_tailnet: Option<CurrentTailnet>,
    #[serde(default, deserialize_with = "deserialize_null_as_empty_map")]
    peer: HashMap<String, PeerNode>,
}

/// Deserialize null as an empty HashMap
fn deserialize_null_as_empty_map<'de, D, K, V>(deserializer: D) -> Result<HashMap<K, V>, D::Error>
where
    D: serde::Deserializer<'de>,
    K: std::cmp::Eq + std::hash::Hash + Deserialize<'de>,
    V: Deserialize<'de>,
{
    Option::<HashMap<K, V>>::deserialize(deserializer).map(|opt| opt.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PeerNode {
    #[serde(rename = "DNSName")]
    dns_name: String,
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Vec<String>,
    #[serde(default)]
    online: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SelfNode {
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentTailnet {
    #[serde(rename = "MagicDNSSuffix")]
    magic_dns_suffix: String,
}

/// Parse the JSON printed by `tailscale status --json`
pub fn parse_status(json: &[u8]) -> Result<TailscaleState> {
    let status: TailscaleStatus =
        serde_json::from_slice(json).context("Failed to parse tailscale status JSON")?;

    if status.backend_state != "Running" {
        return Ok(TailscaleState::default());
    }

    let mut peers: Vec<TailscalePeer> = status
        .peer
        .into_values()
        .map(|node| {
            let dns_name = node.dns_name.trim_end_matches('.').to_string();
            let device_name = dns_name.split('.').next().unwrap_or_default().to_string();
            TailscalePeer {
                device_name,
                dns_name,
                ips: node.tailscale_ips,
                online: node.online,
            }
        })
        .collect();
    peers.sort_by(|a, b| a.device_name.cmp(&b.device_name));

    Ok(TailscaleState {
        running: true,
        tailnet: status
            .current_tailnet
            .map(|t| t.magic_dns_suffix)
            .unwrap_or_default(),
        self_ips: status.self_node.map(|n| n.tailscale_ips).unwrap_or_default(),
        peers,
    })
}

/// Check if Tailscale is installed
pub fn is_tailscale_installed() -> bool {
    Command::new("tailscale")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Query the local client. `Ok(None)` when Tailscale is not installed.
pub fn status() -> Result<Option<TailscaleState>> {
    if !is_tailscale_installed() {
        return Ok(None);
    }

    let output = Command::new("tailscale")
        .args(["status", "--json"])
        .output()
        .context("Failed to run tailscale status")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // Not logged in or not running
        if stderr.contains("not logged in") || stderr.contains("stopped") {
            return Ok(Some(TailscaleState::default()));
        }
        anyhow::bail!("Tailscale status failed: {}", stderr.trim());
    }

    parse_status(&output.stdout).map(Some)
}
