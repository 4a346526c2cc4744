//! TCP-connect port scanner

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ipnet::Ipv4Net;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;

use rh_core::result::{IpResult, IpResultMap, PortResult};

use super::ports::parse_port_expr;
use super::{PortScanRequest, PortScanner};

/// Largest subnet a single sub-scan expands
const MAX_HOSTS: usize = 65_536;

/// Scans with plain TCP connects; needs no privileges or external binaries
#[derive(Debug, Clone)]
pub struct ConnectScanner {
    pub connect_timeout: Duration,
    pub banner_timeout: Duration,
}

impl Default for ConnectScanner {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(800),
            banner_timeout: Duration::from_millis(200),
        }
    }
}

#[async_trait]
impl PortScanner for ConnectScanner {
    async fn scan(&self, request: &PortScanRequest) -> Result<IpResultMap> {
        let hosts = expand_target(&request.target)?;
        let ports = parse_port_expr(&request.ports)
            .with_context(|| format!("connect scan of {}", request.target))?;

        let sem = Arc::new(Semaphore::new((request.settings.rate as usize).clamp(1, 5_000)));
        let mut set = JoinSet::new();

        for ip in hosts {
            for &port in &ports {
                let permit = sem.clone().acquire_owned().await?;
                let connect_timeout = self.connect_timeout;
                let banner_timeout = self.banner_timeout;
                set.spawn(async move {
                    let _permit = permit;
                    let addr = SocketAddr::new(IpAddr::V4(ip), port);
                    match time::timeout(connect_timeout, TcpStream::connect(addr)).await {
                        Ok(Ok(mut stream)) => {
                            let banner = read_banner(&mut stream, banner_timeout).await;
                            Some((ip, port, banner))
                        }
                        _ => None,
                    }
                });
            }
        }

        let mut results = IpResultMap::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(Some((ip, port, banner))) = joined {
                let entry = results
                    .entry(ip.to_string())
                    .or_insert_with(|| IpResult::new(ip.to_string()));
                entry.org_id = request.org_id;
                entry.ports.insert(
                    port,
                    PortResult {
                        status: Some("open".to_string()),
                        banner,
                        ..Default::default()
                    },
                );
            }
        }

        tracing::debug!(
            target = %request.target,
            open = results.values().map(|r| r.ports.len()).sum::<usize>(),
            "Connect scan finished"
        );
        Ok(results)
    }
}

/// A single IPv4 address or an `a.b.c.d/n` subnet
fn expand_target(target: &str) -> Result<Vec<Ipv4Addr>> {
    if let Ok(ip) = target.parse::<Ipv4Addr>() {
        return Ok(vec![ip]);
    }
    let net: Ipv4Net = target
        .parse()
        .with_context(|| format!("not an IPv4 address or subnet: {target}"))?;
    if net.prefix_len() < 16 {
        bail!("subnet {target} is too large");
    }
    Ok(net.hosts().take(MAX_HOSTS).collect())
}

async fn read_banner(stream: &mut TcpStream, wait: Duration) -> Option<String> {
    let mut buf = vec![0u8; 256];
    match time::timeout(wait, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            buf.truncate(n);
            let text = String::from_utf8_lossy(&buf)
                .replace('\n', "\\n")
                .replace('\r', "\\r");
            Some(text)
        }
        _ => None,
    }
}
