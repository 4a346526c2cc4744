//! HTTP title probe

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::redirect::Policy;

use rh_core::config::FingerprintSettings;
use rh_core::result::{DomainResult, IpResult, PortResult};

use super::Fingerprinter;

const MAX_TITLE_LEN: usize = 256;

struct HttpResponse {
    scheme: &'static str,
    status: u16,
    title: Option<String>,
    server: Option<String>,
}

/// Fetches `/` over HTTP(S) and records status, title and server header
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(3))
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    async fn fetch(&self, host: &str) -> Option<HttpResponse> {
        let tls_first = host.ends_with(":443") || host.ends_with(":8443") || !host.contains(':');
        let schemes: [&'static str; 2] = if tls_first {
            ["https", "http"]
        } else {
            ["http", "https"]
        };

        for scheme in schemes {
            let url = format!("{scheme}://{host}/");
            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::trace!(%url, "Probe failed: {}", e);
                    continue;
                }
            };
            let status = response.status().as_u16();
            let server = response
                .headers()
                .get(reqwest::header::SERVER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            return Some(HttpResponse {
                scheme,
                status,
                title: extract_title(&body),
                server,
            });
        }
        None
    }
}

#[async_trait]
impl Fingerprinter for HttpProbe {
    async fn probe_ip(
        &self,
        ip: &str,
        ports: &[u16],
        techniques: &FingerprintSettings,
    ) -> Result<IpResult> {
        let mut result = IpResult::new(ip);
        for &port in ports {
            let mut port_result = PortResult::default();
            if techniques.httpx {
                if let Some(http) = self.fetch(&format!("{ip}:{port}")).await {
                    port_result.status = Some(http.status.to_string());
                    port_result.service = Some(http.scheme.to_string());
                    port_result.title = http.title;
                    port_result.fingerprints.extend(http.server);
                }
            }
            result.ports.insert(port, port_result);
        }
        Ok(result)
    }

    async fn probe_domain(
        &self,
        domain: &str,
        techniques: &FingerprintSettings,
    ) -> Result<DomainResult> {
        let mut result = DomainResult::new(domain);
        if techniques.httpx {
            if let Some(http) = self.fetch(domain).await {
                result.title = http.title;
                result.fingerprints.extend(http.server);
            }
        }
        Ok(result)
    }
}

/// Contents of the first `<title>` element
fn extract_title(body: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title: String = body[start..end]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_TITLE_LEN)
        .collect();
    (!title.is_empty()).then_some(title)
}
