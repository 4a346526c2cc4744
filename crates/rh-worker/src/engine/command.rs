//! Proof-of-concept engine backed by an external binary

use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use rh_core::config::CommandSpec;
use rh_core::result::VulnerabilityFinding;

use super::{PocEngine, PocRequest, PocTool};

/// Runs the configured command once per request and reads JSON findings,
/// one per line, from its stdout
#[derive(Debug, Clone)]
pub struct CommandPocEngine {
    tool: PocTool,
    spec: CommandSpec,
}

impl CommandPocEngine {
    pub fn new(tool: PocTool, spec: CommandSpec) -> Self {
        Self { tool, spec }
    }

    fn args(&self, request: &PocRequest) -> Vec<String> {
        self.spec
            .args
            .iter()
            .map(|arg| {
                arg.replace("{target}", &request.target)
                    .replace("{poc_file}", &request.poc_file)
            })
            .collect()
    }
}

#[async_trait]
impl PocEngine for CommandPocEngine {
    async fn verify(&self, request: &PocRequest) -> Result<Vec<VulnerabilityFinding>> {
        let output = Command::new(&self.spec.program)
            .args(self.args(request))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.spec.program))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.tool.as_str(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(parse_findings(
            &String::from_utf8_lossy(&output.stdout),
            self.tool,
            request,
        ))
    }
}

fn parse_findings(stdout: &str, tool: PocTool, request: &PocRequest) -> Vec<VulnerabilityFinding> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| match serde_json::from_str::<VulnerabilityFinding>(line) {
            Ok(finding) => Some(finding),
            Err(e) => {
                tracing::debug!(tool = tool.as_str(), "Skipping unparsable line: {}", e);
                None
            }
        })
        .map(|mut finding| {
            if finding.source.is_empty() {
                finding.source = tool.as_str().to_string();
            }
            if finding.target.is_empty() {
                finding.target = request.target.clone();
            }
            if finding.poc_file.is_empty() {
                finding.poc_file = request.poc_file.clone();
            }
            finding
        })
        .collect()
}
