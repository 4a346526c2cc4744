//! Port expressions

use std::collections::BTreeSet;

use anyhow::{bail, Context, Result};

/// Parse "80,443,8000-9000" into a sorted, deduplicated port list
pub fn parse_port_expr(expr: &str) -> Result<Vec<u16>> {
    let mut ports = BTreeSet::new();

    for part in expr.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((start, end)) = part.split_once('-') {
            let start = parse_port(start.trim())
                .with_context(|| format!("invalid range start in {part}"))?;
            let end =
                parse_port(end.trim()).with_context(|| format!("invalid range end in {part}"))?;
            if start > end {
                bail!("invalid range {start}-{end}");
            }
            ports.extend(start..=end);
        } else {
            ports.insert(parse_port(part).with_context(|| format!("invalid port {part}"))?);
        }
    }

    if ports.is_empty() {
        bail!("no ports in expression {expr:?}");
    }
    Ok(ports.into_iter().collect())
}

/// Render a port list as an expression
pub fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_port(s: &str) -> Result<u16> {
    let value: u32 = s.parse()?;
    if value == 0 || value > u16::MAX as u32 {
        bail!("port {value} out of range");
    }
    Ok(value as u16)
}
