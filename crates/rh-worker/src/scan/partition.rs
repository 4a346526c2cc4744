//! Splitting accumulated results into follow-on batches

use std::collections::{BTreeMap, BTreeSet};

use rh_core::result::{DomainResultMap, IpResultMap};
use rh_core::task::TargetBatch;

/// Group IP and domain results into per-organization batches
///
/// A result's own organization wins over `default_org`. Every input IP and
/// domain lands in exactly one batch, no batch mixes organizations, and an
/// organization with more than `max_targets` targets is split into several
/// batches.
pub fn make_sub_task_targets(
    ips: &IpResultMap,
    domains: &DomainResultMap,
    default_org: Option<i64>,
    max_targets: usize,
) -> Vec<TargetBatch> {
    let max_targets = max_targets.max(1);
    let mut by_org: BTreeMap<Option<i64>, (BTreeMap<String, Vec<u16>>, BTreeSet<String>)> =
        BTreeMap::new();

    for (ip, result) in ips {
        let org = result.org_id.filter(|id| *id != 0).or(default_org);
        let ports = result.ports.keys().copied().collect();
        by_org.entry(org).or_default().0.insert(ip.clone(), ports);
    }
    for (domain, result) in domains {
        let org = result.org_id.filter(|id| *id != 0).or(default_org);
        by_org.entry(org).or_default().1.insert(domain.clone());
    }

    let mut batches = Vec::new();
    for (org, (org_ips, org_domains)) in by_org {
        let mut current = TargetBatch::new(org);
        for (ip, ports) in org_ips {
            if current.len() == max_targets {
                batches.push(std::mem::replace(&mut current, TargetBatch::new(org)));
            }
            current.ip_ports.insert(ip, ports);
        }
        for domain in org_domains {
            if current.len() == max_targets {
                batches.push(std::mem::replace(&mut current, TargetBatch::new(org)));
            }
            current.domains.insert(domain);
        }
        if !current.is_empty() {
            batches.push(current);
        }
    }
    batches
}
