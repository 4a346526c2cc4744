//! Task lifecycle and phase chaining against a recording controller

mod common;

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use rh_core::config::ScanSettings;
use rh_core::result::DomainResultMap;
use rh_core::task::{
    DomainScanConfig, FingerprintConfig, OnlineSearchConfig, OnlineSource, OrgScanConfig,
    PocConfig, PocOptions, PortScanConfig, Scope,
};
use rh_core::{ScanConfig, TaskDescriptor, TaskError, TaskType, WorkerId};
use rh_worker::engine::{DomainStrategy, PocTool};
use rh_worker::EngineSet;

use common::*;

fn port_engines(scanner: Arc<ScriptedPortScanner>) -> EngineSet {
    EngineSet::new().with_port_scanner("connect", scanner)
}

#[tokio::test]
async fn test_org_scan_batches_org_ips() {
    let api = MockController::new();
    api.set_org_ips(
        7,
        [
            ip_with_ports("10.0.0.1", Some(7), &[80]),
            ip_with_ports("10.0.0.2", Some(7), &[443]),
        ]
        .into(),
    );
    let runner = runner(Arc::clone(&api), EngineSet::new(), ScanSettings::default());

    let task = TaskDescriptor::root(&ScanConfig::OrgScan(OrgScanConfig {
        scope: Scope::new(Some(7), 1),
        is_org_ip: true,
        ..Default::default()
    }))
    .unwrap();
    let report = runner.execute(&task).await;

    assert!(report.is_success(), "{}", report.result);
    assert_eq!(report.result, "ip:2");

    let follow_ons = api.follow_ons();
    assert_eq!(follow_ons.len(), 1);
    match &follow_ons[0] {
        ScanConfig::PortScan(config) => {
            let ips: Vec<&str> = config.ip_ports.keys().map(String::as_str).collect();
            assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2"]);
            assert_eq!(config.ip_ports["10.0.0.1"], vec![80]);
            assert_eq!(config.scope, Scope::new(Some(7), 1));
        }
        other => panic!("expected a port-scan follow-on, got {:?}", other),
    }

    let queued = &api.new_tasks.lock().unwrap()[0];
    assert_eq!(queued.main_task_id, task.task_id);
    assert_eq!(queued.parent_task_id.as_ref(), Some(&task.task_id));
    assert_eq!(queued.task_type, TaskType::PortScan);
}

#[tokio::test]
async fn test_org_scan_port_expression_overrides_known_ports() {
    let api = MockController::new();
    api.set_org_ips(
        3,
        [
            ip_with_ports("10.0.0.1", Some(3), &[80]),
            ip_with_ports("10.0.0.2", Some(3), &[]),
        ]
        .into(),
    );
    let runner = runner(Arc::clone(&api), EngineSet::new(), ScanSettings::default());

    let task = TaskDescriptor::root(&ScanConfig::OrgScan(OrgScanConfig {
        scope: Scope::new(Some(3), 1),
        is_org_ip: true,
        org_ip_port: Some("1-1024".to_string()),
        ..Default::default()
    }))
    .unwrap();
    assert!(runner.execute(&task).await.is_success());

    match &api.follow_ons()[0] {
        ScanConfig::PortScan(config) => {
            assert!(config.ip_ports.is_empty());
            assert_eq!(config.ip_port_expr["10.0.0.1"], "1-1024");
            assert_eq!(config.ip_port_expr["10.0.0.2"], "1-1024");
        }
        other => panic!("expected a port-scan follow-on, got {:?}", other),
    }
}

#[tokio::test]
async fn test_port_scan_without_fingerprint() {
    let api = MockController::new();
    let scanner = Arc::new(ScriptedPortScanner::default());
    let runner = runner(
        Arc::clone(&api),
        port_engines(Arc::clone(&scanner)),
        ScanSettings::default(),
    );

    let mut config = PortScanConfig {
        scope: Scope::new(Some(2), 1),
        ..Default::default()
    };
    config.ip_ports.insert("10.0.0.1".to_string(), vec![80, 443]);
    let task = TaskDescriptor::root(&ScanConfig::PortScan(config)).unwrap();

    let report = runner.execute(&task).await;
    assert!(report.is_success(), "{}", report.result);
    assert_eq!(report.result, "ip:1");
    assert_eq!(scanner.calls.load(Ordering::SeqCst), 1);

    let submitted = api.scan_results.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    let ip = &submitted[0].ip_results["10.0.0.1"];
    assert_eq!(ip.ports.keys().copied().collect::<Vec<_>>(), vec![80, 443]);
    assert_eq!(ip.org_id, Some(2));
    assert_eq!(submitted[0].main_task_id, task.task_id);

    assert!(api.new_tasks.lock().unwrap().is_empty());
    assert!(!api.calls().contains(&"new_task"));
}

#[tokio::test]
async fn test_fingerprint_poc_follow_ons_never_combined() {
    let api = MockController::new();
    let engines = EngineSet::new().with_fingerprinter(Arc::new(TitleProbe));
    let settings = ScanSettings {
        max_batch_targets: 1,
        ..Default::default()
    };
    let runner = runner(Arc::clone(&api), engines, settings);

    let mut config = FingerprintConfig {
        scope: Scope::new(Some(5), 1),
        poc: PocOptions {
            xray: true,
            nuclei: true,
            ..Default::default()
        },
        ..Default::default()
    };
    config.ip_ports.insert("10.0.0.1".to_string(), vec![8080]);
    config.domains.insert("portal.example.com".to_string());
    let task = TaskDescriptor::root(&ScanConfig::Fingerprint(config)).unwrap();

    let report = runner.execute(&task).await;
    assert!(report.is_success(), "{}", report.result);
    assert_eq!(report.result, "ip:1,domain:1");

    // Two partitions, one xray and one nuclei task each
    let follow_ons = api.follow_ons();
    assert_eq!(follow_ons.len(), 4);
    let xray: Vec<&PocConfig> = follow_ons
        .iter()
        .filter_map(|c| match c {
            ScanConfig::Xray(c) => Some(c),
            _ => None,
        })
        .collect();
    let nuclei: Vec<&PocConfig> = follow_ons
        .iter()
        .filter_map(|c| match c {
            ScanConfig::Nuclei(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(xray.len(), 2);
    assert_eq!(nuclei.len(), 2);
    assert!(follow_ons
        .iter()
        .all(|c| matches!(c, ScanConfig::Xray(_) | ScanConfig::Nuclei(_))));

    let submitted = api.scan_results.lock().unwrap();
    assert_eq!(
        submitted[0].ip_results["10.0.0.1"].ports[&8080].title.as_deref(),
        Some("It works")
    );
    assert_eq!(
        submitted[0].domain_results["portal.example.com"].title.as_deref(),
        Some("Welcome")
    );
}

#[tokio::test]
async fn test_ineligible_task_short_circuits() {
    let api = MockController::new();
    let runner = runner(Arc::clone(&api), EngineSet::new(), ScanSettings::default());

    // Undecodable on purpose: must never be looked at
    let task = TaskDescriptor {
        task_id: "t-revoked".into(),
        main_task_id: "t-revoked".into(),
        parent_task_id: None,
        task_type: TaskType::PortScan,
        config: serde_json::json!({ "ip_ports": "not a map" }),
    };
    api.not_runnable.lock().unwrap().insert(task.task_id.clone());

    let report = runner
        .execute_and_finish(&task, &WorkerId::new("w1"))
        .await
        .unwrap();
    assert!(report.skipped);
    assert!(report.error.is_none());
    assert_eq!(report.result, "task revoked");
    assert_eq!(api.calls(), vec!["check_task"]);
}

#[tokio::test]
async fn test_org_scan_without_org_id() {
    let api = MockController::new();
    let runner = runner(Arc::clone(&api), EngineSet::new(), ScanSettings::default());

    let task = TaskDescriptor::root(&ScanConfig::OrgScan(OrgScanConfig {
        scope: Scope::new(Some(0), 1),
        is_org_ip: true,
        is_org_domain: true,
        ..Default::default()
    }))
    .unwrap();
    let report = runner.execute(&task).await;

    assert!(matches!(report.error, Some(TaskError::MissingOrgId)));
    assert_eq!(report.result, "no org id");
    assert_eq!(api.calls(), vec!["check_task"]);
}

#[tokio::test]
async fn test_decode_failure_fails_task() {
    let api = MockController::new();
    let runner = runner(Arc::clone(&api), EngineSet::new(), ScanSettings::default());

    let task = TaskDescriptor {
        task_id: "t-bad".into(),
        main_task_id: "t-bad".into(),
        parent_task_id: None,
        task_type: TaskType::DomainScan,
        config: serde_json::json!({ "domains": 42 }),
    };
    let report = runner
        .execute_and_finish(&task, &WorkerId::new("w1"))
        .await
        .unwrap();

    assert!(matches!(report.error, Some(TaskError::Decode(_))));
    assert_eq!(api.calls(), vec!["check_task", "finish_task"]);
    let finished = api.finished.lock().unwrap();
    assert_eq!(finished[0].error.as_deref(), Some(report.result.as_str()));
}

#[tokio::test]
async fn test_online_search_fans_out_per_org() {
    let api = MockController::new();
    let search = StaticSearch {
        ips: [
            ip_with_ports("10.0.1.1", Some(1), &[80]),
            ip_with_ports("10.0.2.1", Some(2), &[80]),
            ip_with_ports("10.0.2.2", Some(2), &[22]),
            ip_with_ports("10.0.3.1", Some(3), &[]),
        ]
        .into(),
        domains: DomainResultMap::new(),
    };
    let engines = EngineSet::new().with_online_search(OnlineSource::Hunter, Arc::new(search));
    let runner = runner(Arc::clone(&api), engines, ScanSettings::default());

    let task = TaskDescriptor::root(&ScanConfig::OnlineApiSearch(OnlineSearchConfig {
        scope: Scope::new(None, 1),
        source: OnlineSource::Hunter,
        keyword: Some("title=\"login\"".to_string()),
        ..Default::default()
    }))
    .unwrap();
    let report = runner.execute(&task).await;
    assert_eq!(report.result, "ip:4");

    let follow_ons = api.follow_ons();
    assert_eq!(follow_ons.len(), 3);
    let orgs: BTreeSet<Option<i64>> = follow_ons
        .iter()
        .map(|c| match c {
            ScanConfig::PortScan(c) => c.scope.org_id,
            other => panic!("expected port-scan, got {:?}", other),
        })
        .collect();
    assert_eq!(orgs, [Some(1), Some(2), Some(3)].into());

    // An IP without known ports gets the default port list
    let org3 = follow_ons
        .iter()
        .find_map(|c| match c {
            ScanConfig::PortScan(c) if c.scope.org_id == Some(3) => Some(c),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        org3.ip_port_expr["10.0.3.1"],
        ScanSettings::default().portscan.default_ports
    );
}

#[tokio::test]
async fn test_online_search_without_engine() {
    let api = MockController::new();
    let runner = runner(Arc::clone(&api), EngineSet::new(), ScanSettings::default());

    let task = TaskDescriptor::root(&ScanConfig::OnlineApiSearch(OnlineSearchConfig {
        source: OnlineSource::Quake,
        target: Some("10.0.0.0/24".to_string()),
        ..Default::default()
    }))
    .unwrap();
    let report = runner.execute(&task).await;

    assert!(matches!(report.error, Some(TaskError::EngineUnavailable("quake"))));
    assert!(api.scan_results.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sub_scan_panic_is_isolated() {
    let api = MockController::new();
    let scanner = Arc::new(ScriptedPortScanner {
        panic_on: Some("10.0.0.2".to_string()),
        ..Default::default()
    });
    let runner = runner(
        Arc::clone(&api),
        port_engines(Arc::clone(&scanner)),
        ScanSettings::default(),
    );

    let mut config = PortScanConfig::default();
    for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
        config.ip_port_expr.insert(ip.to_string(), "80,8000-8001".to_string());
    }
    let task = TaskDescriptor::root(&ScanConfig::PortScan(config)).unwrap();

    let report = runner.execute(&task).await;
    assert!(report.is_success(), "{}", report.result);
    assert_eq!(report.result, "ip:2");
    assert_eq!(scanner.calls.load(Ordering::SeqCst), 3);

    let submitted = api.scan_results.lock().unwrap();
    let ips: Vec<&str> = submitted[0].ip_results.keys().map(String::as_str).collect();
    assert_eq!(ips, vec!["10.0.0.1", "10.0.0.3"]);
    assert_eq!(submitted[0].ip_results["10.0.0.1"].ports.len(), 3);
}

#[tokio::test]
async fn test_dispatch_failure_fails_task() {
    let api = MockController::new();
    api.fail_new_task.store(true, Ordering::SeqCst);
    let scanner = Arc::new(ScriptedPortScanner::default());
    let runner = runner(
        Arc::clone(&api),
        port_engines(scanner),
        ScanSettings::default(),
    );

    let mut config = PortScanConfig {
        fingerprint: true,
        ..Default::default()
    };
    config.ip_ports.insert("10.0.0.1".to_string(), vec![80]);
    let task = TaskDescriptor::root(&ScanConfig::PortScan(config)).unwrap();

    let report = runner.execute(&task).await;
    assert!(matches!(report.error, Some(TaskError::Rpc(_))));
    assert_eq!(api.scan_results.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_domain_scan_chains_port_scan_and_queries() {
    let api = MockController::new();
    let engines =
        EngineSet::new().with_domain_scanner(DomainStrategy::Resolve, Arc::new(StaticResolver("10.9.9.9")));
    let mut settings = ScanSettings::default();
    settings.domainscan.port_scan = true;
    settings.domainscan.port_expr = Some("80,443".to_string());
    let runner = runner(Arc::clone(&api), engines, settings);

    let mut config = DomainScanConfig {
        scope: Scope::new(Some(4), 2),
        icp: true,
        ..Default::default()
    };
    config.domains.insert("a.example.com".to_string());
    config.domains.insert("b.example.com".to_string());
    let task = TaskDescriptor::root(&ScanConfig::DomainScan(config)).unwrap();

    let report = runner.execute(&task).await;
    assert_eq!(report.result, "domain:2");

    let follow_ons = api.follow_ons();
    let port_scans: Vec<&PortScanConfig> = follow_ons
        .iter()
        .filter_map(|c| match c {
            ScanConfig::PortScan(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(port_scans.len(), 1);
    assert_eq!(port_scans[0].ip_port_expr["10.9.9.9"], "80,443");
    assert_eq!(port_scans[0].scope, Scope::new(Some(4), 2));

    let icp = follow_ons
        .iter()
        .filter(|c| matches!(c, ScanConfig::IcpQuery(_)))
        .count();
    assert_eq!(icp, 2);
}

#[tokio::test]
async fn test_domain_scan_missing_strategy() {
    let api = MockController::new();
    let engines =
        EngineSet::new().with_domain_scanner(DomainStrategy::Resolve, Arc::new(StaticResolver("10.9.9.9")));
    let runner = runner(Arc::clone(&api), engines, ScanSettings::default());

    let mut config = DomainScanConfig {
        brute: true,
        ..Default::default()
    };
    config.domains.insert("a.example.com".to_string());
    let task = TaskDescriptor::root(&ScanConfig::DomainScan(config)).unwrap();

    let report = runner.execute(&task).await;
    assert!(matches!(
        report.error,
        Some(TaskError::EngineUnavailable("subdomain brute"))
    ));
}

#[tokio::test]
async fn test_poc_target_expansion() {
    let api = MockController::new();
    let nuclei = Arc::new(RecordingPoc::default());
    let goby = Arc::new(RecordingPoc::default());
    let engines = EngineSet::new()
        .with_poc_engine(PocTool::Nuclei, nuclei.clone())
        .with_poc_engine(PocTool::Goby, goby.clone());
    let runner = runner(Arc::clone(&api), engines, ScanSettings::default());

    let mut config = PocConfig::default();
    config.ip_ports.insert("10.0.0.1".to_string(), vec![80, 443]);
    config.domains.insert("a.example.com".to_string());
    config.domains.insert("b.example.com".to_string());

    let task = TaskDescriptor::root(&ScanConfig::Nuclei(config.clone())).unwrap();
    let report = runner.execute(&task).await;
    assert_eq!(report.result, "vulnerability:4");
    {
        let requests = nuclei.requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|r| r.poc_file == "*"));
    }

    let task = TaskDescriptor::root(&ScanConfig::Goby(config)).unwrap();
    let report = runner.execute(&task).await;
    assert_eq!(report.result, "vulnerability:2");
    let mut targets: Vec<String> = goby
        .requests
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.target.clone())
        .collect();
    targets.sort();
    assert_eq!(targets, vec!["10.0.0.1:80,10.0.0.1:443", "a.example.com,b.example.com"]);

    assert_eq!(api.vulnerabilities.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_finish_reports_summary() {
    let api = MockController::new();
    let runner = runner(
        Arc::clone(&api),
        port_engines(Arc::new(ScriptedPortScanner::default())),
        ScanSettings::default(),
    );

    let mut config = PortScanConfig::default();
    config.ip_ports.insert("10.0.0.1".to_string(), vec![22]);
    let task = TaskDescriptor::root(&ScanConfig::PortScan(config)).unwrap();

    let report = runner
        .execute_and_finish(&task, &WorkerId::new("w7"))
        .await
        .unwrap();
    assert!(report.is_success());

    let finished = api.finished.lock().unwrap();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].result, "ip:1");
    assert_eq!(finished[0].worker_id, WorkerId::new("w7"));
    assert!(finished[0].error.is_none());
}
