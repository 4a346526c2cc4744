//! Worker RPC client against a real controller on a loopback port

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use rh_controller::{build_method_table, ControllerState, ControllerStore, MemoryStore, RpcServer};
use rh_core::api::{KeepAliveArgs, ScanResultArgs};
use rh_core::config::{ControllerConfig, ScanSettings};
use rh_core::task::{PortScanConfig, Scope};
use rh_core::types::TaskStatus;
use rh_core::{RpcError, ScanConfig, TaskDescriptor, WorkerId};
use rh_controller::WorkerRegistry;
use rh_worker::sync::{KeepAlive, Resync};
use rh_worker::{ControllerApi, Dispatcher, EngineSet, RpcClient, ScanOrchestrator, StaticSettings, TaskRunner};

use common::{ip_with_ports, ScriptedPortScanner};

const TOKEN: &str = "roundtrip-secret";

async fn start_controller(store: Arc<MemoryStore>) -> (SocketAddr, CancellationToken) {
    let (addr, cancel, _) = start_controller_with_state(store).await;
    (addr, cancel)
}

async fn start_controller_with_state(
    store: Arc<MemoryStore>,
) -> (SocketAddr, CancellationToken, Arc<ControllerState>) {
    let config = ControllerConfig {
        auth_key: TOKEN.to_string(),
        ..Default::default()
    };
    let state = Arc::new(ControllerState::with_store(config, store));
    let table = build_method_table(Arc::clone(&state)).expect("method table");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let cancel = CancellationToken::new();
    let server = RpcServer::new(table, TOKEN, cancel.clone());
    tokio::spawn(async move {
        server.serve(listener).await.expect("serve");
    });
    (addr, cancel, state)
}

#[tokio::test]
async fn test_fetch_run_and_finish() {
    let store = Arc::new(MemoryStore::new());
    let (addr, cancel) = start_controller(Arc::clone(&store)).await;

    let mut config = PortScanConfig {
        scope: Scope::new(Some(11), 1),
        fingerprint: true,
        ..Default::default()
    };
    config.ip_ports.insert("10.1.1.1".to_string(), vec![80, 443]);
    let seed = TaskDescriptor::root(&ScanConfig::PortScan(config)).unwrap();
    let task_id = store.enqueue_task(seed).await.unwrap();

    let api: Arc<dyn ControllerApi> = Arc::new(RpcClient::new(
        addr.to_string(),
        TOKEN,
        Duration::from_secs(5),
    ));
    let engines = EngineSet::new().with_port_scanner("connect", Arc::new(ScriptedPortScanner::default()));
    let orchestrator = ScanOrchestrator::new(
        Arc::clone(&api),
        Arc::new(engines),
        Arc::new(StaticSettings(ScanSettings::default())),
    );
    let runner = TaskRunner::new(Arc::clone(&api), orchestrator, Dispatcher::new(Arc::clone(&api)));

    let worker = WorkerId::new("w-roundtrip");
    let task = api.fetch_task(&worker).await.unwrap().expect("queued task");
    assert_eq!(task.task_id, task_id);

    let report = runner.execute_and_finish(&task, &worker).await.unwrap();
    assert!(report.is_success(), "{}", report.result);
    assert_eq!(report.result, "ip:1");

    let record = store.task(&task_id).unwrap();
    assert_eq!(record.status, TaskStatus::Success);
    assert_eq!(record.result.as_deref(), Some("ip:1"));

    let stored = store.load_ips(11).await.unwrap();
    assert_eq!(stored["10.1.1.1"].ports.len(), 2);

    // The fingerprint follow-on is queued under the same main task
    let chain = store.tasks_of(&task_id);
    assert_eq!(chain.len(), 2);
    let follow_on = api.fetch_task(&worker).await.unwrap().expect("follow-on");
    assert_eq!(follow_on.main_task_id, task_id);
    assert_eq!(follow_on.parent_task_id.as_ref(), Some(&task_id));

    cancel.cancel();
}

#[tokio::test]
async fn test_wrong_token_has_no_side_effects() {
    let store = Arc::new(MemoryStore::new());
    let (addr, cancel) = start_controller(Arc::clone(&store)).await;

    let client = RpcClient::new(addr.to_string(), "not-the-token", Duration::from_secs(5));
    let args = ScanResultArgs {
        task_id: "t-1".into(),
        main_task_id: "t-1".into(),
        scope: Scope::new(Some(12), 1),
        ip_results: [ip_with_ports("10.2.2.2", Some(12), &[22])].into(),
        domain_results: Default::default(),
    };

    let err = client.save_scan_result(args).await.unwrap_err();
    assert!(matches!(err, RpcError::Authentication(_)), "{:?}", err);
    assert!(store.load_ips(12).await.unwrap().is_empty());

    cancel.cancel();
}

/// Raises the fleet flag from inside the resync
struct ChangingFiles {
    registry: Arc<WorkerRegistry>,
}

#[async_trait]
impl Resync for ChangingFiles {
    async fn resync(&self) -> Result<()> {
        self.registry.mark_all_for_sync().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_change_during_resync_survives_mark_synced() {
    let (addr, cancel, state) = start_controller_with_state(Arc::new(MemoryStore::new())).await;
    let api: Arc<dyn ControllerApi> = Arc::new(RpcClient::new(
        addr.to_string(),
        TOKEN,
        Duration::from_secs(5),
    ));
    let worker = WorkerId::new("w-resync");
    api.keep_alive(KeepAliveArgs {
        worker_id: worker.clone(),
        hostname: "scanner-02".into(),
        running_tasks: 0,
    })
    .await
    .unwrap();
    state.registry.mark_all_for_sync().await;

    let beat = KeepAlive {
        api,
        worker_id: worker.clone(),
        hostname: "scanner-02".into(),
        interval: Duration::from_secs(30),
        running: Default::default(),
        gate: Arc::new(RwLock::new(())),
        resync: Arc::new(ChangingFiles {
            registry: Arc::clone(&state.registry),
        }),
    };
    assert!(beat.beat().await.unwrap());

    let status = state.registry.get(&worker).await.unwrap();
    assert!(status.manual_sync);
    assert_eq!(status.sync_generation, 2);

    cancel.cancel();
}
