//! Method table: named RPC handlers
//!
//! Handlers are registered per [`RpcRequest`] type. The table decodes the JSON
//! request body, runs the handler and encodes its response; the server layer
//! only sees bytes in and bytes out.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use rh_core::api::{
    CheckTaskArgs, FetchTaskArgs, FinishTaskArgs, KeepAliveArgs, KeepAliveReply, MarkSyncedArgs,
    OrgAssetsArgs, OrgDomainsArgs, RpcRequest, RuntimeLogArgs, ScanResultArgs,
    VulnerabilityResultArgs,
};
use rh_core::TaskDescriptor;
use rh_protocol::ErrorCode;

use crate::state::ControllerState;
use crate::store::StoreError;

/// Errors produced while serving a call
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No handler under that name
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// A handler was registered twice
    #[error("method already registered: {0}")]
    DuplicateMethod(&'static str),

    /// Request body did not decode
    #[error("invalid request: {0}")]
    InvalidRequest(#[source] serde_json::Error),

    /// Response body did not encode
    #[error("failed to encode response: {0}")]
    Encoding(#[source] serde_json::Error),

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Handler rejected the request
    #[error("{0}")]
    Handler(String),
}

impl ServiceError {
    /// Fault code sent back to the caller
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::UnknownMethod(_) => ErrorCode::UnknownMethod,
            ServiceError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ServiceError::DuplicateMethod(_) | ServiceError::Encoding(_) => ErrorCode::Unknown,
            ServiceError::Store(_) | ServiceError::Handler(_) => ErrorCode::HandlerFailed,
        }
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Bytes, ServiceError>> + Send>>;
type Handler = Arc<dyn Fn(Bytes) -> HandlerFuture + Send + Sync>;

/// Registered RPC handlers by method name
#[derive(Default, Clone)]
pub struct MethodTable {
    handlers: HashMap<&'static str, Handler>,
}

impl MethodTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `R::METHOD`
    pub fn register<R, F, Fut>(&mut self, handler: F) -> Result<(), ServiceError>
    where
        R: RpcRequest + 'static,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Response, ServiceError>> + Send + 'static,
    {
        let name = R::METHOD.as_str();
        if self.handlers.contains_key(name) {
            return Err(ServiceError::DuplicateMethod(name));
        }

        let handler = Arc::new(handler);
        let erased: Handler = Arc::new(move |body: Bytes| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let request: R =
                    serde_json::from_slice(&body).map_err(ServiceError::InvalidRequest)?;
                let response = handler(request).await?;
                let encoded = serde_json::to_vec(&response).map_err(ServiceError::Encoding)?;
                Ok(Bytes::from(encoded))
            })
        });
        self.handlers.insert(name, erased);
        Ok(())
    }

    /// Whether a method is registered
    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Number of registered methods
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler registered under `method`
    pub async fn dispatch(&self, method: &str, body: Bytes) -> Result<Bytes, ServiceError> {
        let handler = self
            .handlers
            .get(method)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownMethod(method.to_string()))?;
        handler(body).await
    }
}

/// Build the controller's method table
pub fn build_method_table(state: Arc<ControllerState>) -> Result<MethodTable, ServiceError> {
    let mut table = MethodTable::new();

    let s = Arc::clone(&state);
    table.register(move |args: OrgAssetsArgs| {
        let s = Arc::clone(&s);
        async move { Ok::<_, ServiceError>(s.store.load_ips(args.org_id).await?) }
    })?;

    let s = Arc::clone(&state);
    table.register(move |args: OrgDomainsArgs| {
        let s = Arc::clone(&s);
        async move { Ok::<_, ServiceError>(s.store.load_domains(args.org_id).await?) }
    })?;

    let s = Arc::clone(&state);
    table.register(move |args: ScanResultArgs| {
        let s = Arc::clone(&s);
        async move { Ok::<_, ServiceError>(s.store.save_scan_result(args).await?) }
    })?;

    let s = Arc::clone(&state);
    table.register(move |args: VulnerabilityResultArgs| {
        let s = Arc::clone(&s);
        async move { Ok::<_, ServiceError>(s.store.save_vulnerabilities(args).await?) }
    })?;

    let s = Arc::clone(&state);
    table.register(move |args: RuntimeLogArgs| {
        let s = Arc::clone(&s);
        async move {
            tracing::debug!(source = %args.source, level = %args.level, "{}", args.message);
            s.store.save_runtime_log(args).await?;
            Ok::<_, ServiceError>("ok".to_string())
        }
    })?;

    let s = Arc::clone(&state);
    table.register(move |task: TaskDescriptor| {
        let s = Arc::clone(&s);
        async move {
            if task.task_id.is_empty() {
                return Err(ServiceError::Handler("task id is empty".into()));
            }
            tracing::info!(
                task_id = %task.task_id,
                main_task_id = %task.main_task_id,
                task_type = %task.task_type,
                "New task queued"
            );
            Ok(s.store.enqueue_task(task).await?.to_string())
        }
    })?;

    let s = Arc::clone(&state);
    table.register(move |args: CheckTaskArgs| {
        let s = Arc::clone(&s);
        async move { Ok::<_, ServiceError>(s.store.check_task(&args.task_id).await?) }
    })?;

    let s = Arc::clone(&state);
    table.register(move |args: FetchTaskArgs| {
        let s = Arc::clone(&s);
        async move { Ok::<_, ServiceError>(s.store.next_task(&args.worker_id).await?) }
    })?;

    let s = Arc::clone(&state);
    table.register(move |args: FinishTaskArgs| {
        let s = Arc::clone(&s);
        async move {
            match &args.error {
                Some(error) => tracing::warn!(task_id = %args.task_id, worker = %args.worker_id, "Task failed: {}", error),
                None => tracing::info!(task_id = %args.task_id, worker = %args.worker_id, result = %args.result, "Task finished"),
            }
            Ok::<_, ServiceError>(s.store.finish_task(args).await?)
        }
    })?;

    let s = Arc::clone(&state);
    table.register(move |args: KeepAliveArgs| {
        let s = Arc::clone(&s);
        async move {
            Ok::<KeepAliveReply, ServiceError>(s.registry.heartbeat(&args).await)
        }
    })?;

    let s = Arc::clone(&state);
    table.register(move |args: MarkSyncedArgs| {
        let s = Arc::clone(&s);
        async move { Ok(s.registry.mark_synced(&args.worker_id, args.generation).await) }
    })?;

    Ok(table)
}
