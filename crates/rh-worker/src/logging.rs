//! Runtime log forwarding
//!
//! Console output is for the operator. Warnings and errors are also
//! forwarded to the controller with `SaveRuntimeLog` so they can be read
//! without access to the worker host.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use rh_core::api::RuntimeLogArgs;
use rh_core::time::current_time_millis;

use crate::rpc::ControllerApi;

/// Queue depth; events beyond it are dropped
pub const RUNTIME_LOG_BUFFER: usize = 256;

/// Layer capturing WARN and ERROR events into a channel
pub struct RuntimeLogLayer {
    source: String,
    tx: mpsc::Sender<RuntimeLogArgs>,
}

impl RuntimeLogLayer {
    /// Layer plus the receiving end for [`forward_runtime_logs`]
    pub fn new(source: impl Into<String>) -> (Self, mpsc::Receiver<RuntimeLogArgs>) {
        let (tx, rx) = mpsc::channel(RUNTIME_LOG_BUFFER);
        (
            Self {
                source: source.into(),
                tx,
            },
            rx,
        )
    }
}

impl<S: Subscriber> Layer<S> for RuntimeLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // More verbose levels compare greater
        if *meta.level() > Level::WARN || meta.target().starts_with(module_path!()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let entry = RuntimeLogArgs {
            source: self.source.clone(),
            level: meta.level().to_string(),
            target: meta.target().to_string(),
            message: visitor.finish(),
            timestamp_ms: current_time_millis(),
        };
        // Never block the logging thread
        let _ = self.tx.try_send(entry);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// Submit captured events until cancelled or the layer is gone
pub async fn forward_runtime_logs(
    api: Arc<dyn ControllerApi>,
    mut rx: mpsc::Receiver<RuntimeLogArgs>,
    cancel: CancellationToken,
) {
    loop {
        let entry = tokio::select! {
            _ = cancel.cancelled() => break,
            entry = rx.recv() => match entry {
                Some(entry) => entry,
                None => break,
            },
        };
        if let Err(e) = api.save_runtime_log(entry).await {
            tracing::debug!("Dropped runtime log: {}", e);
        }
    }
}
