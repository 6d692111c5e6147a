//! Translation of desired-state objects into mesh control-plane commands.

use std::sync::Arc;

use crate::changeset::refs::{id_field, lookup_field, CATALOG_SERVICE};
use crate::changeset::ConfigObjectRef;
use crate::error::CommandError;
use crate::external::{ConfigObject, MeshCommandQueues};

/// Which mesh client queue a command goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetQueue {
    Control,
    Catalog,
}

impl std::fmt::Display for TargetQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetQueue::Control => write!(f, "control"),
            TargetQueue::Catalog => write!(f, "catalog"),
        }
    }
}

/// Called by the executor with the command output and its error, if any.
pub type ResultLogger = Arc<dyn Fn(&str, Option<&CommandError>) + Send + Sync>;

/// One command for the mesh control-plane CLI.
#[derive(Clone)]
pub struct Command {
    pub target: TargetQueue,
    pub args: String,
    pub stdin: Option<Vec<u8>>,
    /// Failed commands are retried by a later pass.
    pub requeue: bool,
    pub logger: ResultLogger,
}

impl Command {
    pub fn log_result(&self, output: &str, error: Option<&CommandError>) {
        (self.logger)(output, error)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("target", &self.target)
            .field("args", &self.args)
            .field("stdin_len", &self.stdin.as_ref().map(Vec::len))
            .field("requeue", &self.requeue)
            .finish()
    }
}

/// Queue for `kind`; `None` for an empty (unrecognizable) kind.
pub fn route(kind: &str) -> Option<TargetQueue> {
    match kind {
        "" => None,
        CATALOG_SERVICE => Some(TargetQueue::Catalog),
        _ => Some(TargetQueue::Control),
    }
}

/// CLI flag naming the identity of `kind`.
pub fn kind_flag(kind: &str) -> String {
    if kind == CATALOG_SERVICE {
        "service-id".to_string()
    } else {
        format!("{}-key", kind)
    }
}

/// Identity of a raw object; empty (and logged) when the field is missing.
pub fn object_key(kind: &str, raw: &[u8]) -> String {
    let parsed = serde_json::from_slice::<serde_json::Value>(raw).ok();
    lookup_field(parsed.as_ref(), &id_field(kind)).unwrap_or_else(|| {
        tracing::error!(
            kind,
            object = %String::from_utf8_lossy(raw),
            "no object key"
        );
        String::new()
    })
}

fn routed(kind: &str, what: &str, describe: impl FnOnce() -> String) -> Option<TargetQueue> {
    let target = route(kind);
    if target.is_none() {
        tracing::error!(
            object = %describe(),
            "{} of unexpected object, not recognizable as mesh config - ignoring",
            what
        );
    }
    target
}

fn outcome_logger(action: &'static str, kind: String, key: String) -> ResultLogger {
    Arc::new(move |output: &str, error: Option<&CommandError>| match error {
        Some(e) => tracing::error!(kind = %kind, key = %key, output, error = %e, "failed {}", action),
        None => tracing::info!(kind = %kind, key = %key, "{}", action),
    })
}

/// `apply --kind <kind> -f -` with the object on stdin.
pub fn make_apply(object: &ConfigObject) -> Option<Command> {
    let target = routed(&object.kind, "apply", || object.as_str_lossy())?;
    let key = object_key(&object.kind, &object.raw);
    Some(Command {
        target,
        args: format!("apply --kind {} -f -", object.kind),
        stdin: Some(object.raw.clone()),
        requeue: true,
        logger: outcome_logger("apply", object.kind.clone(), key),
    })
}

/// Delete derived from the raw object body.
pub fn make_delete(object: &ConfigObject) -> Option<Command> {
    let target = routed(&object.kind, "delete", || object.as_str_lossy())?;
    let key = object_key(&object.kind, &object.raw);
    let mut args = format!("delete {} --{} {}", object.kind, kind_flag(&object.kind), key);
    if object.kind == CATALOG_SERVICE {
        let parsed = serde_json::from_slice::<serde_json::Value>(&object.raw).ok();
        let mesh_id = lookup_field(parsed.as_ref(), "mesh_id").unwrap_or_default();
        args.push_str(&format!(" --mesh-id {}", mesh_id));
    }
    Some(Command {
        target,
        args,
        stdin: None,
        requeue: false,
        logger: outcome_logger("delete", object.kind.clone(), key),
    })
}

/// Delete derived from a snapshot ref; catalog entries carry their mesh in `zone`.
pub fn make_delete_by_ref(r: &ConfigObjectRef) -> Option<Command> {
    let target = routed(&r.kind, "delete", || format!("{:?}", r))?;
    let mut args = format!("delete {} --{} {}", r.kind, kind_flag(&r.kind), r.id);
    if r.kind == CATALOG_SERVICE {
        args.push_str(&format!(" --mesh-id {}", r.zone));
    }
    Some(Command {
        target,
        args,
        stdin: None,
        requeue: false,
        logger: outcome_logger("delete", r.kind.clone(), r.id.clone()),
    })
}

async fn send_all(queues: &MeshCommandQueues, commands: impl Iterator<Item = Command>) -> usize {
    let mut sent = 0;
    for command in commands {
        match queues.send(command).await {
            Ok(()) => sent += 1,
            Err(e) => tracing::error!(error = %e, "failed to enqueue command"),
        }
    }
    sent
}

/// Enqueues an apply for every object. Returns how many were enqueued.
pub async fn apply_all(queues: &MeshCommandQueues, objects: &[ConfigObject]) -> usize {
    send_all(queues, objects.iter().filter_map(make_apply)).await
}

/// Enqueues a delete for every raw object.
pub async fn unapply_all(queues: &MeshCommandQueues, objects: &[ConfigObject]) -> usize {
    send_all(queues, objects.iter().filter_map(make_delete)).await
}

/// Enqueues a delete for every ref.
pub async fn delete_all_by_refs(queues: &MeshCommandQueues, refs: &[ConfigObjectRef]) -> usize {
    send_all(queues, refs.iter().filter_map(make_delete_by_ref)).await
}
