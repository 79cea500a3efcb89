//! Tool Registry.
//!
//! Registers `ToolModule`s, computes fully-qualified tool names, and
//! resolves a name (possibly namespaced) to a handler. Registrations and
//! unregistrations are serialized; reads are concurrency-safe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

/// A named, schema-validated capability exposed by a `ToolModule`.
/// The core never inspects what a tool does.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    /// Fully-qualified name (`<namespace>.<tool_name>`, or bare for
    /// legacy root-namespace tools).
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub version: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capability_tags: Vec<String>,
}

/// Outcome of a tool call, distinguishing a declared tool-side failure
/// from the generic "uncaught" bucket the dispatcher maps to -32603.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
    pub details: Option<Value>,
}

impl ToolError {
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into(), details: None }
    }
}

/// Context passed into every tool call.
#[derive(Clone)]
pub struct ToolContext {
    pub request_id: String,
    pub deadline: std::time::Instant,
    pub cancel: crate::dispatch::CancelToken,
}

/// The interface the core consumes but never implements.
#[async_trait]
pub trait ToolModule: Send + Sync {
    /// Namespace this module registers under (e.g. `"fs"`, `"http"`).
    /// Modules that opt out of prefixing return `""` and register their
    /// tools into the root namespace (legacy basic tools).
    fn namespace(&self) -> &str;

    fn list(&self) -> Vec<ToolDefinition>;

    async fn call(
        &self,
        tool_name: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError>;

    /// Release any resources held by the module. Called once during
    /// graceful shutdown; must be idempotent-safe to call at most once.
    async fn shutdown(&self) {}
}

/// Returned by `register`; the sole handle through which a caller can
/// `unregister` everything it registered atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationHandle(u64);

#[derive(thiserror::Error, Debug)]
pub enum ConflictError {
    #[error("tool '{0}' is already registered")]
    DuplicateName(String),
    #[error("legacy tool name '{0}' is ambiguous with an existing namespaced tool")]
    AmbiguousLegacyName(String),
}

struct Registered {
    module: Arc<dyn ToolModule>,
    fq_names: Vec<String>,
}

/// What `resolve` hands back to the dispatcher: the module to call, the
/// tool's bare name within that module, and its input schema for
/// argument validation before the call is made.
#[derive(Clone)]
pub struct ResolvedTool {
    pub module: Arc<dyn ToolModule>,
    pub bare_name: String,
    pub input_schema: Value,
}

/// `^[A-Za-z_][A-Za-z0-9_.-]*$`
fn is_valid_tool_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Registry of live `ToolModule`s and the fully-qualified names they
/// expose. The only mutable shared state here besides the connection
/// registry; reads are lock-free snapshots, writes are serialized.
pub struct ToolRegistry {
    inner: RwLock<HashMap<RegistrationHandle, Registered>>,
    /// name -> resolved tool, kept in sync with `inner` under the same
    /// write lock for O(1) `resolve`.
    index: RwLock<HashMap<String, ResolvedTool>>,
    next_handle: AtomicU64,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()), index: RwLock::new(HashMap::new()), next_handle: AtomicU64::new(1) }
    }

    /// Register a module's tools. Fully-qualified name is
    /// `<namespace>.<tool_name>` unless the module's namespace is empty,
    /// in which case the tool registers bare into the root namespace.
    pub async fn register(
        &self,
        module: Arc<dyn ToolModule>,
    ) -> Result<RegistrationHandle, ConflictError> {
        let definitions = module.list();
        let namespace = module.namespace().to_string();

        let mut fq_names = Vec::with_capacity(definitions.len());
        for def in &definitions {
            if !is_valid_tool_name(&def.name) {
                return Err(ConflictError::DuplicateName(def.name.clone()));
            }
            let fq = if namespace.is_empty() {
                def.name.clone()
            } else {
                format!("{namespace}.{}", def.name)
            };
            fq_names.push((fq, def.name.clone(), def.input_schema.clone()));
        }

        let mut index = self.index.write().await;
        for (fq, _, _) in &fq_names {
            if index.contains_key(fq) {
                return Err(ConflictError::DuplicateName(fq.clone()));
            }
            // A bare legacy name cannot coexist with a dotted name whose
            // tool segment would collide on root-namespace resolution.
            if !namespace.is_empty() && index.contains_key(fq.rsplit('.').next().unwrap_or(fq)) {
                return Err(ConflictError::AmbiguousLegacyName(fq.clone()));
            }
        }

        let handle = RegistrationHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let mut names_only = Vec::with_capacity(fq_names.len());
        for (fq, bare_name, input_schema) in fq_names {
            index.insert(fq.clone(), ResolvedTool { module: Arc::clone(&module), bare_name, input_schema });
            names_only.push(fq);
        }
        drop(index);

        self.inner.write().await.insert(handle, Registered { module, fq_names: names_only });
        Ok(handle)
    }

    /// Remove everything registered under `handle`, atomically, and run
    /// the module's `shutdown` hook.
    pub async fn unregister(&self, handle: RegistrationHandle) {
        let removed = self.inner.write().await.remove(&handle);
        if let Some(registered) = removed {
            let mut index = self.index.write().await;
            for name in &registered.fq_names {
                index.remove(name);
            }
            drop(index);
            registered.module.shutdown().await;
        }
    }

    /// Snapshot of every registered tool definition.
    pub async fn list(&self) -> Vec<ToolDefinition> {
        let inner = self.inner.read().await;
        inner.values().flat_map(|r| r.module.list()).collect()
    }

    /// Resolve a (possibly namespaced) name. Exact match first; if the
    /// name has no dot and isn't found, legacy root-namespace resolution
    /// is already covered by the exact-match index (legacy tools register
    /// bare), so no second lookup pass is needed.
    pub async fn resolve(&self, name: &str) -> Option<ResolvedTool> {
        self.index.read().await.get(name).cloned()
    }

    pub async fn tool_count(&self) -> usize {
        self.index.read().await.len()
    }
}
