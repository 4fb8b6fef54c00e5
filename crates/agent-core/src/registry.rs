//! Tool Sessions and Routing
//!
//! A [`ToolSession`] is one live connection to a tool provider. The
//! [`ToolSessionRegistry`] merges the catalogs of every registered session into
//! a single name → descriptor map, routes invocations to the owning session and
//! owns the teardown of every session handed to it.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::FutureExt;

use crate::error::{AgentError, Result};
use crate::tool::{Tool, ToolDescriptor, ToolFailure, ToolInvocation, ToolOutput, ToolResult};

/// One live connection to a tool provider
///
/// The catalog is fixed once the session has completed its handshake.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Session identifier (used in logs and collision reports)
    fn id(&self) -> &str;

    /// Tools this session exposes
    fn catalog(&self) -> &[ToolDescriptor];

    /// Forward one invocation to the provider
    ///
    /// Provider-side failures are returned as `Err(AgentError::ToolProvider(..))`.
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;

    /// Tell the provider that no response is wanted for `invocation_id`
    async fn abandon(&self, _invocation_id: &str) {}

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// In-process tool provider hosting a set of [`Tool`]s
pub struct LocalToolSession {
    id: String,
    catalog: Vec<ToolDescriptor>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl LocalToolSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            catalog: Vec::new(),
            tools: HashMap::new(),
        }
    }

    /// Register a new tool (builder style)
    pub fn with_tool<T: Tool + 'static>(self, tool: T) -> Self {
        self.with_arc_tool(Arc::new(tool))
    }

    /// Register a shared tool (builder style). A later tool with the same name replaces the earlier one.
    pub fn with_arc_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        let descriptor = tool.descriptor();
        self.catalog.retain(|d| d.name != descriptor.name);
        self.tools.insert(descriptor.name.clone(), tool);
        self.catalog.push(descriptor);
        self
    }

    /// Number of hosted tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolSession for LocalToolSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn catalog(&self) -> &[ToolDescriptor] {
        &self.catalog
    }

    async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let tool = self
            .tools
            .get(&invocation.name)
            .ok_or_else(|| AgentError::UnknownTool(invocation.name.clone()))?;
        tool.execute(invocation).await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A registered session plus its close-once flag
struct ManagedSession {
    session: Arc<dyn ToolSession>,
    closed: AtomicBool,
}

impl ManagedSession {
    async fn close_once(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.session.close().await {
            Ok(()) => tracing::debug!(session = %self.session.id(), "Tool session closed"),
            Err(e) => {
                tracing::warn!(session = %self.session.id(), error = %e, "Tool session close failed");
            }
        }
    }
}

/// Routing entry: which session owns a tool
struct Route {
    session: usize,
    descriptor: ToolDescriptor,
}

/// Aggregated namespace over every registered tool session
#[derive(Default)]
pub struct ToolSessionRegistry {
    sessions: Vec<ManagedSession>,
    routes: BTreeMap<String, Route>,
}

impl ToolSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session's catalog to the namespace.
    ///
    /// On `NameCollision` none of the session's tools are routed, but the
    /// session is still owned by the registry and is closed by [`shutdown`](Self::shutdown).
    pub fn register(&mut self, session: Arc<dyn ToolSession>) -> Result<()> {
        let index = self.sessions.len();
        self.sessions.push(ManagedSession {
            session: Arc::clone(&session),
            closed: AtomicBool::new(false),
        });

        let mut seen = BTreeMap::new();
        for descriptor in session.catalog() {
            let owner = self
                .routes
                .get(&descriptor.name)
                .map(|route| self.sessions[route.session].session.id().to_string())
                .or_else(|| seen.get(&descriptor.name).map(|_| session.id().to_string()));
            if let Some(existing) = owner {
                tracing::warn!(
                    tool = %descriptor.name,
                    existing = %existing,
                    rejected = %session.id(),
                    "Rejecting tool session with colliding tool name"
                );
                return Err(AgentError::NameCollision {
                    name: descriptor.name.clone(),
                    existing,
                    rejected: session.id().to_string(),
                });
            }
            seen.insert(descriptor.name.clone(), descriptor.clone());
        }

        for (name, descriptor) in seen {
            self.routes.insert(
                name,
                Route {
                    session: index,
                    descriptor,
                },
            );
        }

        tracing::info!(
            session = %session.id(),
            tools = session.catalog().len(),
            "Registered tool session"
        );
        Ok(())
    }

    /// Merged catalog, ordered by tool name
    pub fn catalog(&self) -> Vec<ToolDescriptor> {
        self.routes.values().map(|r| r.descriptor.clone()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    /// Number of routed tools
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Validate and route one invocation. Never fails: every problem becomes a failed [`ToolResult`].
    pub async fn invoke(&self, invocation: &ToolInvocation) -> ToolResult {
        let Some(route) = self.routes.get(&invocation.name) else {
            tracing::debug!(tool = %invocation.name, "Unknown tool requested");
            return ToolResult::failure(
                invocation,
                ToolFailure::UnknownTool,
                AgentError::UnknownTool(invocation.name.clone()).to_string(),
            );
        };

        if let Err(reason) = route.descriptor.validate(&invocation.arguments) {
            tracing::debug!(tool = %invocation.name, %reason, "Invalid tool arguments");
            return ToolResult::failure(
                invocation,
                ToolFailure::InvalidArguments,
                AgentError::InvalidArguments {
                    tool: invocation.name.clone(),
                    reason,
                }
                .to_string(),
            );
        }

        let managed = &self.sessions[route.session];
        if managed.closed.load(Ordering::Acquire) {
            return ToolResult::failure(
                invocation,
                ToolFailure::ProviderFailure,
                format!("Tool session '{}' is closed", managed.session.id()),
            );
        }

        tracing::debug!(tool = %invocation.name, session = %managed.session.id(), "Executing tool");
        match managed.session.invoke(invocation).await {
            Ok(output) => ToolResult::success(invocation, output),
            Err(AgentError::UnknownTool(name)) => ToolResult::failure(
                invocation,
                ToolFailure::UnknownTool,
                AgentError::UnknownTool(name).to_string(),
            ),
            Err(e @ AgentError::InvalidArguments { .. }) => {
                ToolResult::failure(invocation, ToolFailure::InvalidArguments, e.to_string())
            }
            Err(e) => {
                tracing::warn!(tool = %invocation.name, error = %e, "Tool invocation failed");
                ToolResult::failure(invocation, ToolFailure::ProviderFailure, e.to_string())
            }
        }
    }

    /// Notify the owning session that an invocation's result is no longer wanted
    pub async fn abandon(&self, invocation: &ToolInvocation) {
        if let Some(route) = self.routes.get(&invocation.name) {
            let managed = &self.sessions[route.session];
            tracing::debug!(tool = %invocation.name, id = %invocation.id, "Abandoning invocation");
            managed.session.abandon(&invocation.id).await;
        }
    }

    /// Close every session exactly once. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        futures::future::join_all(self.sessions.iter().map(ManagedSession::close_once)).await;
    }

    /// Number of sessions not yet closed
    pub fn open_sessions(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| !s.closed.load(Ordering::Acquire))
            .count()
    }

    /// Run `body`, then close every session on every exit path, including panics.
    pub async fn scoped<F, T>(&self, body: F) -> T
    where
        F: Future<Output = T>,
    {
        let outcome = AssertUnwindSafe(body).catch_unwind().await;
        self.shutdown().await;
        match outcome {
            Ok(value) => value,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Drop for ToolSessionRegistry {
    fn drop(&mut self) {
        let open = self.open_sessions();
        if open > 0 {
            tracing::warn!(open, "Tool session registry dropped without shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ParameterSchema, ToolCallRequest};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Session with a fixed catalog that echoes invocations and counts closes
    struct CountingSession {
        id: String,
        catalog: Vec<ToolDescriptor>,
        calls: AtomicUsize,
        closes: AtomicUsize,
        fail_with: Option<String>,
    }

    impl CountingSession {
        fn new(id: &str, tools: &[&str]) -> Self {
            Self {
                id: id.into(),
                catalog: tools
                    .iter()
                    .map(|name| ToolDescriptor {
                        name: (*name).into(),
                        description: format!("{name} tool"),
                        parameters: vec![ParameterSchema::required("title", "string", "Title")],
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                fail_with: None,
            }
        }
    }

    #[async_trait]
    impl ToolSession for CountingSession {
        fn id(&self) -> &str {
            &self.id
        }

        fn catalog(&self) -> &[ToolDescriptor] {
            &self.catalog
        }

        async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match &self.fail_with {
                Some(msg) => Err(AgentError::ToolProvider(msg.clone())),
                None => Ok(ToolOutput::text(format!("{} call #{n}", invocation.name))),
            }
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn inner_fault() -> bool {
        true
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolInvocation {
        ToolInvocation::new(
            ToolCallRequest {
                name: name.into(),
                arguments,
            },
            0,
        )
    }

    #[test]
    fn test_registration_order_independent() {
        let mut ab = ToolSessionRegistry::new();
        ab.register(Arc::new(CountingSession::new("a", &["list", "add"]))).unwrap();
        ab.register(Arc::new(CountingSession::new("b", &["delete"]))).unwrap();

        let mut ba = ToolSessionRegistry::new();
        ba.register(Arc::new(CountingSession::new("b", &["delete"]))).unwrap();
        ba.register(Arc::new(CountingSession::new("a", &["list", "add"]))).unwrap();

        assert_eq!(ab.catalog(), ba.catalog());
        assert_eq!(ab.names(), vec!["add", "delete", "list"]);
    }

    #[tokio::test]
    async fn test_collision_rejects_whole_session() {
        let mut registry = ToolSessionRegistry::new();
        registry.register(Arc::new(CountingSession::new("a", &["add"]))).unwrap();

        let rejected = Arc::new(CountingSession::new("b", &["remove", "add"]));
        let err = registry.register(rejected.clone()).unwrap_err();
        assert!(matches!(err, AgentError::NameCollision { ref name, .. } if name == "add"));
        assert_eq!(registry.names(), vec!["add"]);

        // The rejected session is still torn down.
        registry.shutdown().await;
        assert_eq!(rejected.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_name_within_one_session_collides() {
        let mut registry = ToolSessionRegistry::new();
        let err = registry
            .register(Arc::new(CountingSession::new("a", &["add", "add"])))
            .unwrap_err();
        assert!(matches!(err, AgentError::NameCollision { .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_invoke_failures_become_results() {
        let mut registry = ToolSessionRegistry::new();
        let mut failing = CountingSession::new("tasks", &["add"]);
        failing.fail_with = Some("Login failed.".into());
        registry.register(Arc::new(failing)).unwrap();

        let unknown = registry.invoke(&call("nope", json!({}))).await;
        assert_eq!(unknown.failure, Some(ToolFailure::UnknownTool));

        let invalid = registry.invoke(&call("add", json!({"title": 1}))).await;
        assert_eq!(invalid.failure, Some(ToolFailure::InvalidArguments));

        let provider = registry.invoke(&call("add", json!({"title": "x"}))).await;
        assert_eq!(provider.failure, Some(ToolFailure::ProviderFailure));
        assert!(provider.output.contains("Login failed."));

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_invocations_are_never_deduplicated() {
        let mut registry = ToolSessionRegistry::new();
        let session = Arc::new(CountingSession::new("a", &["add"]));
        registry.register(session.clone()).unwrap();

        let first = registry.invoke(&call("add", json!({"title": "x"}))).await;
        let second = registry.invoke(&call("add", json!({"title": "x"}))).await;

        assert_ne!(first.invocation_id, second.invocation_id);
        assert_eq!(first.output, "add call #1");
        assert_eq!(second.output, "add call #2");
        assert_eq!(session.calls.load(Ordering::SeqCst), 2);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_each_session_once() {
        let a = Arc::new(CountingSession::new("a", &["x"]));
        let b = Arc::new(CountingSession::new("b", &["y"]));
        let mut registry = ToolSessionRegistry::new();
        registry.register(a.clone()).unwrap();
        registry.register(b.clone()).unwrap();

        registry.shutdown().await;
        registry.shutdown().await;

        assert_eq!(a.closes.load(Ordering::SeqCst), 1);
        assert_eq!(b.closes.load(Ordering::SeqCst), 1);
        assert_eq!(registry.open_sessions(), 0);

        let after = registry.invoke(&call("x", json!({"title": "t"}))).await;
        assert_eq!(after.failure, Some(ToolFailure::ProviderFailure));
    }

    #[tokio::test]
    async fn test_scoped_closes_on_panic() {
        let a = Arc::new(CountingSession::new("a", &["x"]));
        let mut registry = ToolSessionRegistry::new();
        registry.register(a.clone()).unwrap();
        let registry = Arc::new(registry);

        let inner = Arc::clone(&registry);
        let handle = tokio::spawn(async move {
            inner
                .scoped(async {
                    if inner_fault() {
                        panic!("fault elsewhere in the engine");
                    }
                })
                .await;
        });

        assert!(handle.await.is_err());
        assert_eq!(a.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_local_session_routes_to_tool() {
        struct Echo;

        #[async_trait]
        impl Tool for Echo {
            fn descriptor(&self) -> ToolDescriptor {
                ToolDescriptor {
                    name: "echo".into(),
                    description: "Echo the title".into(),
                    parameters: vec![ParameterSchema::required("title", "string", "Title")],
                }
            }

            async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
                Ok(ToolOutput::text(invocation.str_arg("title").unwrap_or_default()))
            }
        }

        let session = LocalToolSession::new("local").with_tool(Echo);
        assert_eq!(session.len(), 1);

        let mut registry = ToolSessionRegistry::new();
        registry.register(Arc::new(session)).unwrap();

        let result = registry.invoke(&call("echo", json!({"title": "Groceries"}))).await;
        assert!(result.is_success());
        assert_eq!(result.output, "Groceries");

        registry.shutdown().await;
    }
}
