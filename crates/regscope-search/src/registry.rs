//! Tool registry resolved at startup from one or more providers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use regscope_core::context::EnrichedContext;
use regscope_core::jurisdiction::JurisdictionVocabulary;
use regscope_core::ordered::push_unique;
use regscope_core::tool::ToolDescriptor;
use tracing::{info, warn};

use crate::error::SearchError;
use crate::tool::{JurisdictionTool, ToolOutcome};

/// A source of jurisdiction tools (e.g. a remote tool server).
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn discover(&self) -> Result<Vec<Arc<dyn JurisdictionTool>>, SearchError>;
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn JurisdictionTool>>,
    call_timeout: Option<Duration>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query every provider concurrently. Failed providers are logged and
    /// skipped; on name clashes the first provider wins.
    pub async fn discover(providers: &[Arc<dyn ToolProvider>]) -> Self {
        let start = Instant::now();
        let results = join_all(providers.iter().map(|p| async move { (p.name().to_string(), p.discover().await) })).await;

        let mut registry = Self::new();
        for (provider, result) in results {
            match result {
                Ok(tools) => {
                    info!(provider = %provider, count = tools.len(), "discovered tools");
                    for tool in tools {
                        registry.register(tool);
                    }
                }
                Err(e) => warn!(provider = %provider, error = %e, "tool discovery failed"),
            }
        }
        info!(
            tools = registry.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool registry ready"
        );
        registry
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Add a tool. Returns false when a tool with the same name exists.
    pub fn register(&mut self, tool: Arc<dyn JurisdictionTool>) -> bool {
        let name = &tool.descriptor().name;
        if self.tools.iter().any(|t| &t.descriptor().name == name) {
            warn!(tool = %name, "duplicate tool name ignored");
            return false;
        }
        self.tools.push(tool);
        true
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_available_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor().clone()).collect()
    }

    fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.descriptor().name.as_str()).collect()
    }

    /// Jurisdictions covered by registered tools, in registration order.
    pub fn jurisdictions(&self) -> Vec<String> {
        let mut out = Vec::new();
        for tool in &self.tools {
            push_unique(&mut out, &tool.descriptor().jurisdiction);
        }
        out
    }

    /// Register every covered jurisdiction with `vocabulary`.
    pub fn extend_vocabulary(&self, vocabulary: &mut JurisdictionVocabulary) {
        for j in self.jurisdictions() {
            vocabulary.add(&j);
        }
    }

    /// Exact name, then case-insensitive name, then jurisdiction.
    pub fn resolve(&self, name: &str) -> Option<&Arc<dyn JurisdictionTool>> {
        let name = name.trim();
        self.tools
            .iter()
            .find(|t| t.descriptor().name == name)
            .or_else(|| {
                self.tools
                    .iter()
                    .find(|t| t.descriptor().name.eq_ignore_ascii_case(name))
            })
            .or_else(|| {
                self.tools
                    .iter()
                    .find(|t| t.descriptor().jurisdiction.eq_ignore_ascii_case(name))
            })
    }

    /// Invoke a tool by name. Every failure becomes [`ToolOutcome::Error`].
    pub async fn call_tool(
        &self,
        name: &str,
        context: &EnrichedContext,
        focus: Option<&str>,
    ) -> ToolOutcome {
        let Some(tool) = self.resolve(name) else {
            warn!(tool = %name, "unknown tool requested");
            return ToolOutcome::Error(SearchError::UnknownTool(name.to_string()).to_string());
        };
        let descriptor = tool.descriptor();
        let start = Instant::now();

        let result = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, tool.invoke(context, focus)).await {
                Ok(r) => r,
                Err(_) => Err(SearchError::Timeout {
                    tool: descriptor.name.clone(),
                    seconds: limit.as_secs_f64(),
                }),
            },
            None => tool.invoke(context, focus).await,
        };
        let elapsed = start.elapsed();

        match result {
            Ok(finding) => {
                info!(
                    tool = %descriptor.name,
                    jurisdiction = %finding.jurisdiction,
                    compliance_required = finding.compliance_required,
                    risk_level = finding.risk_level,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "tool finding"
                );
                ToolOutcome::Finding(finding.normalized().with_duration(elapsed.as_secs_f64()))
            }
            Err(e) => {
                warn!(tool = %descriptor.name, error = %e, elapsed_ms = elapsed.as_millis() as u64, "tool call failed");
                ToolOutcome::Error(e.to_string())
            }
        }
    }
}
