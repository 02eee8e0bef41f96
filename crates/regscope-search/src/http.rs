//! HTTP tool server client.
//!
//! `GET {base}/tools` lists descriptors; `POST {base}/tools/{name}/call`
//! runs one tool with [`ToolArguments`] as the JSON body.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regscope_core::context::EnrichedContext;
use regscope_core::finding::JurisdictionFinding;
use regscope_core::tool::ToolDescriptor;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::SearchError;
use crate::registry::ToolProvider;
use crate::tool::{JurisdictionTool, ToolArguments, parse_finding};

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolListing {
    Bare(Vec<ToolDescriptor>),
    Wrapped { tools: Vec<ToolDescriptor> },
}

impl ToolListing {
    fn into_descriptors(self) -> Vec<ToolDescriptor> {
        match self {
            Self::Bare(tools) | Self::Wrapped { tools } => tools,
        }
    }
}

/// Discovers tools from one tool server.
pub struct HttpToolProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpToolProvider {
    /// `base_url` is like `http://localhost:8010` (trailing slash optional).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, SearchError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn tools_url(&self) -> String {
        format!("{}/tools", self.base_url)
    }

    /// `{base}/tools/{name}/call` with the tool name percent-encoded as one
    /// path segment.
    fn call_url(&self, tool: &str) -> Result<Url, SearchError> {
        let invalid = |message: String| SearchError::Discovery {
            provider: self.base_url.clone(),
            message,
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["tools", tool, "call"]);
        Ok(url)
    }
}

#[async_trait]
impl ToolProvider for HttpToolProvider {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn discover(&self) -> Result<Vec<Arc<dyn JurisdictionTool>>, SearchError> {
        let url = self.tools_url();
        info!(url = %url, "discovering tools");
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let listing: ToolListing = resp.json().await?;
        listing
            .into_descriptors()
            .into_iter()
            .map(|descriptor| {
                Ok(Arc::new(HttpTool {
                    client: self.client.clone(),
                    call_url: self.call_url(&descriptor.name)?,
                    descriptor,
                }) as Arc<dyn JurisdictionTool>)
            })
            .collect()
    }
}

/// One remote tool.
pub struct HttpTool {
    client: reqwest::Client,
    call_url: Url,
    descriptor: ToolDescriptor,
}

#[async_trait]
impl JurisdictionTool for HttpTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        context: &EnrichedContext,
        focus: Option<&str>,
    ) -> Result<JurisdictionFinding, SearchError> {
        let args = ToolArguments::new(context, focus);
        debug!(url = %self.call_url, tool = %self.descriptor.name, "calling tool");
        let resp = self.client.post(self.call_url.clone()).json(&args).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let payload: Value = resp.json().await?;
        parse_finding(payload, &self.descriptor)
    }
}
