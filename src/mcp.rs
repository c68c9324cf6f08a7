//! MCP protocol bridge.
//!
//! Adapts the [`ToolRegistry`] and [`RagService`] to rmcp's
//! [`ServerHandler`], so any MCP client can talk to the server over stdio
//! or streamable HTTP.
//!
//! * **Tools** come from the registry via `list_tools` / `call_tool`.
//! * **Prompts**: `rag_analysis_prompt(topic)`.
//! * **Resources**: `rag://status`, the same JSON as `get_rag_status`.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};

use crate::service::RagService;
use crate::tools::{ToolContext, ToolRegistry};

pub const ANALYSIS_PROMPT: &str = "rag_analysis_prompt";
pub const STATUS_RESOURCE_URI: &str = "rag://status";

/// Each MCP session receives a clone; everything is behind `Arc`.
#[derive(Clone)]
pub struct McpBridge {
    service: Arc<RagService>,
    tools: Arc<ToolRegistry>,
}

impl McpBridge {
    pub fn new(service: Arc<RagService>, tools: Arc<ToolRegistry>) -> Self {
        Self { service, tools }
    }

    fn to_mcp_tool(tool: &dyn crate::tools::Tool) -> Tool {
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> =
            match tool.parameters_schema() {
                serde_json::Value::Object(map) => Arc::new(map),
                _ => Arc::new(serde_json::Map::new()),
            };

        let annotations = if tool.is_read_only() {
            ToolAnnotations::new().read_only(true)
        } else {
            ToolAnnotations::new()
                .read_only(false)
                .destructive(tool.is_destructive())
        };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(annotations),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    fn analysis_prompt_descriptor() -> Prompt {
        Prompt {
            name: ANALYSIS_PROMPT.to_string(),
            title: None,
            description: Some(
                "Guide an in-depth analysis of the ingested documents on a topic: query the \
                 knowledge base, then summarize, surface insights, suggest further \
                 investigation and cite sources."
                    .to_string(),
            ),
            arguments: Some(vec![PromptArgument {
                name: "topic".to_string(),
                title: None,
                description: Some("Subject to analyze".to_string()),
                required: Some(true),
            }]),
            icons: None,
            meta: None,
        }
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "rag-server".to_string(),
                title: Some("RAG Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Local document retrieval. Use query_documents to search ingested documents, \
                 list_ingested_files to see what is indexed, ingest_file to add a file, and \
                 reingest_data_directory after the data directory changes. get_rag_status \
                 explains configuration problems."
                    .to_string(),
            ),
        }
    }

    // ── Tools ────────────────────────────────────────────────────────────

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(&request.name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            )
        })?;

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        tracing::debug!(tool = %request.name, "tool call");
        let ctx = ToolContext::new(Arc::clone(&self.service));
        match tool.execute(params, &ctx).await {
            Ok(serde_json::Value::String(text)) => {
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    // ── Prompts ──────────────────────────────────────────────────────────

    fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListPromptsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListPromptsResult::with_all_items(vec![
            Self::analysis_prompt_descriptor(),
        ])))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        if request.name != ANALYSIS_PROMPT {
            return Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no prompt registered with name: {}", request.name),
                None,
            ));
        }

        let topic = request
            .arguments
            .as_ref()
            .and_then(|args| args.get("topic"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                McpError::new(
                    ErrorCode::INVALID_PARAMS,
                    "missing required argument: topic".to_string(),
                    None,
                )
            })?;

        Ok(GetPromptResult {
            description: Some(format!("Analysis of documents related to '{}'", topic)),
            messages: vec![PromptMessage::new_text(
                PromptMessageRole::User,
                self.service.analysis_prompt(topic),
            )],
        })
    }

    // ── Resources ────────────────────────────────────────────────────────

    fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        let mut status = RawResource::new(STATUS_RESOURCE_URI, "rag-status");
        status.description = Some("Current status of the RAG system".to_string());
        status.mime_type = Some("application/json".to_string());
        std::future::ready(Ok(ListResourcesResult::with_all_items(vec![
            status.no_annotation(),
        ])))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        if request.uri != STATUS_RESOURCE_URI {
            return Err(McpError::resource_not_found(
                format!("unknown resource: {}", request.uri),
                None,
            ));
        }
        let status = self.service.get_status().await;
        let text = serde_json::to_string_pretty(&status).unwrap_or_default();
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, STATUS_RESOURCE_URI)],
        })
    }
}
