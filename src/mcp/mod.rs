use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde_json::Value;

use crate::router::{
    Envelope, ErrorCode, Method, PrNumber, PrNumberParams, Request, RequestRouter,
};

#[derive(Clone)]
pub struct McpServer {
    router: RequestRouter,
    tool_router: ToolRouter<Self>,
}

impl McpServer {
    pub fn new(router: RequestRouter) -> Self {
        Self {
            router,
            tool_router: Self::tool_router(),
        }
    }

    /// Runs one tool call through the request router. Failures are reported
    /// inside the envelope, not as protocol errors.
    async fn call(&self, method: Method, pr_number: PrNumber) -> Result<CallToolResult, McpError> {
        let envelope = match pr_number.into_pr_id() {
            Ok(pr_id) => self.router.dispatch(Request::new(method, pr_id)).await,
            Err(reason) => {
                tracing::warn!("Rejected {:?} call: {}", method, reason);
                Envelope::fail(
                    ErrorCode::InvalidRequest,
                    "Invalid request format",
                    Some(Value::String(reason)),
                )
            }
        };

        let json = serde_json::to_string_pretty(&envelope)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[tool_router]
impl McpServer {
    #[tool(description = "Start reviewing a pull request and get the first changed file with its diff")]
    async fn start_review(
        &self,
        params: Parameters<PrNumberParams>,
    ) -> Result<CallToolResult, McpError> {
        self.call(Method::StartReview, params.0.pr_number).await
    }

    #[tool(description = "Get the next file to review; returns a completion message when none are left")]
    async fn next_review_item(
        &self,
        params: Parameters<PrNumberParams>,
    ) -> Result<CallToolResult, McpError> {
        self.call(Method::NextReviewItem, params.0.pr_number).await
    }

    #[tool(description = "Discard all review progress for a pull request")]
    async fn reset_review(
        &self,
        params: Parameters<PrNumberParams>,
    ) -> Result<CallToolResult, McpError> {
        self.call(Method::ResetReview, params.0.pr_number).await
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Walks a Bitbucket pull request one file at a time: call start_review, \
                 then next_review_item until the review is completed."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(router: RequestRouter) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(router);
    let server = service.serve((stdin(), stdout())).await?;

    let token = server.cancellation_token();
    tokio::spawn(async move {
        crate::shutdown::shutdown_signal().await;
        token.cancel();
    });

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}
