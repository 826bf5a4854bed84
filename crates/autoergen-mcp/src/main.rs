use std::sync::Arc;

use autoergen_core::{schema, Diagram, GraphvizEngine, ImageFormat, RenderError, Settings};
use autoergen_suggest::{parse, Architect, GenerateError};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DescribeRequest {
    /// Natural-language description of the database, e.g. "Customers place Orders; Orders contain Products"
    description: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SpecRequest {
    /// ER specification as a JSON string: {"entities": ["A", "B"], "relationships": [{"from": "A", "to": "B", "relation": "has"}]}
    spec: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RenderRequest {
    /// Graphviz DOT source to render
    dot: String,
    /// Output format: "svg" (default), "png" or "pdf"
    format: Option<String>,
}

// --- Server ---

#[derive(Clone)]
pub struct AutoErgenServer {
    architect: Arc<Architect>,
    settings: Arc<Settings>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl AutoErgenServer {
    pub fn new(architect: Architect, settings: Settings) -> Self {
        Self {
            architect: Arc::new(architect),
            settings: Arc::new(settings),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Generate an ER diagram as Graphviz DOT directly from a natural-language database description. The model writes the DOT; it is returned without syntax checks, so pass it to render_diagram to validate and draw it."
    )]
    async fn generate_diagram(
        &self,
        Parameters(req): Parameters<DescribeRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.architect.draft_markup(&req.description).await {
            Ok(draft) => Ok(CallToolResult::success(vec![Content::text(draft.dot)])),
            Err(e) => Ok(generation_error(e)),
        }
    }

    #[tool(
        description = "Extract entities and relationships from a natural-language database description. Returns JSON {entities, relationships, dot, sql, warning?}. If the model's answer cannot be parsed, entities and relationships are empty and warning explains why."
    )]
    async fn extract_er(
        &self,
        Parameters(req): Parameters<DescribeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let draft = match self.architect.draft_er(&req.description).await {
            Ok(draft) => draft,
            Err(e) => return Ok(generation_error(e)),
        };

        let mut body = serde_json::json!({
            "entities": draft.spec.entities(),
            "relationships": draft.spec.relationships(),
            "dot": draft.dot(self.architect.style()),
            "sql": draft.sql(),
        });
        if let Some(err) = &draft.parse_error {
            body["warning"] = serde_json::Value::String(err.to_string());
        }
        let dangling = draft.spec.dangling_endpoints();
        if !dangling.is_empty() {
            body["danglingEndpoints"] = serde_json::json!(dangling);
        }
        Ok(CallToolResult::success(vec![Content::text(pretty(&body))]))
    }

    #[tool(description = "Convert an ER specification (JSON string) into Graphviz DOT")]
    fn diagram_from_spec(
        &self,
        Parameters(req): Parameters<SpecRequest>,
    ) -> Result<CallToolResult, McpError> {
        match parse::parse_er_spec(&req.spec) {
            Ok(spec) => {
                let dot = Diagram::from_spec(&spec).to_dot(&self.settings.diagram);
                Ok(CallToolResult::success(vec![Content::text(dot)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Convert an ER specification (JSON string) into placeholder SQL: one CREATE TABLE per entity, then one ALTER TABLE per relationship"
    )]
    fn synthesize_schema(
        &self,
        Parameters(req): Parameters<SpecRequest>,
    ) -> Result<CallToolResult, McpError> {
        match parse::parse_er_spec(&req.spec) {
            Ok(spec) => Ok(CallToolResult::success(vec![Content::text(
                schema::synthesize(&spec),
            )])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Render Graphviz DOT with the local `dot` engine. SVG is returned as text, PNG as an image, PDF as base64 text. Malformed DOT returns the engine's error message."
    )]
    async fn render_diagram(
        &self,
        Parameters(req): Parameters<RenderRequest>,
    ) -> Result<CallToolResult, McpError> {
        let format = match req.format.as_deref().map(str::parse::<ImageFormat>) {
            None => ImageFormat::Svg,
            Some(Ok(f)) => f,
            Some(Err(e)) => return Ok(CallToolResult::error(vec![Content::text(e)])),
        };
        let engine = match GraphvizEngine::locate(self.settings.graphviz_path.as_deref()) {
            Ok(engine) => engine,
            Err(e) => return Ok(render_error(e)),
        };

        let rendered = tokio::task::spawn_blocking(move || engine.render(&req.dot, format))
            .await
            .map_err(|e| McpError::internal_error(format!("render task failed: {e}"), None))?;

        match rendered {
            Ok(bytes) => Ok(CallToolResult::success(vec![render_content(bytes, format)])),
            Err(e) => Ok(render_error(e)),
        }
    }
}

#[tool_handler]
impl ServerHandler for AutoErgenServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn generation_error(e: GenerateError) -> CallToolResult {
    let text = match e {
        GenerateError::Empty => "The model returned an empty response. Try again.".to_string(),
        other => other.to_string(),
    };
    CallToolResult::error(vec![Content::text(text)])
}

fn render_error(e: RenderError) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!("Graphviz rendering error: {e}"))])
}

fn render_content(bytes: Vec<u8>, format: ImageFormat) -> Content {
    use base64::Engine;

    match format {
        ImageFormat::Svg => Content::text(String::from_utf8_lossy(&bytes).into_owned()),
        ImageFormat::Png => Content::image(
            base64::engine::general_purpose::STANDARD.encode(&bytes),
            "image/png",
        ),
        ImageFormat::Pdf => Content::text(base64::engine::general_purpose::STANDARD.encode(&bytes)),
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("Serialization error: {e}"))
}

const INSTRUCTIONS: &str = r#"autoergen turns natural-language database descriptions into entity-relationship diagrams.

## Tools
- `extract_er`: description → {entities, relationships, dot, sql}. Preferred: the structure is validated and the DOT and SQL are derived locally.
- `generate_diagram`: description → DOT written directly by the model. Not validated; render it to check.
- `diagram_from_spec` / `synthesize_schema`: edit the entities/relationships JSON yourself and regenerate the DOT or SQL without calling the model.
- `render_diagram`: DOT → SVG/PNG/PDF via the local Graphviz `dot` binary.

## ER specification
`{"entities": ["Customer", "Order"], "relationships": [{"from": "Customer", "to": "Order", "relation": "places"}]}`
Entity names are unique. Relationship endpoints should name declared entities; undeclared endpoints are drawn anyway and reported as `danglingEndpoints`.

## SQL
The SQL is a placeholder: every table gets `id` and `name`, every relationship adds `<target>_id` to the source table."#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    autoergen_core::logging::init_tracing("autoergen-mcp");

    let settings = Settings::load(&autoergen_core::data_dir())?;
    if !settings.ai_configured() {
        tracing::warn!(provider = %settings.provider, "no API key configured; generation tools will fail");
    }
    let architect = Architect::from_settings(&settings)?;

    let service = AutoErgenServer::new(architect, settings)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "MCP server error"))?;
    service.waiting().await?;
    Ok(())
}
