use actix_cors::Cors;
use actix_web::{
    delete, get, patch, post, put, web, App, HttpResponse, HttpServer, Responder,
    Result as ActixResult,
};
use actix_ws::Message;
use mediacore::{
    Connection, Node, NodeId, NodeKind, NodeUpdate, Position, RunId, Value, Workflow,
    WorkflowError,
};
use mediaruntime::{FlowRuntime, RuntimeConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Application state shared across handlers
struct AppState {
    runtime: Arc<FlowRuntime>,
}

/// Request body for adding a node
#[derive(Debug, Deserialize)]
struct CreateNodeRequest {
    kind: NodeKind,
    #[serde(default)]
    id: Option<NodeId>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    position: Option<Position>,
}

impl CreateNodeRequest {
    fn into_node(self) -> Node {
        let mut node = match self.id {
            Some(id) => Node::with_id(id, self.kind),
            None => Node::new(self.kind),
        };
        if let Some(label) = self.label {
            node.label = label;
        }
        node.value = self.value;
        node.output = self.output;
        node.position = self.position;
        node
    }
}

/// Request body for a partial run
#[derive(Debug, Deserialize)]
struct PartialRunRequest {
    node_ids: Vec<NodeId>,
}

/// Response for edge creation
#[derive(Debug, Serialize)]
struct EdgeResponse {
    id: String,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn workflow_error(err: WorkflowError) -> HttpResponse {
    let body = ErrorResponse {
        error: err.to_string(),
    };
    match err {
        WorkflowError::NodeNotFound(_) | WorkflowError::EdgeNotFound(_) => {
            HttpResponse::NotFound().json(body)
        }
        WorkflowError::DuplicateNode(_)
        | WorkflowError::DuplicateEdge { .. }
        | WorkflowError::RunInProgress => HttpResponse::Conflict().json(body),
        WorkflowError::InvalidConnection(_) | WorkflowError::CyclicDependency(_) => {
            HttpResponse::UnprocessableEntity().json(body)
        }
    }
}

fn already_running() -> HttpResponse {
    HttpResponse::Conflict().json(ErrorResponse {
        error: "A run is already in progress".to_string(),
    })
}

/// Health check endpoint
#[get("/health")]
async fn health_check(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "mediaflow",
        "running": data.runtime.is_running(),
    }))
}

/// Current graph with node status and outputs
#[get("/api/workflow")]
async fn get_workflow(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(data.runtime.workflow().await))
}

/// Replace the whole graph
#[put("/api/workflow")]
async fn replace_workflow(
    data: web::Data<AppState>,
    workflow: web::Json<Workflow>,
) -> ActixResult<impl Responder> {
    let workflow = workflow.into_inner();
    let id = workflow.id;

    match data.runtime.load_workflow(workflow).await {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({ "id": id }))),
        Err(e) => Ok(HttpResponse::Conflict().json(ErrorResponse {
            error: e.to_string(),
        })),
    }
}

#[post("/api/nodes")]
async fn create_node(
    data: web::Data<AppState>,
    req: web::Json<CreateNodeRequest>,
) -> ActixResult<impl Responder> {
    let node = req.into_inner().into_node();
    info!("Adding {} node {}", node.kind, node.id);

    match data.runtime.add_node(node.clone()).await {
        Ok(_) => Ok(HttpResponse::Created().json(node)),
        Err(e) => Ok(workflow_error(e)),
    }
}

#[patch("/api/nodes/{id}")]
async fn update_node(
    data: web::Data<AppState>,
    path: web::Path<NodeId>,
    update: web::Json<NodeUpdate>,
) -> ActixResult<impl Responder> {
    match data.runtime.update_node(&path, update.into_inner()).await {
        Ok(node) => Ok(HttpResponse::Ok().json(node)),
        Err(e) => Ok(workflow_error(e)),
    }
}

/// Delete a node and every edge touching it
#[delete("/api/nodes/{id}")]
async fn delete_node(data: web::Data<AppState>, path: web::Path<NodeId>) -> ActixResult<impl Responder> {
    match data.runtime.remove_node(&path).await {
        Ok(node) => {
            info!("Deleted node: {}", node.id);
            Ok(HttpResponse::Ok().json(node))
        }
        Err(e) => Ok(workflow_error(e)),
    }
}

/// Add an edge; rejected with 422 when the connection rules forbid it
#[post("/api/edges")]
async fn create_edge(
    data: web::Data<AppState>,
    connection: web::Json<Connection>,
) -> ActixResult<impl Responder> {
    match data.runtime.add_edge(connection.into_inner()).await {
        Ok(id) => Ok(HttpResponse::Created().json(EdgeResponse { id })),
        Err(e) => {
            warn!("Rejected connection: {}", e);
            Ok(workflow_error(e))
        }
    }
}

#[delete("/api/edges/{id}")]
async fn delete_edge(data: web::Data<AppState>, path: web::Path<String>) -> ActixResult<impl Responder> {
    match data.runtime.remove_edge(&path).await {
        Ok(edge) => Ok(HttpResponse::Ok().json(edge)),
        Err(e) => Ok(workflow_error(e)),
    }
}

/// Run every terminal node
#[post("/api/run")]
async fn run_workflow(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    match data.runtime.run_workflow().await {
        Some(run) => Ok(HttpResponse::Ok().json(run)),
        None => Ok(already_running()),
    }
}

#[post("/api/run/partial")]
async fn run_partial(
    data: web::Data<AppState>,
    req: web::Json<PartialRunRequest>,
) -> ActixResult<impl Responder> {
    match data.runtime.run_nodes(req.into_inner().node_ids).await {
        Some(run) => Ok(HttpResponse::Ok().json(run)),
        None => Ok(already_running()),
    }
}

#[post("/api/nodes/{id}/run")]
async fn run_single(data: web::Data<AppState>, path: web::Path<NodeId>) -> ActixResult<impl Responder> {
    match data.runtime.run_node(path.into_inner()).await {
        Some(run) => Ok(HttpResponse::Ok().json(run)),
        None => Ok(already_running()),
    }
}

/// Clear every node's status and error, keeping outputs
#[post("/api/reset")]
async fn reset_workflow(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    data.runtime.reset().await;
    Ok(HttpResponse::Ok().json(data.runtime.workflow().await))
}

/// Past runs, most recent first
#[get("/api/history")]
async fn list_history(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(data.runtime.history().await))
}

#[get("/api/history/{id}")]
async fn get_run(data: web::Data<AppState>, path: web::Path<RunId>) -> ActixResult<impl Responder> {
    let run_id = path.into_inner();
    match data.runtime.run_record(run_id).await {
        Some(run) => Ok(HttpResponse::Ok().json(run)),
        None => Ok(HttpResponse::NotFound().json(ErrorResponse {
            error: format!("Run {} not found", run_id),
        })),
    }
}

/// List available node kinds
#[get("/api/node-kinds")]
async fn list_node_kinds(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(data.runtime.capabilities().catalog()))
}

/// WebSocket endpoint for real-time events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.runtime.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("WebSocket client lagging, skipped {} events", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(get_workflow)
        .service(replace_workflow)
        .service(create_node)
        .service(update_node)
        .service(delete_node)
        .service(create_edge)
        .service(delete_edge)
        .service(run_workflow)
        .service(run_partial)
        .service(run_single)
        .service(reset_workflow)
        .service(list_history)
        .service(get_run)
        .service(list_node_kinds)
        .service(websocket_events);
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Workflow from `WORKFLOW_FILE`, or the sample graph.
fn initial_workflow() -> anyhow::Result<Workflow> {
    match std::env::var("WORKFLOW_FILE") {
        Ok(path) => Ok(Workflow::load(path)?),
        Err(_) => Ok(medianodes::product_marketing_kit()?),
    }
}

fn runtime_config() -> anyhow::Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();
    if let Ok(ms) = std::env::var("SIMULATED_LATENCY_MS") {
        config.simulated_latency = Duration::from_millis(ms.parse()?);
    }
    Ok(config)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting media flow server");

    let registry = if env_flag("MEDIAFLOW_OFFLINE") {
        medianodes::offline_registry()
    } else {
        medianodes::gemini_registry()
    };

    let workflow = initial_workflow()?;
    info!("Loaded workflow: {} ({} nodes)", workflow.name, workflow.nodes.len());

    let runtime = FlowRuntime::with_config(workflow, registry, runtime_config()?);

    let app_state = web::Data::new(AppState {
        runtime: Arc::new(runtime),
    });

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(routes)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
