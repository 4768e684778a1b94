//! JSON-RPC dispatch for the lifecycle manager.
//!
//! Methods live in the `Service` namespace: `Service.Install` and `Install`
//! are the same method. Parameters may be passed bare or wrapped in a
//! one-element array.

use crate::daemon::error::{ErrorKind, ServiceError};
use crate::daemon::manager::ServiceManager;
use crate::daemon::runner::{Params, ServiceExecutor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

const NAMESPACE: &str = "Service.";

/// JSON-RPC Request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC Response
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }

    fn service_error(id: Option<Value>, err: &ServiceError) -> Self {
        let mut data = json!({ "kind": err.kind() });
        if let Some(output) = err.output() {
            data["output"] = Value::String(output.to_string());
        }
        let mut response = Self::error(id, error_code(err.kind()), &err.to_string());
        if let Some(error) = response.error.as_mut() {
            error.data = Some(data);
        }
        response
    }
}

/// Application error code of a service error kind.
pub fn error_code(kind: ErrorKind) -> i32 {
    let offset = match kind {
        ErrorKind::AlreadyExists => 0,
        ErrorKind::NotFound => 1,
        ErrorKind::InvalidInput => 2,
        ErrorKind::SerializationFailure => 3,
        ErrorKind::SubprocessFailure => 4,
        ErrorKind::ExternalToolFailure => 5,
        ErrorKind::FilesystemFailure => 6,
        ErrorKind::ParseFailure => 7,
        ErrorKind::SpawnFailure => 8,
        ErrorKind::Timeout => 9,
    };
    -32000 - offset
}

#[derive(Debug, Deserialize)]
struct InstallArgs {
    id: String,
    url: String,
    #[serde(default)]
    params: Option<Params>,
}

/// Failure before reaching the manager
enum CallError {
    MethodNotFound(String),
    InvalidParams(String),
    Service(ServiceError),
}

impl From<ServiceError> for CallError {
    fn from(e: ServiceError) -> Self {
        CallError::Service(e)
    }
}

pub struct RpcHandler<E: ServiceExecutor> {
    manager: Arc<ServiceManager<E>>,
}

impl<E: ServiceExecutor> Clone for RpcHandler<E> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

impl<E: ServiceExecutor> RpcHandler<E> {
    pub fn new(manager: Arc<ServiceManager<E>>) -> Self {
        Self { manager }
    }

    /// Parse a raw request body and dispatch it.
    pub async fn handle_body(&self, body: &str) -> JsonRpcResponse {
        let value: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                return JsonRpcResponse::error(None, PARSE_ERROR, &format!("Parse error: {}", e))
            }
        };
        let id = value.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                JsonRpcResponse::error(id, INVALID_REQUEST, &format!("Invalid request: {}", e))
            }
        }
    }

    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        log::debug!("Handling request: {}", request.method);

        let id = request.id.clone();
        match self.dispatch(&request.method, request.params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(CallError::MethodNotFound(method)) => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                &format!("Method not found: {}", method),
            ),
            Err(CallError::InvalidParams(msg)) => {
                JsonRpcResponse::error(id, INVALID_PARAMS, &format!("Invalid params: {}", msg))
            }
            Err(CallError::Service(e)) => {
                log::info!("{} failed: {}", request.method, e);
                JsonRpcResponse::service_error(id, &e)
            }
        }
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, CallError> {
        let name = method.strip_prefix(NAMESPACE).unwrap_or(method);
        let params = unwrap_params(params);
        let manager = &self.manager;

        let result = match name {
            "List" => {
                let services = manager.list();
                json!(services)
            }
            "Install" => {
                let args: InstallArgs = serde_json::from_value(params)
                    .map_err(|e| CallError::InvalidParams(e.to_string()))?;
                let params = args.params.unwrap_or_default();
                Value::String(manager.install(&args.id, &args.url, &params).await?)
            }
            "Remove" => Value::String(manager.remove(&service_id(params)?).await?),
            "Exists" => Value::Bool(manager.exists(&service_id(params)?)),
            "Status" => Value::String(manager.status(&service_id(params)?).await?),
            "Start" => Value::String(manager.start(&service_id(params)?).await?),
            "Stop" => Value::String(manager.stop(&service_id(params)?).await?),
            "Stats" => {
                let stats = manager.stats(&service_id(params)?).await?;
                json!(stats)
            }
            _ => return Err(CallError::MethodNotFound(method.to_string())),
        };
        Ok(result)
    }
}

/// `[arg]` -> `arg`
fn unwrap_params(params: Value) -> Value {
    match params {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    }
}

fn service_id(params: Value) -> Result<String, CallError> {
    match params {
        Value::String(id) => Ok(id),
        other => Err(CallError::InvalidParams(format!(
            "expected a service id string, got {}",
            other
        ))),
    }
}
