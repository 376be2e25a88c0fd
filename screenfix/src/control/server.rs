// JSON-RPC request loop over any async byte stream (stdin/stdout in production)

use super::protocol::{
    serialize_message, ErrorCode, Request, Response, ToolReply, MAX_REQUEST_FRAME_SIZE,
    PROTOCOL_VERSION,
};
use super::service::{tools_list, ControlService, ToolCall, ToolCallError};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const SERVER_NAME: &str = "screenfix";

type MethodResult = std::result::Result<Value, (ErrorCode, String)>;

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Serve requests until the reader reaches EOF
pub async fn serve<R, W>(mut reader: R, mut writer: W, service: &ControlService) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .await
            .context("Failed to read request")?;
        if read == 0 {
            log::debug!("Client closed input");
            break;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        if let Some(response) = handle_frame(&line, service).await {
            let bytes = serialize_message(&response).context("Failed to serialize response")?;
            writer.write_all(&bytes).await.context("Failed to write response")?;
            writer.flush().await.context("Failed to flush response")?;
        }
    }

    Ok(())
}

/// Answer one raw frame; `None` for notifications
pub async fn handle_frame(frame: &[u8], service: &ControlService) -> Option<Response> {
    // Enforce max request frame size (1MB)
    if frame.len() > MAX_REQUEST_FRAME_SIZE {
        return Some(Response::error(
            Value::Null,
            ErrorCode::InvalidRequest,
            format!(
                "Request frame too large: {} bytes (max {})",
                frame.len(),
                MAX_REQUEST_FRAME_SIZE
            ),
        ));
    }

    let value: Value = match serde_json::from_slice(frame) {
        Ok(value) => value,
        Err(e) => {
            return Some(Response::error(
                Value::Null,
                ErrorCode::ParseError,
                format!("Failed to parse request: {}", e),
            ))
        }
    };

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: Request = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return Some(Response::error(
                id,
                ErrorCode::InvalidRequest,
                format!("Invalid request: {}", e),
            ))
        }
    };

    handle_request(request, service).await
}

pub async fn handle_request(request: Request, service: &ControlService) -> Option<Response> {
    log::debug!("Request: {}", request.method);

    let result: MethodResult = match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")},
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tools_list() })),
        "tools/call" => call_tool(request.params, service).await,
        method if method.starts_with("notifications/") => return None,
        other => Err((
            ErrorCode::MethodNotFound,
            format!("Method not found: {}", other),
        )),
    };

    // Notifications never get a response, whatever the method
    let id = request.id?;
    Some(match result {
        Ok(value) => Response::success(id, value),
        Err((code, message)) => Response::error(id, code, message),
    })
}

async fn call_tool(params: Option<Value>, service: &ControlService) -> MethodResult {
    let params: CallParams = serde_json::from_value(params.unwrap_or(Value::Null)).map_err(|e| {
        (
            ErrorCode::InvalidParams,
            format!("Invalid tools/call params: {}", e),
        )
    })?;

    let reply = match ToolCall::from_params(&params.name, params.arguments) {
        Ok(call) => {
            log::info!("Tool call: {}", params.name);
            service.call(call).await
        }
        Err(ToolCallError::UnknownTool(name)) => {
            log::warn!("Unknown tool: {}", name);
            ToolReply::error(format!("Unknown tool: {}", name))
        }
        Err(e @ ToolCallError::InvalidArguments { .. }) => {
            return Err((ErrorCode::InvalidParams, e.to_string()))
        }
    };

    serde_json::to_value(&reply).map_err(|e| (ErrorCode::InternalError, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::config::{AppPaths, Config};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn test_service() -> (ControlService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::load(AppPaths::in_dir(temp_dir.path().join("config")));
        config
            .set_save_directory(&temp_dir.path().join("shots").to_string_lossy())
            .unwrap();
        config
            .set_tasks_file(&temp_dir.path().join("tasks.md").to_string_lossy())
            .unwrap();
        (ControlService::new(&config), temp_dir)
    }

    async fn exchange(service: &ControlService, input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        serve(input.as_bytes(), &mut output, service).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_and_notification() {
        let (service, _temp) = test_service();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );

        let responses = exchange(&service, input).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "screenfix");
        assert_eq!(responses[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(responses[1], json!({"jsonrpc": "2.0", "id": 2, "result": {}}));
    }

    #[tokio::test]
    async fn test_tools_list_over_wire() {
        let (service, _temp) = test_service();
        let responses =
            exchange(&service, "{\"jsonrpc\":\"2.0\",\"id\":\"a\",\"method\":\"tools/list\"}\n")
                .await;

        let tools = responses[0]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 8);
        assert_eq!(responses[0]["id"], "a");
    }

    #[tokio::test]
    async fn test_get_status_call_on_empty_workspace() {
        let (service, _temp) = test_service();
        let responses = exchange(
            &service,
            "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/call\",\"params\":{\"name\":\"get_status\",\"arguments\":{}}}\n",
        )
        .await;

        let result = &responses[0]["result"];
        assert_eq!(result["isError"], false);
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("- Daemon: Not running"));
        assert!(text.contains("- Screenshots: 0"));
        assert!(text.contains("- Pending tasks: 0"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_reply() {
        let (service, _temp) = test_service();
        let responses = exchange(
            &service,
            "{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"tools/call\",\"params\":{\"name\":\"format_disk\"}}\n",
        )
        .await;

        assert_eq!(
            responses[0]["result"],
            json!({
                "content": [{"type": "text", "text": "Unknown tool: format_disk"}],
                "isError": true
            })
        );
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let (service, _temp) = test_service();
        let input = concat!(
            "this is not json\n",
            r#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"complete_task","arguments":{}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":7}"#,
            "\n",
        );

        let responses = exchange(&service, input).await;

        let codes: Vec<i64> = responses
            .iter()
            .map(|r| r["error"]["code"].as_i64().unwrap())
            .collect();
        assert_eq!(codes, vec![-32700, -32601, -32602, -32600]);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[1]["id"], 5);
        assert_eq!(responses[3]["id"], 7);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (service, _temp) = test_service();
        let mut input = "x".repeat(MAX_REQUEST_FRAME_SIZE + 10);
        input.push('\n');
        input.push_str("{\"jsonrpc\":\"2.0\",\"id\":8,\"method\":\"ping\"}\n");

        let responses = exchange(&service, &input).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], -32600);
        assert_eq!(responses[1]["id"], 8);
    }

    #[tokio::test]
    async fn test_duplex_request_response() {
        let (service, _temp) = test_service();
        let (client, server_side) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let (client_read, mut client_write) = tokio::io::split(client);

        let server = async {
            serve(BufReader::new(server_read), server_write, &service)
                .await
                .unwrap();
        };
        let client = async {
            let mut lines = BufReader::new(client_read).lines();

            client_write
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"get_tasks\"}}\n")
                .await
                .unwrap();
            let first: Value =
                serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();

            client_write
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",\"params\":{\"name\":\"complete_task\",\"arguments\":{\"task_text\":\"Nope\"}}}\n")
                .await
                .unwrap();
            let second: Value =
                serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();

            client_write.shutdown().await.unwrap();
            drop(client_write);
            (first, second)
        };

        let ((), (first, second)) = tokio::join!(server, client);

        assert_eq!(first["result"]["content"][0]["text"], "No tasks found.");
        assert_eq!(
            second["result"]["content"][0]["text"],
            "Task not found: Nope"
        );
    }
}
