use super::*;
use crate::handler::{FnCompletion, FnPrompt, FnResource, FnTool};
use rill_mcp_protocol::{
    CallToolResult, GetPromptResult, JsonSchema, Prompt, PromptArgument, PromptMessage,
    ReadResourceResult, Resource, ResourceContents, ResourceTemplate, Tool,
};

fn router_with_fixtures() -> Arc<Router> {
    let tools = Arc::new(ToolRegistry::new());
    tools
        .register(
            Tool::new("greet", JsonSchema::object()).with_description("Say hello"),
            Arc::new(FnTool::new(|_ctx, args: Value| async move {
                let name = args["name"].as_str().unwrap_or("world").to_string();
                Ok(CallToolResult::from_text(format!("Hello, {name}!")))
            })),
        )
        .unwrap();
    tools
        .register(
            Tool::new("panicky", JsonSchema::object()),
            Arc::new(FnTool::new(|_ctx, args: Value| async move {
                if args.is_object() {
                    panic!("tool exploded");
                }
                Ok(CallToolResult::from_text("never reached"))
            })),
        )
        .unwrap();

    let resources = Arc::new(ResourceRegistry::new());
    resources
        .register(
            Resource::new("res://static/readme", "readme"),
            Arc::new(FnResource::new(|_ctx, uri: String, _params| async move {
                Ok(ReadResourceResult::single(ResourceContents::text(
                    uri, "static content",
                )))
            })),
        )
        .unwrap();
    resources
        .register_template(
            ResourceTemplate::new("res://users/{id}", "user"),
            Arc::new(FnResource::new(|_ctx, uri: String, params| async move {
                let id = params.get("id").cloned().unwrap_or_default();
                Ok(ReadResourceResult::single(ResourceContents::text(
                    uri,
                    format!("user {id}"),
                )))
            })),
            Some(Arc::new(FnCompletion::new(|argument, _params| async move {
                Ok(["alice", "bob", "carol"]
                    .into_iter()
                    .filter(|candidate| candidate.starts_with(&argument.value))
                    .map(str::to_string)
                    .collect())
            }))),
        )
        .unwrap();

    let prompts = Arc::new(PromptRegistry::new());
    prompts
        .register(
            Prompt::new("analyze-code").with_argument(PromptArgument::new("language").required()),
            Arc::new(FnPrompt::new(|_ctx, args: HashMap<String, String>| async move {
                let language = args.get("language").cloned().unwrap_or_default();
                Ok(GetPromptResult::new(vec![PromptMessage::user(format!(
                    "Language: {language}"
                ))]))
            })),
            HashMap::from([(
                "language".to_string(),
                Arc::new(FnCompletion::new(|argument, _params| async move {
                    Ok(["go", "python", "rust"]
                        .into_iter()
                        .filter(|candidate| candidate.starts_with(&argument.value))
                        .map(str::to_string)
                        .collect())
                })) as Arc<dyn crate::handler::McpCompletionHandler>,
            )]),
        )
        .unwrap();

    Arc::new(Router::with_registries(
        ServerOptions::default(),
        tools,
        resources,
        prompts,
    ))
}

fn dispatcher() -> McpDispatcher {
    McpDispatcher::new(router_with_fixtures(), Vec::new())
}

fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
    let mut request = JsonRpcRequest::new(id, method);
    if !params.is_null() {
        request = request.with_params(rill_json_rpc::RequestParams::from(params));
    }
    request
}

async fn dispatch(method: &str, params: Value) -> JsonRpcMessage {
    dispatcher()
        .handle_request(request(1, method, params), RequestContext::detached())
        .await
}

fn result_of(message: JsonRpcMessage) -> Value {
    match message {
        JsonRpcMessage::Response(response) => response.result,
        JsonRpcMessage::Error(error) => panic!("expected success, got {error}"),
    }
}

fn error_of(message: JsonRpcMessage) -> rill_json_rpc::JsonRpcError {
    match message {
        JsonRpcMessage::Error(error) => error,
        JsonRpcMessage::Response(response) => {
            panic!("expected error, got {:?}", response.result)
        }
    }
}

#[tokio::test]
async fn test_initialize_negotiates_version() {
    let result = result_of(
        dispatch(
            "initialize",
            json!({"protocolVersion": "2025-03-26", "clientInfo": {"name": "C", "version": "0"}}),
        )
        .await,
    );
    assert_eq!(result["protocolVersion"], "2025-03-26");
    assert_eq!(result["capabilities"]["tools"]["listChanged"], true);

    let older = result_of(
        dispatch("initialize", json!({"protocolVersion": "2024-11-05"})).await,
    );
    assert_eq!(older["protocolVersion"], "2024-11-05");
}

#[tokio::test]
async fn test_ping() {
    assert_eq!(result_of(dispatch("ping", Value::Null).await), json!({}));
}

#[tokio::test]
async fn test_unknown_method_is_32601() {
    let error = error_of(dispatch("bogus/method", Value::Null).await);
    assert_eq!(error.error.code, -32601);
}

#[tokio::test]
async fn test_tools_list_in_registration_order() {
    let result = result_of(dispatch("tools/list", Value::Null).await);
    let names: Vec<&str> = result["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["greet", "panicky"]);
}

#[tokio::test]
async fn test_tool_call() {
    let result = result_of(
        dispatch(
            "tools/call",
            json!({"name": "greet", "arguments": {"name": "world"}}),
        )
        .await,
    );
    assert_eq!(result["content"][0]["text"], "Hello, world!");
}

#[tokio::test]
async fn test_unknown_tool_is_invalid_params() {
    let error = error_of(dispatch("tools/call", json!({"name": "ghost"})).await);
    assert_eq!(error.error.code, -32602);
}

#[tokio::test]
async fn test_panicking_handler_becomes_internal_error_with_data() {
    let error = error_of(dispatch("tools/call", json!({"name": "panicky"})).await);
    assert_eq!(error.error.code, -32603);
    assert_eq!(error.error.data, Some(json!("tool exploded")));
}

#[tokio::test]
async fn test_read_direct_resource() {
    let result = result_of(
        dispatch("resources/read", json!({"uri": "res://static/readme"})).await,
    );
    assert_eq!(result["contents"][0]["text"], "static content");
}

#[tokio::test]
async fn test_read_template_resource_with_bindings() {
    let result = result_of(
        dispatch("resources/read", json!({"uri": "res://users/42"})).await,
    );
    assert_eq!(result["contents"][0]["text"], "user 42");
}

#[tokio::test]
async fn test_read_unknown_resource() {
    let error = error_of(dispatch("resources/read", json!({"uri": "res://nope"})).await);
    assert_eq!(error.error.code, -32002);
}

#[tokio::test]
async fn test_prompt_get_validates_required_arguments() {
    let error = error_of(dispatch("prompts/get", json!({"name": "analyze-code"})).await);
    assert_eq!(error.error.code, -32602);

    let result = result_of(
        dispatch(
            "prompts/get",
            json!({"name": "analyze-code", "arguments": {"language": "rust"}}),
        )
        .await,
    );
    assert_eq!(result["messages"][0]["content"]["text"], "Language: rust");
}

#[tokio::test]
async fn test_prompt_argument_completion() {
    let result = result_of(
        dispatch(
            "completion/complete",
            json!({
                "ref": {"type": "ref/prompt", "name": "analyze-code"},
                "argument": {"name": "language", "value": "r"}
            }),
        )
        .await,
    );
    assert_eq!(result["completion"]["values"], json!(["rust"]));
}

#[tokio::test]
async fn test_resource_completion_matches_template_in_order() {
    let result = result_of(
        dispatch(
            "completion/complete",
            json!({
                "ref": {"type": "ref/resource", "uri": "res://users/{id}"},
                "argument": {"name": "id", "value": "a"}
            }),
        )
        .await,
    );
    assert_eq!(result["completion"]["values"], json!(["alice"]));
}

#[tokio::test]
async fn test_completion_without_hook_is_empty() {
    let result = result_of(
        dispatch(
            "completion/complete",
            json!({
                "ref": {"type": "ref/prompt", "name": "analyze-code"},
                "argument": {"name": "unknown-arg", "value": "x"}
            }),
        )
        .await,
    );
    assert_eq!(result["completion"]["values"], json!([]));
}

#[tokio::test]
async fn test_pagination_cursor_walk() {
    let tools = Arc::new(ToolRegistry::new());
    for i in 0..7 {
        tools
            .register(
                Tool::new(format!("tool-{i}"), JsonSchema::object()),
                Arc::new(FnTool::new(|_ctx, _args: Value| async move {
                    Ok(CallToolResult::from_text("x"))
                })),
            )
            .unwrap();
    }
    let router = Arc::new(Router::with_registries(
        ServerOptions {
            page_size: 3,
            ..Default::default()
        },
        tools,
        Arc::new(ResourceRegistry::new()),
        Arc::new(PromptRegistry::new()),
    ));
    let dispatcher = McpDispatcher::new(router, Vec::new());

    let first = result_of(
        dispatcher
            .handle_request(
                request(1, "tools/list", Value::Null),
                RequestContext::detached(),
            )
            .await,
    );
    assert_eq!(first["tools"].as_array().unwrap().len(), 3);
    let cursor = first["nextCursor"].as_str().unwrap().to_string();

    let second = result_of(
        dispatcher
            .handle_request(
                request(2, "tools/list", json!({"cursor": cursor})),
                RequestContext::detached(),
            )
            .await,
    );
    let names: Vec<&str> = second["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["tool-3", "tool-4", "tool-5"]);

    let error = error_of(
        dispatcher
            .handle_request(
                request(3, "tools/list", json!({"cursor": "???bad???"})),
                RequestContext::detached(),
            )
            .await,
    );
    assert_eq!(error.error.code, -32602);
}

#[tokio::test]
async fn test_preformed_envelope_not_double_wrapped() {
    struct EnvelopeMiddleware;

    #[async_trait]
    impl Middleware for EnvelopeMiddleware {
        async fn handle(
            &self,
            _ctx: RequestContext,
            request: JsonRpcRequest,
            _next: Next,
        ) -> McpResult<Value> {
            // a middleware returning a complete envelope
            Ok(json!({
                "jsonrpc": "2.0",
                "id": request.id,
                "error": {"code": -32000, "message": "already wrapped"}
            }))
        }
    }

    let dispatcher = McpDispatcher::new(
        router_with_fixtures(),
        vec![Arc::new(EnvelopeMiddleware)],
    );
    let message = dispatcher
        .handle_request(request(9, "ping", Value::Null), RequestContext::detached())
        .await;

    let error = error_of(message);
    assert_eq!(error.error.code, -32000);
    assert_eq!(error.error.message, "already wrapped");
    // not nested inside a result field
    assert_eq!(error.id, Some(RequestId::Number(9)));
}

#[tokio::test]
async fn test_plain_value_is_wrapped_once() {
    let message = dispatch("ping", Value::Null).await;
    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(value["jsonrpc"], "2.0");
    assert_eq!(value["result"], json!({}));
    assert!(value.get("error").is_none());
}

#[tokio::test]
async fn test_middleware_runs_outer_to_inner_and_can_observe_result() {
    use std::sync::Mutex;

    struct Tagger {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Middleware for Tagger {
        async fn handle(
            &self,
            ctx: RequestContext,
            request: JsonRpcRequest,
            next: Next,
        ) -> McpResult<Value> {
            self.log.lock().unwrap().push("before");
            let result = next.run(ctx, request).await;
            self.log.lock().unwrap().push("after");
            result
        }
    }

    let log = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = McpDispatcher::new(
        router_with_fixtures(),
        vec![Arc::new(Tagger { log: log.clone() })],
    );
    dispatcher
        .handle_request(request(1, "ping", Value::Null), RequestContext::detached())
        .await;
    assert_eq!(*log.lock().unwrap(), vec!["before", "after"]);
}

#[tokio::test]
async fn test_notifications_produce_no_response() {
    // handle_notification returns unit by construction; this asserts
    // the dispatcher survives unknown and malformed notifications
    let dispatcher = dispatcher();
    dispatcher
        .handle_notification(
            JsonRpcNotification::new("notifications/initialized"),
            RequestContext::detached(),
        )
        .await;
    dispatcher
        .handle_notification(
            JsonRpcNotification::new("notifications/unknown"),
            RequestContext::detached(),
        )
        .await;
}
