//! Tool table: method names, parameter decoding, and the handlers behind them.
//!
//! Every handler that touches the client runs as one job on the automation worker, so a
//! multi-step tool (such as opening a chat and then reading it) is never interleaved with
//! another call. [`prepare`] queues that job before returning; only the wait for its result
//! is deferred.

use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use mcpwa::{ChatFilter, MessageEntry, Tab};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::config::FilterVocabulary;
use crate::errors::ToolError;
use crate::server::ServerState;
use crate::worker::{AutomationQueue, Pending};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    StartSession,
    StopSession,
    Status,
    ListChats,
    GetCurrentChat,
    OpenChat,
    GetMessages,
    SendMessage,
    Search,
    ClearSearch,
    GetSearchResults,
    OpenSearchResult,
    Navigate,
    SelectFilter,
    ListTools,
}

impl Tool {
    pub const ALL: [Tool; 15] = [
        Tool::StartSession,
        Tool::StopSession,
        Tool::Status,
        Tool::ListChats,
        Tool::GetCurrentChat,
        Tool::OpenChat,
        Tool::GetMessages,
        Tool::SendMessage,
        Tool::Search,
        Tool::ClearSearch,
        Tool::GetSearchResults,
        Tool::OpenSearchResult,
        Tool::Navigate,
        Tool::SelectFilter,
        Tool::ListTools,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::StartSession => "start-session",
            Tool::StopSession => "stop-session",
            Tool::Status => "status",
            Tool::ListChats => "list-chats",
            Tool::GetCurrentChat => "get-current-chat",
            Tool::OpenChat => "open-chat",
            Tool::GetMessages => "get-messages",
            Tool::SendMessage => "send-message",
            Tool::Search => "search",
            Tool::ClearSearch => "clear-search",
            Tool::GetSearchResults => "get-search-results",
            Tool::OpenSearchResult => "open-search-result",
            Tool::Navigate => "navigate",
            Tool::SelectFilter => "select-filter",
            Tool::ListTools => "list-tools",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|tool| tool.name() == name)
    }
}

/// What a handler can reach.
#[derive(Clone)]
pub struct ToolContext {
    pub queue: Arc<AutomationQueue>,
    pub vocabulary: Arc<FilterVocabulary>,
    /// Server state at the time the request was dispatched.
    pub server: ServerState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ListChatsParams {
    filter: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct OpenChatParams {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct GetMessagesParams {
    chat_name: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SendMessageParams {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SearchParams {
    query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct OpenSearchResultParams {
    index: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct NavigateParams {
    tab: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SelectFilterParams {
    filter: String,
}

/// Client-side part of the `status` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ClientStatus {
    available: bool,
    process_id: Option<u32>,
    search_mode: Option<bool>,
    filter: Option<ChatFilter>,
}

fn params<T: DeserializeOwned>(tool: Tool, params: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| ToolError::invalid_params(format!("{}: {e}", tool.name())))
}

fn to_json<T: Serialize>(value: T) -> Result<Value, ToolError> {
    serde_json::to_value(value)
        .map_err(|e| ToolError::internal(format!("failed to encode result: {e}")))
}

fn chat_not_found(name: &str) -> ToolError {
    ToolError::not_found(format!("no chat named '{name}'"))
}

/// A tool call whose automation job, if any, is already queued.
pub type ToolFuture = BoxFuture<'static, Result<Value, ToolError>>;

fn finish<T, F>(pending: Pending<T>, shape: F) -> ToolFuture
where
    T: Send + 'static,
    F: FnOnce(T) -> Result<Value, ToolError> + Send + 'static,
{
    async move { shape(pending.wait().await?) }.boxed()
}

/// Decode the call to `method` and queue its job.
///
/// Unknown names fail with `unknown-tool` before any parameter is looked at; bad parameters
/// fail here too, without touching the worker.
#[instrument(skip(ctx, raw))]
pub fn prepare(
    ctx: &ToolContext,
    method: &str,
    raw: Map<String, Value>,
) -> Result<ToolFuture, ToolError> {
    let Some(tool) = Tool::from_name(method) else {
        return Err(ToolError::unknown_tool(method));
    };
    debug!("queueing");
    let queue = &ctx.queue;

    let work = match tool {
        Tool::StartSession => finish(queue.submit(|wa| wa.start_session()), |pid| {
            Ok(json!({ "started": true, "processId": pid }))
        }),
        Tool::StopSession => finish(queue.submit(|wa| wa.stop_session()), |_| {
            Ok(Value::Bool(true))
        }),
        Tool::Status => {
            let vocabulary = ctx.vocabulary.clone();
            let server = ctx.server;
            let pending = queue.submit(|wa| {
                let available = wa.is_available();
                let (search_mode, filter) = if available {
                    (
                        wa.is_in_search_mode().ok(),
                        wa.selected_chat_filter().ok(),
                    )
                } else {
                    (None, None)
                };
                Ok(ClientStatus {
                    available,
                    process_id: wa.process_id(),
                    search_mode,
                    filter,
                })
            });
            finish(pending, move |client: ClientStatus| {
                Ok(json!({
                    "available": client.available,
                    "processId": client.process_id,
                    "searchMode": client.search_mode,
                    "filter": client.filter.map(|f| vocabulary.word_for(f)),
                    "server": server,
                }))
            })
        }
        Tool::ListChats => {
            let p: ListChatsParams = params(tool, raw)?;
            let filter = ctx.vocabulary.resolve(p.filter.as_deref())?;
            finish(queue.submit(move |wa| wa.list_chats(filter)), to_json)
        }
        Tool::GetCurrentChat => finish(queue.submit(|wa| wa.current_chat()), to_json),
        Tool::OpenChat => {
            let p: OpenChatParams = params(tool, raw)?;
            let name = p.name.clone();
            let pending = queue.submit(move |wa| wa.open_chat_with_name(&name));
            finish(pending, move |opened: Option<bool>| match opened {
                Some(opened) => Ok(Value::Bool(opened)),
                None => Err(chat_not_found(&p.name)),
            })
        }
        Tool::GetMessages => {
            let p: GetMessagesParams = params(tool, raw)?;
            let pending = queue.submit(move |wa| {
                if let Some(name) = &p.chat_name {
                    match wa.open_chat_with_name(name)? {
                        None => return Ok(Err(chat_not_found(name))),
                        Some(false) => return Ok(Ok(None)),
                        Some(true) => {}
                    }
                }
                wa.messages(p.limit).map(|m| Ok(Some(m)))
            });
            finish(
                pending,
                |messages: Result<Option<Vec<MessageEntry>>, ToolError>| to_json(messages?),
            )
        }
        Tool::SendMessage => {
            let p: SendMessageParams = params(tool, raw)?;
            finish(queue.submit(move |wa| wa.send_message(&p.text)), |sent| {
                Ok(Value::Bool(sent))
            })
        }
        Tool::Search => {
            let p: SearchParams = params(tool, raw)?;
            finish(queue.submit(move |wa| wa.global_search(&p.query)), to_json)
        }
        Tool::ClearSearch => finish(queue.submit(|wa| wa.clear_search()), |cleared| {
            Ok(Value::Bool(cleared))
        }),
        Tool::GetSearchResults => finish(queue.submit(|wa| wa.search_results()), to_json),
        Tool::OpenSearchResult => {
            let p: OpenSearchResultParams = params(tool, raw)?;
            finish(queue.submit(move |wa| wa.open_search_result(p.index)), |opened| {
                Ok(Value::Bool(opened))
            })
        }
        Tool::Navigate => {
            let p: NavigateParams = params(tool, raw)?;
            let tab: Tab = p.tab.parse().map_err(ToolError::invalid_params)?;
            finish(queue.submit(move |wa| wa.navigate_to(tab)), |selected| {
                Ok(Value::Bool(selected))
            })
        }
        Tool::SelectFilter => {
            let p: SelectFilterParams = params(tool, raw)?;
            let filter = ctx.vocabulary.resolve(Some(&p.filter))?;
            finish(queue.submit(move |wa| wa.select_chat_filter(filter)), |selected| {
                Ok(Value::Bool(selected))
            })
        }
        Tool::ListTools => future::ready(Ok(Value::from(
            Tool::ALL.iter().map(|t| t.name()).collect::<Vec<_>>(),
        )))
        .boxed(),
    };
    Ok(work)
}

/// Run the tool called `method` to completion.
pub async fn dispatch(
    ctx: &ToolContext,
    method: &str,
    raw: Map<String, Value>,
) -> Result<Value, ToolError> {
    prepare(ctx, method, raw)?.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use mcpwa::simulator::{sample_chats, WhatsAppSimulator};
    use mcpwa::AutomationConfig;

    fn context(sim: &WhatsAppSimulator) -> ToolContext {
        let whatsapp = mcpwa::WhatsApp::new(sim.engine(), AutomationConfig::immediate());
        ToolContext {
            queue: Arc::new(AutomationQueue::spawn(Arc::new(whatsapp)).unwrap()),
            vocabulary: Arc::new(FilterVocabulary::default()),
            server: ServerState {
                running: true,
                transport_connected: true,
            },
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn test_tool_names_round_trip() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(Tool::from_name("listChats"), None);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let sim = WhatsAppSimulator::new(sample_chats());
        let err = dispatch(&context(&sim), "delete-everything", Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownTool);
    }

    #[tokio::test]
    async fn test_list_chats_with_filter() {
        let sim = WhatsAppSimulator::new(sample_chats());
        let ctx = context(&sim);
        let result = dispatch(&ctx, "list-chats", object(json!({"filter": "groups"})))
            .await
            .unwrap();
        let chats = result.as_array().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0]["name"], "Team");
        assert_eq!(chats[0]["isGroup"], true);

        let all = dispatch(&ctx, "list-chats", Map::new()).await.unwrap();
        assert_eq!(all.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let sim = WhatsAppSimulator::new(sample_chats());
        let ctx = context(&sim);
        let cases = [
            ("list-chats", json!({"filter": "archived"})),
            ("open-chat", json!({})),
            ("open-chat", json!({"name": 5})),
            ("send-message", json!({"text": "hi", "extra": true})),
            ("navigate", json!({"tab": "nowhere"})),
            ("open-search-result", json!({"index": -1})),
            ("search", json!({"query": "   "})),
        ];
        for (method, raw) in cases {
            let err = dispatch(&ctx, method, object(raw)).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidParams, "{method}");
        }
    }

    #[tokio::test]
    async fn test_open_chat_unknown_name() {
        let sim = WhatsAppSimulator::new(sample_chats());
        let err = dispatch(&context(&sim), "open-chat", object(json!({"name": "Nobody"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert!(err.message.contains("Nobody"));
    }

    #[tokio::test]
    async fn test_get_messages_opens_chat_first() {
        let sim = WhatsAppSimulator::new(sample_chats());
        let ctx = context(&sim);
        let result = dispatch(
            &ctx,
            "get-messages",
            object(json!({"chatName": "Team", "limit": 2})),
        )
        .await
        .unwrap();

        assert_eq!(sim.open_chat_name().as_deref(), Some("Team"));
        let messages = result.as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["text"], "deploy is done");
        assert_eq!(messages[1]["sender"], "Carol");

        let err = dispatch(&ctx, "get-messages", object(json!({"chatName": "Nobody"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_status() {
        let sim = WhatsAppSimulator::new(sample_chats());
        let result = dispatch(&context(&sim), "status", Map::new()).await.unwrap();
        assert_eq!(
            result,
            json!({
                "available": true,
                "processId": 4242,
                "searchMode": false,
                "filter": "all",
                "server": {"running": true, "transportConnected": true},
            })
        );

        sim.set_available(false);
        let result = dispatch(&context(&sim), "status", Map::new()).await.unwrap();
        assert_eq!(result["available"], false);
        assert_eq!(result["searchMode"], Value::Null);
    }

    #[tokio::test]
    async fn test_unavailable_client() {
        let sim = WhatsAppSimulator::new(sample_chats());
        sim.set_available(false);
        let err = dispatch(&context(&sim), "get-current-chat", Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AccessibilityUnavailable);
    }

    #[tokio::test]
    async fn test_prepare_queues_before_awaiting() {
        let sim = WhatsAppSimulator::new(sample_chats());
        let ctx = context(&sim);
        sim.open("Bob");

        let first = prepare(&ctx, "send-message", object(json!({"text": "one"}))).unwrap();
        let second = prepare(&ctx, "send-message", object(json!({"text": "two"}))).unwrap();
        // Awaiting in reverse does not change the order the jobs ran in.
        assert_eq!(second.await.unwrap(), Value::Bool(true));
        assert_eq!(first.await.unwrap(), Value::Bool(true));

        let texts: Vec<String> = sim.messages("Bob").into_iter().map(|m| m.text).collect();
        assert_eq!(texts[texts.len() - 2..], ["one", "two"]);

        assert!(matches!(
            prepare(&ctx, "open-chat", Map::new()),
            Err(ToolError { code: ErrorCode::InvalidParams, .. })
        ));
    }

    #[tokio::test]
    async fn test_list_tools() {
        let sim = WhatsAppSimulator::new(sample_chats());
        let result = dispatch(&context(&sim), "list-tools", Map::new())
            .await
            .unwrap();
        let names = result.as_array().unwrap();
        assert_eq!(names.len(), Tool::ALL.len());
        assert!(names.contains(&json!("send-message")));
    }
}
