use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::chart_engine::RenderedChart;
use crate::chart_spec::ChartSpecification;
use crate::conversation::{Conversation, Role};
use crate::event_bus::{Event, EventBus};
use crate::llm_manager::{ChatMessage, LLMManager};
use crate::prompts;
use crate::tools::ChartTools;

pub const FAILURE_MESSAGE: &str = "Er is een fout opgetreden bij het verwerken van je verzoek.";
pub const CHART_CREATED_MESSAGE: &str = "De grafiek is aangemaakt.";
pub const EMPTY_REPLY_MESSAGE: &str =
    "Ik kon geen antwoord formuleren. Probeer je verzoek anders te verwoorden.";
pub const STEP_LIMIT_MESSAGE: &str =
    "Het verzoek kon niet binnen het maximale aantal stappen worden afgerond.";

/// What the caller gets back for one request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_data: Option<ChartSpecification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_path: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    fn completed(message: String, chart: Option<RenderedChart>) -> Self {
        let (chart_data, chart_path) = match chart {
            Some(chart) => (
                Some(chart.spec),
                chart.file_path.map(|p| p.to_string_lossy().to_string()),
            ),
            None => (None, None),
        };
        Self {
            message,
            chart_data,
            chart_path,
            success: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            message: FAILURE_MESSAGE.to_string(),
            chart_data: None,
            chart_path: None,
            success: false,
            error: Some(error),
        }
    }
}

/// Runs one bounded model/tool exchange per request.
///
/// Holds no conversation state; the caller passes its [`Conversation`] in.
pub struct ChartAgent {
    llm_manager: Arc<LLMManager>,
    tools: ChartTools,
    max_steps: usize,
    event_bus: Option<Arc<EventBus>>,
}

impl ChartAgent {
    pub fn new(llm_manager: Arc<LLMManager>, tools: ChartTools, max_steps: usize) -> Self {
        Self {
            llm_manager,
            tools,
            max_steps: max_steps.max(1),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    async fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(event).await;
        }
    }

    /// Process a user request against the given history.
    pub async fn process(
        &self,
        user_input: &str,
        conversation: &Conversation,
        excel_data: Option<&str>,
    ) -> AgentResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        info!("Processing request {}", request_id);
        self.emit(Event::RequestStarted {
            request_id: request_id.clone(),
        })
        .await;

        let system_prompt = prompts::system_prompt();
        let definitions = self.tools.definitions();

        let mut messages: Vec<ChatMessage> = conversation
            .messages()
            .iter()
            .map(|m| match m.role {
                Role::System => ChatMessage::System(m.content.clone()),
                Role::User => ChatMessage::User(m.content.clone()),
                Role::Assistant => ChatMessage::Assistant {
                    content: m.content.clone(),
                    tool_calls: Vec::new(),
                },
            })
            .collect();
        messages.push(ChatMessage::User(prompts::user_message(
            user_input,
            excel_data,
            conversation.color_preference(),
        )));

        let mut last_chart: Option<RenderedChart> = None;
        let mut last_text = String::new();
        let mut finished = false;
        let mut steps = 0;

        while steps < self.max_steps {
            steps += 1;
            debug!("Request {} step {}", request_id, steps);

            let reply = match self
                .llm_manager
                .generate(&system_prompt, &messages, &definitions)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    error!("Request {} failed: {:#}", request_id, e);
                    self.emit(Event::RequestFailed {
                        request_id: request_id.clone(),
                        error: e.to_string(),
                    })
                    .await;
                    return AgentResponse::failed(format!("{:#}", e));
                }
            };

            if !reply.text.trim().is_empty() {
                last_text = reply.text.clone();
            }

            if !reply.has_tool_calls() {
                finished = true;
                break;
            }

            messages.push(ChatMessage::Assistant {
                content: reply.text.clone(),
                tool_calls: reply.tool_invocations.clone(),
            });

            for invocation in &reply.tool_invocations {
                let outcome = self.tools.execute(invocation).await;
                messages.push(ChatMessage::Tool {
                    call_id: outcome.call_id.clone(),
                    name: outcome.name.clone(),
                    content: outcome.content.to_string(),
                });
                if !outcome.succeeded() {
                    debug!("Tool {} returned an error result to the model", outcome.name);
                }
                if let Some(chart) = outcome.chart {
                    last_chart = Some(chart);
                }
            }
        }

        if !finished {
            warn!(
                "Request {} reached the step limit of {}",
                request_id, self.max_steps
            );
        }
        let message = if !last_text.is_empty() {
            last_text
        } else if last_chart.is_some() {
            CHART_CREATED_MESSAGE.to_string()
        } else if finished {
            EMPTY_REPLY_MESSAGE.to_string()
        } else {
            STEP_LIMIT_MESSAGE.to_string()
        };

        self.emit(Event::RequestCompleted {
            request_id: request_id.clone(),
            steps,
            chart_created: last_chart.is_some(),
        })
        .await;
        info!(
            "Request {} completed in {} step(s), chart: {}",
            request_id,
            steps,
            last_chart.is_some()
        );

        AgentResponse::completed(message, last_chart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart_engine::ChartEngine;
    use crate::config::Config;
    use crate::llm_manager::{LLMProvider, ModelReply, ToolDefinition, ToolInvocation};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    /// Replays canned replies and records what it was sent.
    struct ScriptedProvider {
        replies: Mutex<Vec<Result<ModelReply>>>,
        seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<ModelReply>>) -> (Self, Arc<Mutex<Vec<Vec<ChatMessage>>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let mut replies = replies;
            replies.reverse();
            (
                Self {
                    replies: Mutex::new(replies),
                    seen: seen.clone(),
                },
                seen,
            )
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _system_prompt: &str,
            messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<ModelReply> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(ModelReply::text("klaar")))
        }
    }

    /// Calls the bar tool on every turn, forever.
    struct LoopingProvider;

    #[async_trait]
    impl LLMProvider for LoopingProvider {
        fn name(&self) -> &str {
            "looping"
        }

        async fn generate(&self, _: &str, _: &[ChatMessage], _: &[ToolDefinition]) -> Result<ModelReply> {
            Ok(tool_reply("", "create_bar_chart", bar_args("fd")))
        }
    }

    fn bar_args(scheme: &str) -> Value {
        json!({"labels": ["Q1", "Q2"], "values": [100, 150], "title": "Sales", "colorScheme": scheme})
    }

    fn tool_reply(text: &str, name: &str, arguments: Value) -> ModelReply {
        ModelReply {
            text: text.to_string(),
            tool_invocations: vec![ToolInvocation {
                id: format!("call_{}", name),
                name: name.to_string(),
                arguments,
            }],
            usage: None,
        }
    }

    fn agent_with(provider: Box<dyn LLMProvider>, bus: Arc<EventBus>) -> (ChartAgent, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(LLMManager::new(vec![provider], bus.clone(), Arc::new(Config::default())));
        let engine = Arc::new(ChartEngine::new(dir.path(), true).with_event_bus(bus.clone()));
        let tools = ChartTools::new(engine).with_event_bus(bus.clone());
        (ChartAgent::new(manager, tools, 5).with_event_bus(bus), dir)
    }

    #[tokio::test]
    async fn test_bar_chart_in_fd_colours() {
        let (provider, _) = ScriptedProvider::new(vec![
            Ok(tool_reply("", "create_bar_chart", bar_args("fd"))),
            Ok(ModelReply::text("Hier is je staafgrafiek.")),
        ]);
        let bus = Arc::new(EventBus::new(64));
        let (agent, _dir) = agent_with(Box::new(provider), bus.clone());

        let response = agent
            .process("Maak een staafgrafiek: Q1=100, Q2=150", &Conversation::new(), None)
            .await;

        assert!(response.success);
        assert_eq!(response.message, "Hier is je staafgrafiek.");
        let chart = response.chart_data.unwrap();
        assert_eq!(chart.labels(), ["Q1", "Q2"]);
        assert_eq!(chart.values(), [100.0, 150.0]);
        assert_eq!(chart.colors().primary, "#379596");
        assert_eq!(chart.colors().background, "#ffeadb");
        assert!(response.chart_path.unwrap().ends_with(".svg"));

        let metrics = bus.get_metrics().await;
        assert_eq!(metrics.requests_completed, 1);
        assert_eq!(metrics.charts_rendered, 1);
        assert_eq!(metrics.charts_saved, 1);
    }

    #[tokio::test]
    async fn test_bnr_colours() {
        let (provider, _) = ScriptedProvider::new(vec![
            Ok(tool_reply("", "create_bar_chart", bar_args("bnr"))),
            Ok(ModelReply::text("Klaar.")),
        ]);
        let (agent, _dir) = agent_with(Box::new(provider), Arc::new(EventBus::new(64)));

        let response = agent.process("in BNR kleuren", &Conversation::new(), None).await;
        let chart = response.chart_data.unwrap();
        assert_eq!(chart.colors().primary, "#ffd200");
        assert_eq!(chart.colors().background, "#fff");
    }

    #[tokio::test]
    async fn test_refusal_is_a_successful_response() {
        let (provider, _) = ScriptedProvider::new(vec![Ok(ModelReply::text(
            "Ik kan alleen staaf- en lijngrafieken maken.",
        ))]);
        let (agent, dir) = agent_with(Box::new(provider), Arc::new(EventBus::new(64)));

        let response = agent.process("Wat is het weer vandaag?", &Conversation::new(), None).await;

        assert!(response.success);
        assert!(response.chart_data.is_none());
        assert!(response.chart_path.is_none());
        assert!(response.error.is_none());
        assert_eq!(response.message, "Ik kan alleen staaf- en lijngrafieken maken.");
        assert!(!dir.path().exists() || std::fs::read_dir(dir.path()).unwrap().count() == 0);
    }

    #[tokio::test]
    async fn test_transport_error_fails_the_request() {
        let (provider, _) = ScriptedProvider::new(vec![Err(anyhow::anyhow!("connection refused"))]);
        let bus = Arc::new(EventBus::new(64));
        let (agent, _dir) = agent_with(Box::new(provider), bus.clone());

        let response = agent.process("Maak een grafiek", &Conversation::new(), None).await;

        assert!(!response.success);
        assert_eq!(response.message, FAILURE_MESSAGE);
        assert!(response.error.unwrap().contains("connection refused"));
        assert!(response.chart_data.is_none());
        assert_eq!(bus.get_metrics().await.requests_failed, 1);
    }

    #[tokio::test]
    async fn test_step_limit_is_respected() {
        let bus = Arc::new(EventBus::new(256));
        let (agent, _dir) = agent_with(Box::new(LoopingProvider), bus.clone());

        let response = agent.process("Maak een grafiek", &Conversation::new(), None).await;

        assert!(response.success);
        assert_eq!(response.message, CHART_CREATED_MESSAGE);
        assert!(response.chart_data.is_some());
        let metrics = bus.get_metrics().await;
        assert_eq!(metrics.total_api_calls, 5);
        assert_eq!(metrics.charts_rendered, 5);
    }

    #[tokio::test]
    async fn test_last_successful_chart_wins() {
        let (provider, _) = ScriptedProvider::new(vec![
            Ok(tool_reply("", "create_bar_chart", bar_args("fd"))),
            Ok(tool_reply(
                "",
                "create_line_chart",
                json!({"labels": ["Jan", "Feb"], "values": [5, 7], "title": "Temperatuur", "colorScheme": "bnr"}),
            )),
            Ok(tool_reply(
                "",
                "create_bar_chart",
                json!({"labels": ["a", "b"], "values": [1], "title": "kapot", "colorScheme": "fd"}),
            )),
            Ok(ModelReply::text("Twee grafieken gemaakt.")),
        ]);
        let (agent, _dir) = agent_with(Box::new(provider), Arc::new(EventBus::new(64)));

        let response = agent.process("twee grafieken", &Conversation::new(), None).await;
        let chart = response.chart_data.unwrap();
        assert_eq!(chart.title(), "Temperatuur");
        assert_eq!(chart.labels(), ["Jan", "Feb"]);
    }

    #[tokio::test]
    async fn test_tool_errors_are_fed_back_to_the_model() {
        let (provider, seen) = ScriptedProvider::new(vec![
            Ok(tool_reply(
                "",
                "create_bar_chart",
                json!({"labels": ["a", "b"], "values": [1], "title": "x", "colorScheme": "fd"}),
            )),
            Ok(ModelReply::text("De data klopt niet: er zijn meer labels dan waarden.")),
        ]);
        let bus = Arc::new(EventBus::new(64));
        let (agent, _dir) = agent_with(Box::new(provider), bus.clone());

        let response = agent.process("Maak een grafiek", &Conversation::new(), None).await;

        assert!(response.success);
        assert!(response.chart_data.is_none());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        match seen[1].last() {
            Some(ChatMessage::Tool { content, .. }) => {
                let content: Value = serde_json::from_str(content).unwrap();
                assert_eq!(content["success"], false);
            }
            other => panic!("expected a tool result, got {:?}", other),
        }
        assert_eq!(bus.get_metrics().await.tool_failures, 1);
    }

    #[tokio::test]
    async fn test_history_and_preference_reach_the_model() {
        let (provider, seen) = ScriptedProvider::new(vec![Ok(ModelReply::text("Prima."))]);
        let (agent, _dir) = agent_with(Box::new(provider), Arc::new(EventBus::new(64)));

        let spec = crate::chart_spec::ChartCandidate {
            labels: vec!["Q1".to_string()],
            values: vec![1.0],
            title: "Eerder".to_string(),
            unit: None,
            chart_type: "bar".to_string(),
            color_scheme: "bnr".to_string(),
        }
        .validate()
        .unwrap();
        let mut conversation = Conversation::new();
        conversation.record(
            "Hallo",
            &AgentResponse {
                message: "Hoi! Welke grafiek wil je?".to_string(),
                chart_data: Some(spec),
                chart_path: None,
                success: true,
                error: None,
            },
        );
        agent
            .process("Een lijngrafiek graag", &conversation, Some(r#"{"labels":["Jan"]}"#))
            .await;

        let seen = seen.lock().unwrap();
        let sent = &seen[0];
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], ChatMessage::User("Hallo".to_string()));
        match &sent[2] {
            ChatMessage::User(content) => {
                assert!(content.starts_with("<user_request>Een lijngrafiek graag</user_request>"));
                assert!(content.contains("<excel_data>"));
                assert!(content.contains("<color_preference>bnr (BNR)</color_preference>"));
            }
            other => panic!("expected the user turn, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_closing_text_after_chart_uses_created_message() {
        let (provider, _) = ScriptedProvider::new(vec![
            Ok(tool_reply("", "create_bar_chart", bar_args("fd"))),
            Ok(ModelReply::text("")),
        ]);
        let (agent, _dir) = agent_with(Box::new(provider), Arc::new(EventBus::new(64)));

        let response = agent.process("Maak een grafiek", &Conversation::new(), None).await;

        assert!(response.success);
        assert!(response.chart_data.is_some());
        assert_eq!(response.message, CHART_CREATED_MESSAGE);
    }

    #[tokio::test]
    async fn test_empty_closing_text_keeps_earlier_narration() {
        let (provider, _) = ScriptedProvider::new(vec![
            Ok(tool_reply("Ik maak de grafiek.", "create_bar_chart", bar_args("fd"))),
            Ok(ModelReply::text("   ")),
        ]);
        let (agent, _dir) = agent_with(Box::new(provider), Arc::new(EventBus::new(64)));

        let response = agent.process("Maak een grafiek", &Conversation::new(), None).await;
        assert_eq!(response.message, "Ik maak de grafiek.");
    }

    #[tokio::test]
    async fn test_empty_reply_without_chart_is_never_blank() {
        let (provider, _) = ScriptedProvider::new(vec![Ok(ModelReply::text(""))]);
        let (agent, _dir) = agent_with(Box::new(provider), Arc::new(EventBus::new(64)));

        let response = agent.process("Hallo", &Conversation::new(), None).await;

        assert!(response.success);
        assert!(response.chart_data.is_none());
        assert_eq!(response.message, EMPTY_REPLY_MESSAGE);
    }

    #[test]
    fn test_response_serialises_camel_case() {
        let response = AgentResponse::failed("boom".to_string());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "boom");
        assert!(value.get("chartData").is_none());
    }
}
