//! The default executor agent: an optional lookup, an optional bounded tool
//! loop, then a prompted generation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ServiceResult;
use crate::message::Message;
use crate::prompts::apply_prompt_template;
use crate::roles::ExecutorTurn;
use crate::services::{Capability, DecisionService, ExecutorAgent, GenerationService};

/// Heading placed above lookup output appended to the executor prompt.
pub const LOOKUP_RESULTS_HEADING: &str = "# Lookup Results";

/// Action name that ends the tool loop.
pub const ANSWER_ACTION: &str = "answer";

/// One tool-loop decision.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolAction {
    pub action: String,
    #[serde(default)]
    pub input: Value,
}

/// Schema handed to the decision service for one tool-loop step.
pub fn tool_action_schema(tools: &[&str]) -> Value {
    let mut actions: Vec<&str> = tools.to_vec();
    actions.push(ANSWER_ACTION);
    json!({
        "type": "object",
        "properties": {
            "action": {"type": "string", "enum": actions},
            "input": {"type": "object"},
        },
        "required": ["action"],
        "additionalProperties": false,
    })
}

fn tool_menu(tools: &[&Arc<dyn Capability>]) -> String {
    let mut menu = String::from(
        "# Tools\n\nCall one tool at a time before writing your answer. Reply with \
         {\"action\": <tool name>, \"input\": {...}} to call a tool, or \
         {\"action\": \"answer\"} once you have everything you need.\n",
    );
    for tool in tools {
        menu.push_str(&format!("\n- {}: {}", tool.name(), tool.description()));
    }
    menu
}

struct ToolLoop {
    chooser: Arc<dyn DecisionService>,
    max_steps: u32,
}

/// Executor agent driven by the member's prompt template.
///
/// When a lookup capability is configured, it is called with the latest user
/// text first and its output is appended to the last prompt message. When a
/// tool loop is configured, the decision service then picks up to
/// `max_steps` calls among the remaining capabilities; every call and its
/// result is shown to the final generation.
pub struct PromptedExecutor {
    name: String,
    generator: Arc<dyn GenerationService>,
    lookup: Option<String>,
    tools: Option<ToolLoop>,
}

impl PromptedExecutor {
    pub fn new(name: impl Into<String>, generator: Arc<dyn GenerationService>) -> Self {
        Self {
            name: name.into(),
            generator,
            lookup: None,
            tools: None,
        }
    }

    pub fn with_lookup(mut self, capability: impl Into<String>) -> Self {
        self.lookup = Some(capability.into());
        self
    }

    pub fn with_tools(mut self, chooser: Arc<dyn DecisionService>, max_steps: u32) -> Self {
        self.tools = Some(ToolLoop { chooser, max_steps });
        self
    }

    /// Run the tool loop and return the call transcript.
    async fn use_tools(
        &self,
        tool_loop: &ToolLoop,
        prompt: &[Message],
        turn: &ExecutorTurn<'_>,
    ) -> ServiceResult<Vec<Message>> {
        let tools: Vec<&Arc<dyn Capability>> = turn
            .capabilities()
            .iter()
            .filter(|c| self.lookup.as_deref() != Some(c.name()))
            .collect();
        if tools.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<&str> = tools.iter().map(|c| c.name()).collect();
        let schema = tool_action_schema(&names);
        let menu = Message::user(tool_menu(&tools));

        let mut transcript = Vec::new();
        for step in 1..=tool_loop.max_steps {
            let mut request = prompt.to_vec();
            request.push(menu.clone());
            request.extend(transcript.iter().cloned());

            let raw = tool_loop.chooser.decide(&request, &schema).await?;
            let action: ToolAction = match serde_json::from_value(raw.clone()) {
                Ok(action) => action,
                Err(e) => {
                    warn!(agent = %self.name, error = %e, decision = %raw, "unreadable tool action, answering");
                    break;
                }
            };
            if action.action == ANSWER_ACTION {
                break;
            }
            if !names.contains(&action.action.as_str()) {
                warn!(agent = %self.name, action = %action.action, "tool not available, answering");
                break;
            }

            let output = turn.call(&action.action, action.input.clone()).await?;
            debug!(agent = %self.name, step, tool = %action.action, chars = output.len(), "tool call complete");
            transcript.push(Message::assistant(
                json!({ "action": action.action, "input": action.input }).to_string(),
            ));
            transcript.push(Message::user(format!(
                "Result of {}:\n\n{output}",
                action.action
            )));
        }
        Ok(transcript)
    }
}

#[async_trait]
impl ExecutorAgent for PromptedExecutor {
    async fn invoke(&self, messages: &[Message], turn: &ExecutorTurn<'_>) -> ServiceResult<String> {
        let mut prompt = apply_prompt_template(&self.name, messages, None);

        if let Some(capability) = &self.lookup {
            let query = turn.request().unwrap_or_default();
            let found = turn.call(capability, json!({ "query": query })).await?;
            debug!(agent = %self.name, %capability, chars = found.len(), "lookup complete");
            if let Some(last) = prompt.last_mut() {
                last.append_text(&format!("\n\n{LOOKUP_RESULTS_HEADING}\n\n{found}"));
            }
        }

        if let Some(tool_loop) = &self.tools {
            let transcript = self.use_tools(tool_loop, &prompt, turn).await?;
            prompt.extend(transcript);
        }

        let chunks = self.generator.stream(&prompt).await?;
        turn.stream(chunks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{self, TurnContext};
    use crate::events::ExecutionEventKind;
    use crate::fakes::{ScriptedDecider, ScriptedGenerator, StaticCapability};
    use crate::team::RoleId;

    fn coder_turn(bus: bus::EventBus) -> TurnContext {
        TurnContext::new(bus, RoleId::Executor("coder".into()), 2)
    }

    #[tokio::test]
    async fn test_streams_generation_with_member_prompt() {
        let (bus, _rx) = bus::channel(16);
        let turn = coder_turn(bus);
        let generator = Arc::new(ScriptedGenerator::new().reply(&["2+2", " = 4"]));
        let agent = PromptedExecutor::new("coder", generator.clone());

        let tools: Vec<Arc<dyn Capability>> = Vec::new();
        let out = agent
            .invoke(&[Message::user("2+2?")], &ExecutorTurn::new(&turn, &tools))
            .await
            .unwrap();

        assert_eq!(out, "2+2 = 4");
        let prompt = &generator.prompts()[0];
        assert!(prompt[0].text().contains("software engineer"));
    }

    #[tokio::test]
    async fn test_lookup_uses_request_text() {
        let (bus, mut rx) = bus::channel(16);
        let turn = TurnContext::new(bus, RoleId::Executor("researcher".into()), 2);
        let generator = Arc::new(ScriptedGenerator::new().reply(&["summary"]));
        let agent = PromptedExecutor::new("researcher", generator.clone()).with_lookup("web_search");
        let search = Arc::new(StaticCapability::ok("web_search", "[]"));
        let tools: Vec<Arc<dyn Capability>> = vec![search.clone()];

        let history = [
            Message::user("rust 2024"),
            Message::user("Response from coder").named("coder"),
        ];
        let toolbox = ExecutorTurn::new(&turn, &tools).with_request(Some("rust 2024".into()));
        agent.invoke(&history, &toolbox).await.unwrap();
        drop(turn);

        assert_eq!(search.calls(), vec![json!({"query": "rust 2024"})]);
        let prompt = &generator.prompts()[0];
        assert!(prompt.last().unwrap().text().ends_with("# Lookup Results\n\n[]"));
        assert!(matches!(
            rx.recv().await.unwrap().kind,
            ExecutionEventKind::CapabilityStart { .. }
        ));
    }

    #[tokio::test]
    async fn test_tool_loop_calls_chosen_tools_then_answers() {
        let (bus, _rx) = bus::channel(64);
        let turn = coder_turn(bus);
        let generator = Arc::new(ScriptedGenerator::new().reply(&["saved sum.py"]));
        let chooser = Arc::new(ScriptedDecider::values(vec![
            json!({"action": "list_directory", "input": {}}),
            json!({"action": "write_file", "input": {"file_path": "sum.py", "text": "print(4)"}}),
            json!({"action": "answer"}),
        ]));
        let list = Arc::new(StaticCapability::ok("list_directory", "README.md"));
        let write = Arc::new(StaticCapability::ok("write_file", "File written successfully to sum.py."));
        let tools: Vec<Arc<dyn Capability>> = vec![list.clone(), write.clone()];
        let agent = PromptedExecutor::new("coder", generator.clone()).with_tools(chooser.clone(), 5);

        let out = agent
            .invoke(&[Message::user("save a sum script")], &ExecutorTurn::new(&turn, &tools))
            .await
            .unwrap();

        assert_eq!(out, "saved sum.py");
        assert_eq!(chooser.calls(), 3);
        assert_eq!(list.calls(), vec![json!({})]);
        assert_eq!(write.calls(), vec![json!({"file_path": "sum.py", "text": "print(4)"})]);

        let prompt = &generator.prompts()[0];
        let tail: Vec<String> = prompt.iter().rev().take(2).map(Message::text).collect();
        assert_eq!(tail[0], "Result of write_file:\n\nFile written successfully to sum.py.");
        assert!(tail[1].contains("\"write_file\""));
    }

    #[tokio::test]
    async fn test_tool_loop_is_bounded() {
        let (bus, _rx) = bus::channel(64);
        let turn = coder_turn(bus);
        let generator = Arc::new(ScriptedGenerator::new().reply(&["done"]));
        let chooser = Arc::new(ScriptedDecider::values(vec![
            json!({"action": "list_directory"}),
        ]));
        let list = Arc::new(StaticCapability::ok("list_directory", "a.txt"));
        let tools: Vec<Arc<dyn Capability>> = vec![list.clone()];
        let agent = PromptedExecutor::new("coder", generator).with_tools(chooser, 2);

        agent
            .invoke(&[Message::user("look")], &ExecutorTurn::new(&turn, &tools))
            .await
            .unwrap();
        assert_eq!(list.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_action_ends_loop() {
        let (bus, _rx) = bus::channel(64);
        let turn = coder_turn(bus);
        let generator = Arc::new(ScriptedGenerator::new().reply(&["answer anyway"]));
        let chooser = Arc::new(ScriptedDecider::values(vec![json!({"action": "python_repl"})]));
        let list = Arc::new(StaticCapability::ok("list_directory", "a.txt"));
        let tools: Vec<Arc<dyn Capability>> = vec![list.clone()];
        let agent = PromptedExecutor::new("coder", generator).with_tools(chooser.clone(), 5);

        let out = agent
            .invoke(&[Message::user("run it")], &ExecutorTurn::new(&turn, &tools))
            .await
            .unwrap();
        assert_eq!(out, "answer anyway");
        assert_eq!(chooser.calls(), 1);
        assert!(list.calls().is_empty());
    }

    #[test]
    fn test_action_schema_lists_tools_and_answer() {
        let schema = tool_action_schema(&["read_file", "write_file"]);
        assert_eq!(
            schema["properties"]["action"]["enum"],
            json!(["read_file", "write_file", "answer"])
        );
    }
}
