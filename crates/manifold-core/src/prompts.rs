//! Built-in prompt templates and their rendering.
//!
//! Templates use `<<NAME>>` placeholders. The rendered template becomes the
//! system message placed in front of the run history.

use chrono::Local;

use crate::message::Message;
use crate::team::Team;

const COORDINATOR: &str = include_str!("../prompts/coordinator.md");
const PLANNER: &str = include_str!("../prompts/planner.md");
const SUPERVISOR: &str = include_str!("../prompts/supervisor.md");
const REPORTER: &str = include_str!("../prompts/reporter.md");
const RESEARCHER: &str = include_str!("../prompts/researcher.md");
const CODER: &str = include_str!("../prompts/coder.md");
const BROWSER: &str = include_str!("../prompts/browser.md");
const EXECUTOR: &str = include_str!("../prompts/executor.md");

/// Template for a role or team member; unknown members get the generic
/// executor template.
pub fn template(name: &str) -> &'static str {
    match name {
        "coordinator" => COORDINATOR,
        "planner" => PLANNER,
        "supervisor" => SUPERVISOR,
        "reporter" => REPORTER,
        "researcher" => RESEARCHER,
        "coder" => CODER,
        "browser" => BROWSER,
        _ => EXECUTOR,
    }
}

/// Values substituted into a template.
#[derive(Debug, Clone)]
pub struct PromptVars {
    pub agent_name: String,
    pub team_members: String,
    pub team_member_names: String,
    pub current_time: String,
}

impl PromptVars {
    pub fn new(agent_name: &str, team: Option<&Team>) -> Self {
        let (team_members, team_member_names) = match team {
            Some(team) => (
                team.members()
                    .iter()
                    .map(|m| format!("- **`{}`**: {}", m.name, m.description))
                    .collect::<Vec<_>>()
                    .join("\n"),
                team.names()
                    .iter()
                    .map(|n| format!("\"{n}\""))
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            None => (String::new(), String::new()),
        };
        Self {
            agent_name: agent_name.to_string(),
            team_members,
            team_member_names,
            current_time: Local::now().format("%a %b %d %Y %H:%M:%S %z").to_string(),
        }
    }
}

/// Substitute every known placeholder in `template`.
pub fn render(template: &str, vars: &PromptVars) -> String {
    template
        .replace("<<CURRENT_TIME>>", &vars.current_time)
        .replace("<<TEAM_MEMBERS>>", &vars.team_members)
        .replace("<<TEAM_MEMBER_NAMES>>", &vars.team_member_names)
        .replace("<<AGENT_NAME>>", &vars.agent_name)
}

/// Render the named template and put it in front of `history`.
pub fn apply_prompt_template(name: &str, history: &[Message], team: Option<&Team>) -> Vec<Message> {
    let vars = PromptVars::new(name, team);
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(render(template(name), &vars)));
    messages.extend_from_slice(history);
    messages
}
