//! Interactive chat loop.
//!
//! Reads lines, runs one agent turn per message and keeps reading while the
//! turn is in flight so the user can cancel it.

use std::collections::VecDeque;
use std::io::Write;

use agent_core::{Agent, AgentError, CancellationToken, ChatSession, TurnOutcome};

use crate::input::{Command, InputEvent, LineSource};

pub const PROMPT: &str = "You: ";

/// Print the welcome banner.
pub fn print_banner(out: &mut impl Write, model: &str, tools: &[&str]) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(out, "===== Interactive Task Assistant =====")?;
    writeln!(out, "Model: {model}")?;
    if tools.is_empty() {
        writeln!(out, "Tools: (none)")?;
    } else {
        writeln!(out, "Tools: {}", tools.join(", "))?;
    }
    writeln!(out, "Type 'exit' or 'quit' to end the conversation")?;
    writeln!(out, "Type 'clear' to clear conversation history")?;
    writeln!(out, "Press Ctrl+C to cancel a reply in progress")?;
    writeln!(out, "======================================")?;
    writeln!(out)
}

/// Run the chat until the user exits. Returns the session for inspection.
pub async fn run(
    agent: &Agent,
    input: &mut impl LineSource,
    out: &mut impl Write,
) -> anyhow::Result<ChatSession> {
    let mut session = ChatSession::new();
    let mut queued: VecDeque<String> = VecDeque::new();

    loop {
        let line = match queued.pop_front() {
            Some(line) => line,
            None => match input.next_event().await {
                InputEvent::Line(line) => line,
                InputEvent::Interrupted => {
                    writeln!(out, "(Press Ctrl+D or type 'exit' to quit.)")?;
                    continue;
                }
                InputEvent::Eof => break,
            },
        };

        let text = match Command::parse(&line) {
            Command::Empty => continue,
            Command::Exit => break,
            Command::Clear => {
                session.clear();
                writeln!(out, "Conversation history cleared.")?;
                continue;
            }
            Command::Message(text) => text,
        };

        let cancel = CancellationToken::new();
        let mut deferred: Option<Command> = None;
        let result = {
            let turn = session.submit(agent, &text, &cancel);
            tokio::pin!(turn);
            loop {
                tokio::select! {
                    biased;
                    result = &mut turn => break result,
                    event = input.next_event() => match event {
                        InputEvent::Interrupted => cancel.cancel(),
                        InputEvent::Eof => {
                            cancel.cancel();
                            deferred = Some(Command::Exit);
                        }
                        InputEvent::Line(line) => match Command::parse(&line) {
                            command @ (Command::Exit | Command::Clear) => {
                                cancel.cancel();
                                deferred = Some(command);
                            }
                            Command::Message(_) => queued.push_back(line),
                            Command::Empty => {}
                        },
                    },
                }
            }
        };

        match result {
            Ok(report) => match report.outcome {
                TurnOutcome::Answered(answer) => writeln!(out, "Assistant: {answer}")?,
                TurnOutcome::BudgetExceeded => writeln!(
                    out,
                    "Assistant: I could not finish within the step limit ({} steps). Try a simpler request.",
                    agent.config().max_steps
                )?,
                TurnOutcome::Cancelled => writeln!(out, "(Reply cancelled.)")?,
            },
            Err(e @ AgentError::LlmUnavailable { .. }) => {
                tracing::warn!(error = %e, "Turn failed");
                writeln!(out, "Error: {}", e.user_message())?;
                writeln!(out, "  ({e})")?;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Turn failed");
                writeln!(out, "Error: {}", e.user_message())?;
            }
        }

        match deferred {
            Some(Command::Exit) => break,
            Some(Command::Clear) => {
                session.clear();
                writeln!(out, "Conversation history cleared.")?;
            }
            _ => {}
        }
    }

    writeln!(out, "Ending conversation...")?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use agent_core::{
        AgentBuilder, LlmAdapter, LlmOutcome, Result, Role, ToolCallRequest, ToolDescriptor, Turn,
        TurnContent,
    };
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    /// Echoes the latest user message; "wait" never answers and "loop" always
    /// asks for a tool.
    struct EchoAdapter;

    #[async_trait]
    impl LlmAdapter for EchoAdapter {
        async fn query(
            &self,
            _system: &str,
            history: &[Turn],
            _catalog: &[ToolDescriptor],
        ) -> Result<LlmOutcome> {
            let last_user = history
                .iter()
                .rev()
                .find(|t| t.role() == Role::User)
                .and_then(Turn::text)
                .unwrap_or_default()
                .to_string();
            match last_user.as_str() {
                "wait" => std::future::pending().await,
                "loop" => Ok(LlmOutcome::ToolCall(ToolCallRequest {
                    name: "missing".into(),
                    arguments: json!({}),
                })),
                "down" => Err(AgentError::LlmUnavailable {
                    attempts: 3,
                    reason: "connection refused".into(),
                }),
                _ => Ok(LlmOutcome::Answer(format!("echo: {last_user}"))),
            }
        }
    }

    /// Replays events, each after its delay; EOF once exhausted.
    struct Script {
        events: VecDeque<(u64, InputEvent)>,
    }

    impl Script {
        fn new(events: Vec<(u64, InputEvent)>) -> Self {
            Self {
                events: events.into(),
            }
        }
    }

    impl LineSource for Script {
        async fn next_event(&mut self) -> InputEvent {
            let Some((delay, _)) = self.events.front() else {
                return InputEvent::Eof;
            };
            tokio::time::sleep(Duration::from_millis(*delay)).await;
            self.events
                .pop_front()
                .map_or(InputEvent::Eof, |(_, event)| event)
        }
    }

    fn line(text: &str) -> InputEvent {
        InputEvent::Line(text.into())
    }

    fn agent(max_steps: usize) -> Agent {
        AgentBuilder::new()
            .adapter(Arc::new(EchoAdapter))
            .max_steps(max_steps)
            .build()
            .unwrap()
    }

    async fn chat(agent: &Agent, events: Vec<(u64, InputEvent)>) -> (ChatSession, String) {
        let mut out = Vec::new();
        let session = run(agent, &mut Script::new(events), &mut out).await.unwrap();
        (session, String::from_utf8(out).unwrap())
    }

    fn user_texts(session: &ChatSession) -> Vec<String> {
        session
            .memory()
            .snapshot()
            .iter()
            .filter(|t| t.role() == Role::User)
            .filter_map(|t| match t.content() {
                TurnContent::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_answers_and_exits() {
        let (session, out) = chat(&agent(3), vec![(0, line("hi")), (0, line("QUIT"))]).await;
        assert!(out.contains("Assistant: echo: hi"));
        assert!(out.contains("Ending conversation..."));
        assert_eq!(session.turn_count(), 2);
    }

    #[tokio::test]
    async fn test_clear_between_turns() {
        let (session, out) = chat(
            &agent(3),
            vec![(0, line("one")), (0, line("clear")), (0, line("two"))],
        )
        .await;
        assert!(out.contains("Conversation history cleared."));
        assert_eq!(user_texts(&session), ["two"]);
    }

    #[tokio::test]
    async fn test_budget_exceeded_message() {
        let (_, out) = chat(&agent(2), vec![(0, line("loop"))]).await;
        assert!(out.contains("I could not finish within the step limit"));
    }

    #[tokio::test]
    async fn test_llm_unavailable_keeps_chatting() {
        let (session, out) = chat(&agent(3), vec![(0, line("down")), (0, line("after"))]).await;
        assert!(out.contains("Error: The AI service is currently unavailable."));
        assert!(out.contains("Assistant: echo: after"));
        assert_eq!(user_texts(&session), ["down", "after"]);
    }

    #[tokio::test]
    async fn test_interrupt_cancels_turn() {
        let (session, out) = chat(
            &agent(3),
            vec![(0, line("wait")), (20, InputEvent::Interrupted), (0, line("next"))],
        )
        .await;
        assert!(out.contains("(Reply cancelled.)"));
        assert!(out.contains("Assistant: echo: next"));
        assert_eq!(user_texts(&session), ["wait", "next"]);
    }

    #[tokio::test]
    async fn test_clear_mid_turn_cancels_then_clears() {
        let (session, out) = chat(
            &agent(3),
            vec![(0, line("wait")), (20, line("Clear")), (0, line("exit"))],
        )
        .await;
        assert!(out.contains("(Reply cancelled.)"));
        assert!(out.contains("Conversation history cleared."));
        assert!(session.memory().is_empty());
    }

    #[tokio::test]
    async fn test_lines_typed_mid_turn_are_queued() {
        let (session, out) = chat(
            &agent(3),
            vec![
                (0, line("wait")),
                (10, line("first")),
                (10, line("second")),
                (10, InputEvent::Interrupted),
            ],
        )
        .await;
        assert!(out.contains("Assistant: echo: first"));
        assert!(out.contains("Assistant: echo: second"));
        assert_eq!(user_texts(&session), ["wait", "first", "second"]);
    }

    #[tokio::test]
    async fn test_eof_mid_turn_exits() {
        let (session, out) = chat(&agent(3), vec![(0, line("wait"))]).await;
        assert!(out.contains("(Reply cancelled.)"));
        assert!(out.ends_with("Ending conversation...\n"));
        assert_eq!(session.turn_count(), 1);
    }
}
