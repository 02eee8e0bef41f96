//! Reasoning decision engine.
//!
//! Asks the oracle what the session should do next and turns its free-text
//! reply into a [`Decision`]. Replies go through a left-to-right pipeline of
//! parsers, each returning `Option<Decision>`:
//!
//! 1. labeled `ACTION_TYPE` / `REASONING` / `DETAILS` fields,
//! 2. a keyword scan of the raw text,
//! 3. default [`Decision::Finalize`].
//!
//! Oracle errors skip straight to the default. Every decision is logged on
//! the session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use regscope_core::config::ReasoningConfig;
use regscope_core::session::{AnalysisSession, DecisionSource, ReasoningLogEntry};
use regscope_core::tool::ToolDescriptor;
use tracing::{debug, info, warn};

use crate::oracle::{CompletionRequest, Oracle};

pub const DEFAULT_QUESTION: &str =
    "Which jurisdictions and user groups is this feature intended for?";

const SYSTEM_PROMPT: &str = "\
You are the planning step of a legal compliance analysis. Each turn you choose exactly one \
next action: call one jurisdiction search tool, ask the user a clarifying question, or \
finalize the analysis.

Reply in exactly this format:
ACTION_TYPE: CALL_TOOL | REQUEST_CLARIFICATION | FINALIZE
REASONING: one or two sentences
DETAILS: for CALL_TOOL the tool name, optionally followed by `| FOCUS: <query>`; \
for REQUEST_CLARIFICATION the question to ask; for FINALIZE leave empty.

Only call tools from the list provided. Do not call a tool that was already called. \
Finalize once every relevant jurisdiction has been searched.";

/// What the session should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    CallTool { tool: String, focus: Option<String> },
    RequestClarification { question: String },
    Finalize,
}

impl Decision {
    /// Reasoning-log action: the tool name, `clarify`, or `finalize`.
    pub fn action_label(&self) -> &str {
        match self {
            Self::CallTool { tool, .. } => tool,
            Self::RequestClarification { .. } => "clarify",
            Self::Finalize => "finalize",
        }
    }
}

/// A decision together with the text that justified it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub decision: Decision,
    pub reasoning: String,
}

type Parser = fn(&str, &[ToolDescriptor]) -> Option<Parsed>;

const PIPELINE: &[(DecisionSource, Parser)] = &[
    (DecisionSource::Structured, parse_structured),
    (DecisionSource::Keyword, parse_keywords),
];

/// Run the parser pipeline over `text`. Always yields a decision.
pub fn parse_decision(text: &str, tools: &[ToolDescriptor]) -> (Parsed, DecisionSource) {
    for (source, parser) in PIPELINE {
        if let Some(parsed) = parser(text, tools) {
            return (parsed, *source);
        }
    }
    (
        Parsed {
            decision: Decision::Finalize,
            reasoning: "no parseable decision in oracle reply; finalizing".into(),
        },
        DecisionSource::Default,
    )
}

/// Resolve a tool reference: exact name, then case-insensitive, then by jurisdiction.
pub fn resolve_tool<'a>(name: &str, tools: &'a [ToolDescriptor]) -> Option<&'a ToolDescriptor> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    tools
        .iter()
        .find(|t| t.name == name)
        .or_else(|| tools.iter().find(|t| t.name.eq_ignore_ascii_case(name)))
        .or_else(|| tools.iter().find(|t| t.jurisdiction.eq_ignore_ascii_case(name)))
}

const LABELS: &[&str] = &["ACTION_TYPE", "REASONING", "DETAILS"];

/// Split `LABEL: value` lines into fields; unlabeled lines continue the
/// previous field.
fn labeled_fields(text: &str) -> HashMap<&'static str, String> {
    let mut fields: HashMap<&'static str, String> = HashMap::new();
    let mut current: Option<&'static str> = None;
    for line in text.lines() {
        let stripped = line.trim().trim_start_matches(['*', '-', '#', ' ']);
        let labeled = LABELS.iter().find_map(|label| {
            let head = stripped.get(..label.len())?;
            if !head.eq_ignore_ascii_case(label) {
                return None;
            }
            let rest = stripped[label.len()..].trim_start_matches('*').trim_start();
            rest.strip_prefix(':').map(|value| (*label, value))
        });
        match labeled {
            Some((label, value)) => {
                let value = value.trim().trim_matches('*').trim();
                fields.insert(label, value.to_string());
                current = Some(label);
            }
            None => {
                if let Some(label) = current
                    && let Some(field) = fields.get_mut(label)
                    && !line.trim().is_empty()
                {
                    if !field.is_empty() {
                        field.push(' ');
                    }
                    field.push_str(line.trim());
                }
            }
        }
    }
    fields
}

fn normalize_action(raw: &str) -> String {
    raw.split(|c: char| c == '|' || c == ',' || c == '.')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_uppercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Split `DETAILS` into a tool reference and optional focus query.
fn split_tool_details(details: &str) -> (String, Option<String>) {
    let lower = details.to_ascii_lowercase();
    let (tool_part, focus_part) = if let Some(idx) = details.find('|') {
        (&details[..idx], Some(&details[idx + 1..]))
    } else if let Some(idx) = lower.find("focus:") {
        (&details[..idx], Some(&details[idx..]))
    } else {
        (details, None)
    };

    // Drop a leading `TOOL:` / `tool_name:` label when present.
    let tool_part = tool_part.trim();
    let tool_name = match tool_part.split_once(':') {
        Some((label, rest)) if is_tool_label(label) => rest,
        _ => tool_part,
    };
    let tool_name = tool_name
        .trim()
        .trim_matches(|c: char| c == '`' || c == '"' || c == '\'' || c == '*')
        .trim()
        .to_string();

    let focus = focus_part
        .map(|f| {
            let f = f.trim();
            let f = match f.get(..6) {
                Some(head) if head.eq_ignore_ascii_case("focus:") => &f[6..],
                _ => f,
            };
            f.trim().trim_matches('"').trim().to_string()
        })
        .filter(|f| !f.is_empty());
    (tool_name, focus)
}

fn is_tool_label(label: &str) -> bool {
    matches!(
        label.trim().to_ascii_lowercase().as_str(),
        "tool" | "tool_name" | "tool name" | "name"
    )
}

/// Parser 1: labeled fields.
pub fn parse_structured(text: &str, tools: &[ToolDescriptor]) -> Option<Parsed> {
    let fields = labeled_fields(text);
    let action = normalize_action(fields.get("ACTION_TYPE")?);
    let reasoning = fields.get("REASONING").cloned().unwrap_or_default();
    let details = fields.get("DETAILS").cloned().unwrap_or_default();

    let decision = match action.as_str() {
        "CALL_TOOL" | "TOOL_CALL" | "CALL" | "SEARCH" | "USE_TOOL" => {
            let (name, focus) = split_tool_details(&details);
            let tool = resolve_tool(&name, tools)?;
            Decision::CallTool {
                tool: tool.name.clone(),
                focus,
            }
        }
        "REQUEST_CLARIFICATION" | "CLARIFICATION" | "CLARIFY" | "ASK_USER" => {
            let question = if !details.is_empty() {
                details
            } else if reasoning.trim_end().ends_with('?') {
                reasoning.clone()
            } else {
                DEFAULT_QUESTION.to_string()
            };
            Decision::RequestClarification { question }
        }
        "FINALIZE" | "FINALISE" | "FINAL" | "COMPLETE" | "DONE" => Decision::Finalize,
        _ => return None,
    };
    Some(Parsed {
        decision,
        reasoning,
    })
}

const TOOL_VERBS: &[&str] = &["call", "search", "use", "query", "invoke", "run", "check"];
const FINALIZE_WORDS: &[&str] = &[
    "final", "finalize", "finalise", "complete", "completed", "sufficient", "done",
];

/// Parser 2: keyword scan over the raw reply.
///
/// Keywords match whole words. Finalize wording wins over a tool mention so
/// a reply summarizing earlier calls ends the loop.
pub fn parse_keywords(text: &str, tools: &[ToolDescriptor]) -> Option<Parsed> {
    let lower = text.to_lowercase();
    let reasoning = first_sentence(text);

    if lower.contains("clarif") || lower.contains("ask the user") {
        let question = text
            .split_inclusive(['?', '.', '!', '\n'])
            .map(str::trim)
            .find(|s| s.ends_with('?'))
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_QUESTION.to_string());
        return Some(Parsed {
            decision: Decision::RequestClarification { question },
            reasoning,
        });
    }

    if mentions_word(&lower, FINALIZE_WORDS) {
        return Some(Parsed {
            decision: Decision::Finalize,
            reasoning,
        });
    }

    if mentions_word(&lower, TOOL_VERBS) {
        let mentioned = tools
            .iter()
            .filter_map(|t| lower.find(&t.name.to_lowercase()).map(|pos| (pos, t)))
            .min_by_key(|(pos, _)| *pos);
        if let Some((_, tool)) = mentioned {
            return Some(Parsed {
                decision: Decision::CallTool {
                    tool: tool.name.clone(),
                    focus: None,
                },
                reasoning,
            });
        }
    }
    None
}

fn mentions_word(text: &str, words: &[&str]) -> bool {
    let body = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{body})\b")).is_ok_and(|re| re.is_match(text))
}

fn first_sentence(text: &str) -> String {
    let trimmed = text.trim();
    let end = trimmed
        .find(['.', '\n'])
        .map(|i| i + 1)
        .unwrap_or(trimmed.len());
    trimmed[..end].trim().to_string()
}

/// Prompt listing context, tools, history, findings and remaining budget.
pub fn build_decision_prompt(session: &AnalysisSession, tools: &[ToolDescriptor]) -> String {
    let mut prompt = String::new();
    prompt.push_str("FEATURE CONTEXT\n");
    prompt.push_str(&session.enriched_context.summary());

    prompt.push_str("\n\nAVAILABLE TOOLS\n");
    if tools.is_empty() {
        prompt.push_str("(none available; finalize or ask for clarification)\n");
    }
    for tool in tools {
        prompt.push_str(&tool.prompt_line());
        prompt.push('\n');
    }

    prompt.push_str("\nREASONING SO FAR\n");
    if session.reasoning_log.is_empty() {
        prompt.push_str("(first step)\n");
    }
    for entry in &session.reasoning_log {
        prompt.push_str(&format!(
            "- iteration {}: {} ({})\n",
            entry.iteration, entry.action, entry.reasoning
        ));
    }
    let called = session.tools_called();
    if !called.is_empty() {
        prompt.push_str(&format!("Tools already called: {}\n", called.join(", ")));
    }

    prompt.push_str("\nFINDINGS SO FAR\n");
    if session.collected_findings.is_empty() {
        prompt.push_str("(none)\n");
    }
    for f in &session.collected_findings {
        prompt.push_str(&format!(
            "- {}: compliance {}, risk {}/5, confidence {:.2}\n",
            f.jurisdiction,
            if f.compliance_required { "required" } else { "not required" },
            f.risk_level,
            f.confidence
        ));
    }

    prompt.push_str(&format!(
        "\nThis is iteration {} of {}. Iterations remaining after this one: {}.\n",
        session.iteration_count(),
        session.iteration_cap(),
        session.remaining_iterations()
    ));
    prompt
}

pub struct DecisionEngine {
    oracle: Option<Arc<dyn Oracle>>,
    max_tokens: u32,
    temperature: f32,
}

impl DecisionEngine {
    pub fn new(config: &ReasoningConfig) -> Self {
        Self {
            oracle: None,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Choose the next action and append it to the session's reasoning log.
    pub async fn decide_next_action(
        &self,
        session: &mut AnalysisSession,
        tools: &[ToolDescriptor],
    ) -> Decision {
        let start = Instant::now();
        let iteration = session.iteration_count();

        let (parsed, source) = match &self.oracle {
            None => (
                Parsed {
                    decision: Decision::Finalize,
                    reasoning: "no reasoning oracle configured; finalizing".into(),
                },
                DecisionSource::Default,
            ),
            Some(oracle) => {
                let prompt = build_decision_prompt(session, tools);
                debug!(session_id = %session.session_id, iteration, prompt = %prompt, "decision prompt");
                let request = CompletionRequest::new(prompt)
                    .with_system(SYSTEM_PROMPT)
                    .with_limits(self.max_tokens, self.temperature);
                match oracle.complete(&request).await {
                    Ok(completion) => parse_decision(&completion.content, tools),
                    Err(e) => {
                        warn!(session_id = %session.session_id, iteration, error = %e, "decision oracle failed");
                        (
                            Parsed {
                                decision: Decision::Finalize,
                                reasoning: format!("oracle error: {e}; finalizing"),
                            },
                            DecisionSource::Default,
                        )
                    }
                }
            }
        };

        let elapsed = start.elapsed();
        info!(
            session_id = %session.session_id,
            iteration,
            action = parsed.decision.action_label(),
            source = ?source,
            elapsed_ms = elapsed.as_millis() as u64,
            "decision"
        );
        session.log(ReasoningLogEntry::new(
            iteration,
            parsed.decision.action_label(),
            parsed.reasoning,
            source,
            elapsed.as_secs_f64(),
        ));
        parsed.decision
    }
}
