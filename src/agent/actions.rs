use serde::{Deserialize, Serialize};

/// One primitive UI operation derived from a model response. Created fresh per
/// response, consumed once by the executor, never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Model-provided reasoning. Logged, never acted on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum ActionKind {
    /// Click target as fractions of screen width/height in [0,1].
    Click { x: f64, y: f64 },
    Write { content: String },
    Press { keys: Vec<String> },
    Done { summary: String },
}

impl Action {
    pub fn done(summary: impl Into<String>, thought: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Done {
                summary: summary.into(),
            },
            thought: Some(thought.into()),
        }
    }
}

/// Strip a markdown code fence (with or without a language tag) from both ends.
fn strip_code_fence(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```") {
        // drop the language tag up to the first newline, if any
        cleaned = match rest.split_once('\n') {
            Some((_, body)) => body,
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = cleaned.trim_end().strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Parses a raw model response into an ordered action list.
///
/// Tolerates markdown fencing and a single object in place of an array. A
/// response that is not JSON at all yields one synthetic `done` action so the
/// loop terminates instead of spinning on garbage. Elements with an unknown
/// `operation`, a malformed payload, or an empty `press` chord are skipped
/// with a warning; the rest of the batch still runs.
pub fn parse_actions(raw: &str) -> Vec<Action> {
    let cleaned = strip_code_fence(raw);

    let value: serde_json::Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, response = %raw, "model response was not valid JSON");
            return vec![Action::done(
                "Failed to parse model response",
                "The model response was not valid JSON.",
            )];
        }
    };

    let elements = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    let mut actions = Vec::with_capacity(elements.len());
    for element in elements {
        match serde_json::from_value::<Action>(element.clone()) {
            Ok(action) => {
                if let ActionKind::Press { keys } = &action.kind {
                    if keys.is_empty() {
                        tracing::warn!(element = %element, "press action with no keys, skipping");
                        continue;
                    }
                }
                actions.push(action);
            }
            Err(e) => {
                tracing::warn!(error = %e, element = %element, "unrecognized action, skipping");
            }
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_array() {
        let actions = parse_actions(
            r#"[{"operation": "click", "x": 0.5, "y": 0.25, "thought": "go"},
                {"operation": "write", "content": "hello"}]"#,
        );
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].kind, ActionKind::Click { x: 0.5, y: 0.25 });
        assert_eq!(actions[0].thought.as_deref(), Some("go"));
        assert_eq!(
            actions[1].kind,
            ActionKind::Write {
                content: "hello".into()
            }
        );
        assert_eq!(actions[1].thought, None);
    }

    #[test]
    fn fencing_is_transparent() {
        let bare = r#"[{"operation": "done", "summary": "Task complete"}]"#;
        let fenced_json = format!("```json\n{bare}\n```");
        let fenced_plain = format!("```\n{bare}\n```");
        assert_eq!(parse_actions(bare), parse_actions(&fenced_json));
        assert_eq!(parse_actions(bare), parse_actions(&fenced_plain));
        assert_eq!(parse_actions(bare).len(), 1);
    }

    #[test]
    fn single_object_is_wrapped() {
        let actions = parse_actions(r#"{"operation": "write", "content": "rm -rf /"}"#);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].kind,
            ActionKind::Write {
                content: "rm -rf /".into()
            }
        );
    }

    #[test]
    fn malformed_input_yields_one_done() {
        for garbage in ["not json at all", "", "```\nstill not json\n```", "[{]"] {
            let actions = parse_actions(garbage);
            assert_eq!(actions.len(), 1, "input: {garbage:?}");
            assert!(
                matches!(&actions[0].kind, ActionKind::Done { summary } if summary.contains("parse")),
                "input: {garbage:?}"
            );
        }
    }

    #[test]
    fn unknown_operation_is_skipped_not_fatal() {
        let actions = parse_actions(
            r#"[{"operation": "teleport", "x": 1},
                {"operation": "press", "keys": ["enter"]}]"#,
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].kind,
            ActionKind::Press {
                keys: vec!["enter".into()]
            }
        );
    }

    #[test]
    fn empty_press_chord_is_skipped() {
        let actions = parse_actions(
            r#"[{"operation": "press", "keys": []},
                {"operation": "done", "summary": "ok"}]"#,
        );
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0].kind, ActionKind::Done { .. }));
    }

    #[test]
    fn press_chord_order_is_preserved() {
        let actions =
            parse_actions(r#"[{"operation": "press", "keys": ["cmd", "space"], "thought": "open spotlight"}]"#);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].kind,
            ActionKind::Press {
                keys: vec!["cmd".into(), "space".into()]
            }
        );
    }

    #[test]
    fn fence_without_trailing_newline_still_parses() {
        let actions = parse_actions("```json[{\"operation\": \"done\", \"summary\": \"x\"}]```");
        assert_eq!(actions.len(), 1);
    }
}
