//! Projects one raw JSONL line into zero or more events of the closed
//! taxonomy the storage engine understands. Deterministic: identical bytes
//! always produce identical event sequences.

use crate::models::{ContentBlock, ContentValue, RawLine};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    User {
        uuid: String,
        content: String,
        timestamp: String,
        cwd: Option<String>,
        git_branch: Option<String>,
    },
    Assistant {
        uuid: String,
        content_blocks: Vec<AssistantBlock>,
        timestamp: String,
        model: Option<String>,
    },
    ToolUse {
        uuid: String,
        name: String,
        input: Value,
        timestamp: String,
    },
    ToolResult {
        uuid: String,
        tool_use_id: String,
        content: String,
        is_error: bool,
        timestamp: String,
    },
    Summary {
        content: String,
        timestamp: String,
        leaf_uuid: Option<String>,
    },
    System {
        uuid: String,
        subtype: Option<String>,
        content: Option<String>,
        timestamp: String,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssistantBlock {
    Text(String),
    ToolUse { id: String, name: String, input: Value },
}

/// `type` values `RawLine` knows how to deserialize. Anything else is an
/// unknown type, not malformed JSON, even though both fail the same
/// `serde_json::from_value::<RawLine>` call.
const KNOWN_TYPES: &[&str] = &["user", "assistant", "summary", "system", "progress", "queue-operation", "file-history-snapshot"];

/// Parse one trimmed, non-empty line into the events it represents. A line
/// may yield more than one event (an assistant turn with several content
/// blocks emits its own `Assistant` event plus one `ToolUse` companion per
/// tool-use block; a user turn carrying tool results emits one `ToolResult`
/// per result block). Malformed JSON or an unrecognized `type` never
/// propagates as an error — it becomes a single `Skipped` event, with a
/// reason that distinguishes the two: a structurally valid line with a
/// `type` outside `KNOWN_TYPES` (e.g. a bare top-level `tool_use`, which
/// this taxonomy only ever produces from inside an assistant/user content
/// block) is `"unknown type X"`, never `"malformed json"`.
pub fn parse_line(line: &str, line_number: u64) -> Vec<ParsedEvent> {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return vec![ParsedEvent::Skipped {
                reason: format!("malformed json at line {line_number}: {e}"),
            }]
        }
    };

    let type_tag = value.get("type").and_then(Value::as_str).map(str::to_string);

    let raw: RawLine = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            return match type_tag {
                Some(t) if !KNOWN_TYPES.contains(&t.as_str()) => vec![ParsedEvent::Skipped {
                    reason: format!("unknown type {t}"),
                }],
                _ => vec![ParsedEvent::Skipped {
                    reason: format!("malformed json at line {line_number}: {e}"),
                }],
            };
        }
    };

    match raw {
        RawLine::User(env) => parse_user(env),
        RawLine::Assistant(env) => parse_assistant(env),
        RawLine::Summary(env) => vec![ParsedEvent::Summary {
            content: env.summary,
            timestamp: normalize_timestamp(env.timestamp.as_deref().unwrap_or("")),
            leaf_uuid: env.leaf_uuid,
        }],
        RawLine::System(env) => vec![ParsedEvent::System {
            uuid: env.uuid,
            subtype: env.subtype,
            content: env.content,
            timestamp: normalize_timestamp(&env.timestamp),
        }],
        RawLine::Progress(_) => vec![ParsedEvent::Skipped {
            reason: "progress event".to_string(),
        }],
        RawLine::QueueOperation(_) => vec![ParsedEvent::Skipped {
            reason: "queue-operation event".to_string(),
        }],
        RawLine::FileHistorySnapshot(_) => vec![ParsedEvent::Skipped {
            reason: "file-history-snapshot event".to_string(),
        }],
    }
}

fn parse_user(env: crate::models::MessageEnvelope) -> Vec<ParsedEvent> {
    let timestamp = normalize_timestamp(&env.timestamp);
    match env.message.content {
        ContentValue::Text(text) => vec![ParsedEvent::User {
            uuid: env.uuid,
            content: text,
            timestamp,
            cwd: env.cwd,
            git_branch: env.git_branch,
        }],
        ContentValue::Blocks(blocks) => {
            let mut events = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => events.push(ParsedEvent::User {
                        uuid: env.uuid.clone(),
                        content: text,
                        timestamp: timestamp.clone(),
                        cwd: env.cwd.clone(),
                        git_branch: env.git_branch.clone(),
                    }),
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => events.push(ParsedEvent::ToolResult {
                        uuid: env.uuid.clone(),
                        tool_use_id,
                        content: stringify_tool_content(&content),
                        is_error,
                        timestamp: timestamp.clone(),
                    }),
                    // Thinking blocks and anything else are not part of the
                    // user-turn taxonomy; drop the block, not the event.
                    _ => {}
                }
            }
            if events.is_empty() {
                events.push(ParsedEvent::Skipped {
                    reason: format!("user event {} had no storable blocks", env.uuid),
                });
            }
            events
        }
    }
}

fn parse_assistant(env: crate::models::MessageEnvelope) -> Vec<ParsedEvent> {
    let timestamp = normalize_timestamp(&env.timestamp);
    let raw_blocks = match env.message.content {
        ContentValue::Text(text) => vec![ContentBlock::Text { text }],
        ContentValue::Blocks(blocks) => blocks,
    };

    let mut assistant_blocks = Vec::new();
    let mut companion_events = Vec::new();

    for block in raw_blocks {
        match block {
            ContentBlock::Text { text } => assistant_blocks.push(AssistantBlock::Text(text)),
            ContentBlock::ToolUse { id, name, input } => {
                assistant_blocks.push(AssistantBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });
                companion_events.push(ParsedEvent::ToolUse {
                    uuid: id,
                    name,
                    input,
                    timestamp: timestamp.clone(),
                });
            }
            // Thinking blocks are intentionally not indexed: no FTS entry,
            // no storage row. ToolResult blocks do not occur in assistant
            // turns.
            ContentBlock::Thinking { .. } | ContentBlock::ToolResult { .. } => {}
        }
    }

    if assistant_blocks.is_empty() {
        return vec![ParsedEvent::Skipped {
            reason: format!("assistant event {} had no storable blocks", env.uuid),
        }];
    }

    let mut out = vec![ParsedEvent::Assistant {
        uuid: env.uuid,
        content_blocks: assistant_blocks,
        timestamp,
        model: env.message.model,
    }];
    out.extend(companion_events);
    out
}

fn stringify_tool_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Accept both `Z`-suffixed and offset-form ISO-8601 timestamps; pass
/// through unchanged (both are valid ISO-8601 and comparable lexically in
/// UTC, which is all the storage layer requires). An empty or malformed
/// input is passed through as-is so a downstream `Skipped` can reference
/// the exact original text if needed.
fn normalize_timestamp(raw: &str) -> String {
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_is_skipped_not_an_error() {
        let events = parse_line("not json", 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ParsedEvent::Skipped { .. }));
    }

    #[test]
    fn unknown_type_is_skipped_with_distinct_reason() {
        let line = r#"{"type":"mystery","x":1}"#;
        let events = parse_line(line, 1);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ParsedEvent::Skipped { reason } => assert_eq!(reason, "unknown type mystery"),
            other => panic!("expected Skipped, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_reason_differs_from_unknown_type_reason() {
        let events = parse_line("not json", 1);
        match &events[0] {
            ParsedEvent::Skipped { reason } => {
                assert!(reason.starts_with("malformed json at line 1"));
                assert!(!reason.starts_with("unknown type"));
            }
            other => panic!("expected Skipped, got {other:?}"),
        }
    }

    #[test]
    fn top_level_tool_use_line_is_unknown_type_not_malformed() {
        let line = r#"{"type":"tool_use","id":"t1","name":"Bash","input":{}}"#;
        let events = parse_line(line, 1);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ParsedEvent::Skipped { reason } => assert_eq!(reason, "unknown type tool_use"),
            other => panic!("expected Skipped, got {other:?}"),
        }
    }

    #[test]
    fn simple_user_text() {
        let line = r#"{"type":"user","uuid":"u1","timestamp":"2024-01-01T00:00:00Z","message":{"role":"user","content":"hello"}}"#;
        let events = parse_line(line, 1);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ParsedEvent::User { content, .. } => assert_eq!(content, "hello"),
            other => panic!("expected User, got {other:?}"),
        }
    }

    #[test]
    fn assistant_text_and_tool_use_emits_companion() {
        let line = r#"{"type":"assistant","uuid":"a1","timestamp":"2024-01-01T00:00:00Z","message":{"role":"assistant","content":[{"type":"text","text":"ok"},{"type":"tool_use","id":"t1","name":"Bash","input":{"cmd":"ls"}}]}}"#;
        let events = parse_line(line, 1);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ParsedEvent::Assistant { content_blocks, .. } if content_blocks.len() == 2));
        assert!(matches!(&events[1], ParsedEvent::ToolUse { name, .. } if name == "Bash"));
    }

    #[test]
    fn thinking_block_dropped_without_fts() {
        let line = r#"{"type":"assistant","uuid":"a2","timestamp":"2024-01-01T00:00:00Z","message":{"role":"assistant","content":[{"type":"thinking","thinking":"secret"},{"type":"text","text":"visible"}]}}"#;
        let events = parse_line(line, 1);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ParsedEvent::Assistant { content_blocks, .. } => {
                assert_eq!(content_blocks.len(), 1);
                assert_eq!(content_blocks[0], AssistantBlock::Text("visible".to_string()));
            }
            other => panic!("expected Assistant, got {other:?}"),
        }
    }

    #[test]
    fn user_tool_result_block_becomes_tool_result_event() {
        let line = r#"{"type":"user","uuid":"u2","timestamp":"2024-01-01T00:00:00Z","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"output text","is_error":false}]}}"#;
        let events = parse_line(line, 1);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ParsedEvent::ToolResult { tool_use_id, content, is_error, .. } => {
                assert_eq!(tool_use_id, "t1");
                assert_eq!(content, "output text");
                assert!(!is_error);
            }
            other => panic!("expected ToolResult, got {other:?}"),
        }
    }

    #[test]
    fn summary_event() {
        let line = r#"{"type":"summary","summary":"a session about X","leafUuid":"leaf1"}"#;
        let events = parse_line(line, 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ParsedEvent::Summary { content, .. } if content == "a session about X"));
    }

    #[test]
    fn progress_is_skipped() {
        let line = r#"{"type":"progress","data":{}}"#;
        let events = parse_line(line, 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ParsedEvent::Skipped { .. }));
    }
}
