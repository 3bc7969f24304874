//! Wire shapes for one line of a session JSONL file. These mirror the
//! upstream JSON exactly (including its inconsistent casing) via serde's
//! tagged/untagged enum support; [`crate::parser`] projects them into the
//! closed event taxonomy the rest of the crate consumes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum RawLine {
    #[serde(rename = "user")]
    User(MessageEnvelope),
    #[serde(rename = "assistant")]
    Assistant(MessageEnvelope),
    #[serde(rename = "summary")]
    Summary(SummaryEnvelope),
    #[serde(rename = "system")]
    System(SystemEnvelope),
    #[serde(rename = "progress")]
    Progress(serde_json::Value),
    #[serde(rename = "queue-operation")]
    QueueOperation(serde_json::Value),
    #[serde(rename = "file-history-snapshot")]
    FileHistorySnapshot(serde_json::Value),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MessageEnvelope {
    pub uuid: String,
    #[serde(rename = "parentUuid")]
    pub parent_uuid: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    pub timestamp: String,
    pub cwd: Option<String>,
    #[serde(rename = "gitBranch")]
    pub git_branch: Option<String>,
    pub message: MessageContent,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MessageContent {
    pub role: Option<String>,
    pub model: Option<String>,
    pub content: ContentValue,
    pub usage: Option<Usage>,
}

/// Content is a plain string for simple turns, or an array of blocks for
/// tool-bearing turns.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ContentValue {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SystemEnvelope {
    pub uuid: String,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    pub timestamp: String,
    pub subtype: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SummaryEnvelope {
    pub summary: String,
    #[serde(rename = "leafUuid")]
    pub leaf_uuid: Option<String>,
    pub timestamp: Option<String>,
}

/// `sessions-index.json`: per-project manifest of known sessions, used only
/// to seed session metadata (first prompt, summary) ahead of full parsing.
#[derive(Debug, Deserialize, Serialize)]
pub struct SessionIndex {
    pub entries: Vec<SessionIndexEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SessionIndexEntry {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "firstPrompt")]
    pub first_prompt: Option<String>,
    pub summary: Option<String>,
}
