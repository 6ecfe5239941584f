//! Chat model seam and prompt assembly.
//!
//! [`OllamaChat`] posts a non-streaming request to `POST /api/chat`. The
//! system prompt fixes the citation format that
//! [`format_citations`](crate::citation::format_citations) later rewrites.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::config::OllamaConfig;
use crate::error::DocuChatError;
use crate::models::Chunk;
use crate::ollama::OllamaClient;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant with access to specific document excerpts. When answering questions be sure to always follow these rules:

1. Use information from the provided context to answer the user's questions.
2. Cite your sources ALWAYS using the following format: [¶ Full_File_Path, Page: X]. For example: [¶ /path/to/document.pdf, Page: 10]
3. If you need to combine information from multiple sources, cite each source separately. For example: [¶ /path/to/document1.pdf, Page: 10][¶ /path/to/document2.pdf, Page: 20]
4. DO NOT refer to the excerpts directly, but use the content as the basis for your answers.
5. If you're unsure or the context doesn't contain relevant information, say so.
6. Do not invent or assume information not present in the given context.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Generates a reply to an ordered list of role-tagged messages.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;
}

pub struct OllamaChat {
    client: OllamaClient,
}

impl OllamaChat {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        Ok(Self {
            client: OllamaClient::new(config)?,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.client.config().chat_model
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model_name(),
            "messages": messages,
            "stream": false,
        });
        tracing::info!(model = self.model_name(), messages = messages.len(), "sending chat request");
        let json = self.client.post_json("chat", "/api/chat", &body).await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            DocuChatError::collaborator("chat", "invalid response: missing message.content").into()
        })
}

/// Render retrieved chunks as numbered excerpts for the prompt.
pub fn format_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "Excerpt {} from {} (Page {}):\n{}\n",
                i + 1,
                chunk.metadata.source,
                chunk.metadata.page,
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_messages(question: &str, chunks: &[Chunk]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::new(Role::System, SYSTEM_PROMPT),
        ChatMessage::new(
            Role::User,
            format!("Context:\n{}\n\nQuestion: {}", format_context(chunks), question),
        ),
    ]
}

/// Ask `model` to answer `question` from `chunks`. Returns the raw reply,
/// citation markers included.
pub async fn generate_answer(
    model: &dyn ChatModel,
    question: &str,
    chunks: &[Chunk],
) -> Result<String> {
    let messages = build_messages(question, chunks);
    tracing::debug!(question, context_chunks = chunks.len(), "generating answer");
    model.chat(&messages).await
}
