//! LLM text generation: answers, summaries, questions, FAQs.
//!
//! A [`Generator`] only has to implement [`Generator::complete`]; the
//! task-specific operations are provided methods that build a prompt and
//! post-process the reply. The only backend is OpenAI chat completions
//! (`POST {base_url}/chat/completions`, key from `OPENAI_API_KEY`).

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use docsearch_core::error::Error;
use docsearch_core::DocumentName;

use crate::config::GenerationConfig;
use crate::http;

pub const DEFAULT_QUESTIONS: usize = 10;
pub const MAX_QUESTIONS: usize = 50;
pub const DEFAULT_FAQS: usize = 5;
pub const MAX_FAQS: usize = 20;

/// A retrieved passage given to the model as context.
#[derive(Debug, Clone)]
pub struct ContextPassage {
    pub document: DocumentName,
    pub text: String,
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Single-turn completion of `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Answer `query` using only `passages`.
    async fn answer(&self, query: &str, passages: &[ContextPassage]) -> Result<String> {
        self.complete(&answer_prompt(query, passages)).await
    }

    async fn summarize(&self, text: &str) -> Result<String> {
        self.complete(&summary_prompt(text)).await
    }

    async fn questions(&self, text: &str, count: usize) -> Result<Vec<String>> {
        let reply = self.complete(&questions_prompt(text, count)).await?;
        let mut questions = parse_questions(&reply);
        questions.truncate(count);
        Ok(questions)
    }

    async fn faq(&self, text: &str, count: usize) -> Result<String> {
        self.complete(&faq_prompt(text, count)).await
    }
}

pub fn answer_prompt(query: &str, passages: &[ContextPassage]) -> String {
    let context: String = passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("Document {} (Source: {}):\n{}\n", i + 1, p.document, p.text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an assistant that answers questions based on the provided context.\n\n\
         Context Information:\n{}\n\
         Instructions:\n\
         - Answer the question using ONLY the information provided in the context above\n\
         - For tabular data, present information in a clear, organized format\n\
         - If the information is not in the context, clearly state that it is not available\n\n\
         Question: {}\n\nAnswer:",
        context, query
    )
}

pub fn summary_prompt(text: &str) -> String {
    format!(
        "Write a concise summary of the following document without losing any important \
         information. Return a fully formatted markdown document.\n\n{}",
        text
    )
}

pub fn questions_prompt(text: &str, count: usize) -> String {
    format!(
        "Generate {} questions that are relevant to and answerable from the text below.\n\
         Return ONLY a JSON array of strings, e.g. [\"Question 1\", \"Question 2\"]. \
         Do not include any other text.\n\n{}",
        count, text
    )
}

pub fn faq_prompt(text: &str, count: usize) -> String {
    format!(
        "Generate {} FAQ items for the document below. Each item is a question someone \
         would commonly ask and a comprehensive answer based solely on the document.\n\
         Format each item as:\n\n**Q1: <question>**\nA1: <answer>\n\n{}",
        count, text
    )
}

/// Extract questions from a model reply.
///
/// Prefers a JSON array of strings (optionally inside a ```json fence);
/// otherwise takes one question per non-empty line, stripping list markers.
pub fn parse_questions(reply: &str) -> Vec<String> {
    let trimmed = reply.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if let Ok(list) = serde_json::from_str::<Vec<String>>(unfenced) {
        return list
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
    }

    unfenced
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*'))
                .trim()
                .to_string()
        })
        .filter(|q| !q.is_empty() && q != "[" && q != "]")
        .collect()
}

pub struct OpenAIGenerator {
    model: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: http::api_key("OPENAI_API_KEY")?,
            client: http::client(config.timeout_secs)?,
        })
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        let json = http::send_json("OpenAI chat", || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        match json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
        {
            Some(content) => Ok(content.trim().to_string()),
            None => bail!("Invalid OpenAI response: missing choices[0].message.content"),
        }
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.call(prompt)
            .await
            .map_err(|e| Error::external("generation", format!("{:#}", e)).into())
    }
}

/// Create the configured generator, or `None` when generation is disabled.
pub fn create_generator(config: &GenerationConfig) -> Result<Option<Arc<dyn Generator>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Arc::new(OpenAIGenerator::new(config)?))),
        other => bail!("Unknown generation provider: '{}'", other),
    }
}
