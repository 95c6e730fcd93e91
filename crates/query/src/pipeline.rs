use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{QueryError, Result};
use crate::llm::{ChatCompletionTransport, CompletionRequest};
use crate::prompt::{SYSTEM_PROMPT, build_user_prompt};
use crate::provider::{ProviderDescriptor, ProviderResolver, Role};
use crate::retrieval::{RetrievalFact, RetrievalProvider};

pub const FALLBACK_ANSWER: &str =
    "I couldn't find any relevant information in the knowledge graph to answer this question.";
pub const GENERATION_ERROR_PREFIX: &str = "Error generating answer: ";
pub const GENERATION_TEMPERATURE: f32 = 0.3;
pub const GENERATION_MAX_TOKENS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub fact: String,
    pub source: String,
    pub score: f32,
}

impl From<&RetrievalFact> for SourceRef {
    fn from(fact: &RetrievalFact) -> Self {
        Self {
            fact: fact.description.clone(),
            source: fact.source().to_string(),
            score: fact.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    #[serde(rename = "answer")]
    pub answer_text: String,
    pub sources: Vec<SourceRef>,
    pub entities_used: Vec<String>,
    pub confidence: f64,
}

impl Answer {
    pub fn no_evidence(question: &str) -> Self {
        Self {
            question: question.to_string(),
            answer_text: FALLBACK_ANSWER.to_string(),
            sources: Vec::new(),
            entities_used: Vec::new(),
            confidence: 0.0,
        }
    }

    /// True when generation failed and `answer_text` carries the cause.
    pub fn is_generation_error(&self) -> bool {
        self.answer_text.starts_with(GENERATION_ERROR_PREFIX)
    }
}

/// Question + retrieved facts -> grounded answer.
///
/// Holds no mutable state; one instance serves concurrent requests.
pub struct AnswerPipeline {
    resolver: ProviderResolver,
    transport: Arc<dyn ChatCompletionTransport>,
    retriever: Arc<dyn RetrievalProvider>,
    generation_timeout: Option<Duration>,
}

impl AnswerPipeline {
    pub fn new(
        resolver: ProviderResolver,
        transport: Arc<dyn ChatCompletionTransport>,
        retriever: Arc<dyn RetrievalProvider>,
    ) -> Self {
        Self {
            resolver,
            transport,
            retriever,
            generation_timeout: None,
        }
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = Some(timeout);
        self
    }

    pub fn resolver(&self) -> &ProviderResolver {
        &self.resolver
    }

    pub fn retriever(&self) -> &Arc<dyn RetrievalProvider> {
        &self.retriever
    }

    /// Retrieve facts for the question and answer from them.
    ///
    /// Retrieval and configuration failures are returned as errors; a failed
    /// generation call is reported inside the `Answer`.
    pub async fn answer_question(
        &self,
        question: &str,
        group_id: Option<&str>,
        top_k: usize,
    ) -> Result<Answer> {
        tracing::info!(
            group = group_id.unwrap_or("default"),
            top_k,
            "Answering question"
        );

        let facts = self
            .retriever
            .search(question, group_id, top_k)
            .await
            .map_err(QueryError::Retrieval)?;

        self.answer(question, &facts).await
    }

    pub async fn answer(&self, question: &str, facts: &[RetrievalFact]) -> Result<Answer> {
        self.answer_until(question, facts, std::future::pending::<()>())
            .await
    }

    /// Like `answer`, but gives up on generation as soon as `cancelled`
    /// completes.
    pub async fn answer_until<F>(
        &self,
        question: &str,
        facts: &[RetrievalFact],
        cancelled: F,
    ) -> Result<Answer>
    where
        F: Future<Output = ()> + Send,
    {
        // Step 1: Nothing retrieved, nothing to ground an answer on
        if facts.is_empty() {
            tracing::warn!("No relevant information found");
            return Ok(Answer::no_evidence(question));
        }

        // Step 2: Build context
        let context = build_context(facts);

        // Step 3: Collect entities and sources
        let entities_used = collect_entities(facts);
        let sources: Vec<SourceRef> = facts.iter().map(SourceRef::from).collect();

        // Step 4: Generate answer
        let descriptor = self.resolver.resolve(Role::Generation)?;
        tracing::info!(provider = %descriptor.describe(), "Generating answer");

        let (answer_text, confidence) =
            match self.generate(&descriptor, question, &context, cancelled).await {
                // Step 5: Score evidence
                Ok(text) => (text, calculate_confidence(&context)),
                Err(e) => {
                    tracing::error!(error = %format!("{e:#}"), "Error generating answer");
                    (format!("{GENERATION_ERROR_PREFIX}{e:#}"), 0.0)
                }
            };

        tracing::info!(
            sources = sources.len(),
            entities = entities_used.len(),
            confidence,
            "Answer ready"
        );

        Ok(Answer {
            question: question.to_string(),
            answer_text,
            sources,
            entities_used,
            confidence,
        })
    }

    async fn generate<F>(
        &self,
        descriptor: &ProviderDescriptor,
        question: &str,
        context: &str,
        cancelled: F,
    ) -> anyhow::Result<String>
    where
        F: Future<Output = ()> + Send,
    {
        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: build_user_prompt(context, question),
            temperature: GENERATION_TEMPERATURE,
            max_tokens: GENERATION_MAX_TOKENS,
        };

        let call = self.transport.complete(descriptor, &request);
        let bounded = async {
            match self.generation_timeout {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .map_err(|_| anyhow!("generation timed out after {}s", limit.as_secs_f32()))?,
                None => call.await,
            }
        };

        tokio::select! {
            result = bounded => result,
            _ = cancelled => Err(anyhow!("generation cancelled")),
        }
    }
}

/// One numbered line per fact, in retrieval order. Facts without a
/// description are left out but keep their position number.
pub fn build_context(facts: &[RetrievalFact]) -> String {
    let mut lines = Vec::with_capacity(facts.len());

    for (i, fact) in facts.iter().enumerate() {
        if fact.description.trim().is_empty() {
            continue;
        }

        let mut line = format!("[{}] {}", i + 1, fact.description);
        if !fact.related_entities.is_empty() {
            line.push_str(&format!(
                " (Entities: {})",
                fact.related_entities.join(", ")
            ));
        }
        lines.push(line);
    }

    lines.join("\n")
}

pub fn collect_entities(facts: &[RetrievalFact]) -> Vec<String> {
    facts
        .iter()
        .flat_map(|fact| fact.related_entities.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Evidence-richness heuristic: 60% from the number of context lines
/// (saturating at 5), 40% from context length (saturating at 2000 chars).
pub fn calculate_confidence(context: &str) -> f64 {
    if context.is_empty() {
        return 0.0;
    }

    let line_count = context.split('\n').count() as f64;
    let source_confidence = (line_count / 5.0).min(1.0) * 0.6;

    let context_length = context.chars().count() as f64;
    let context_confidence = (context_length / 2000.0).min(1.0) * 0.4;

    ((source_confidence + context_confidence) * 100.0).round() / 100.0
}
