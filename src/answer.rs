//! Grounded question answering over one book.
//!
//! An answer is produced in a single generation call whose prompt carries
//! only retrieved excerpts. A collection with nothing to retrieve never
//! reaches the model.

use std::sync::Arc;

use tracing::{debug, info_span, Instrument};

use crate::error::{RagError, Result};
use crate::generation::LanguageModel;
use crate::index::CollectionHandle;
use crate::models::{Answer, RetrievedChunk};
use crate::retrieve::Retriever;

/// Excerpts rendered for a prompt, with the page of each excerpt included.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub text: String,
    pub pages: Vec<u32>,
}

const SEPARATOR: &str = "\n\n";

/// Render `chunks` (best first) into at most `max_chars` characters.
///
/// Chunks are taken in order until the next one would not fit, so the
/// lowest-scoring ones are dropped first. A first chunk that alone exceeds
/// the budget is cut to it.
pub fn build_context(chunks: &[RetrievedChunk], max_chars: usize) -> Context {
    let mut text = String::new();
    let mut pages = Vec::new();
    let mut used = 0;

    for chunk in chunks {
        let entry = format!("[Page {}]\n{}", chunk.page, chunk.text.trim());
        let cost = entry.chars().count() + if pages.is_empty() { 0 } else { SEPARATOR.len() };

        if used + cost > max_chars {
            if pages.is_empty() {
                text = entry.chars().take(max_chars).collect();
                pages.push(chunk.page);
            }
            break;
        }
        if !pages.is_empty() {
            text.push_str(SEPARATOR);
        }
        text.push_str(&entry);
        used += cost;
        pages.push(chunk.page);
    }

    Context { text, pages }
}

pub fn question_prompt(context: &str, question: &str) -> String {
    format!(
        "You answer questions about a book using only the excerpts below.\n\n\
         Excerpts:\n{context}\n\n\
         Question: {question}\n\n\
         Answer from the excerpts alone. If they do not contain enough information \
         to answer, say that plainly instead of guessing.\n\n\
         Answer:"
    )
}

pub struct AnswerSynthesizer {
    retriever: Retriever,
    model: Arc<dyn LanguageModel>,
    k: usize,
    max_context_chars: usize,
}

impl AnswerSynthesizer {
    pub fn new(
        retriever: Retriever,
        model: Arc<dyn LanguageModel>,
        k: usize,
        max_context_chars: usize,
    ) -> Self {
        Self {
            retriever,
            model,
            k,
            max_context_chars,
        }
    }

    pub async fn answer(&self, handle: &CollectionHandle, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".into()));
        }

        let span = info_span!("answer", collection = %handle.name);
        self.grounded_answer(handle, question).instrument(span).await
    }

    async fn grounded_answer(&self, handle: &CollectionHandle, question: &str) -> Result<Answer> {
        self.retriever.ensure_populated(handle).await?;

        let chunks = self.retriever.retrieve(handle, question, self.k).await?;
        if chunks.is_empty() {
            return Err(RagError::EmptyContext {
                collection: handle.name.clone(),
            });
        }

        let context = build_context(&chunks, self.max_context_chars);
        debug!(
            chunks = chunks.len(),
            used = context.pages.len(),
            model = self.model.model_name(),
            "generating answer"
        );
        let text = self
            .model
            .generate(&question_prompt(&context.text, question))
            .await?;

        Ok(Answer {
            text,
            sources: context.pages,
        })
    }
}
