//! Whole-book summaries.
//!
//! Single pass: the top `summary_k` chunks for a fixed summary query are
//! stuffed into one prompt, truncated the same way as question answering.

use std::sync::Arc;

use tracing::{debug, info_span, Instrument};

use crate::answer::build_context;
use crate::error::{RagError, Result};
use crate::generation::LanguageModel;
use crate::index::CollectionHandle;
use crate::retrieve::Retriever;

pub const SUMMARY_QUERY: &str = "comprehensive summary of this book's themes, concepts, structure";

pub fn summary_prompt(context: &str) -> String {
    format!(
        "Below are excerpts from a book. Write a detailed summary of the book that covers:\n\
         1. Main themes and topics\n\
         2. Key concepts and ideas\n\
         3. Principal characters or subjects, if the book has any\n\
         4. Overall structure and organization\n\n\
         Excerpts:\n{context}\n\n\
         Summary:"
    )
}

pub struct Summarizer {
    retriever: Retriever,
    model: Arc<dyn LanguageModel>,
    k: usize,
    max_context_chars: usize,
}

impl Summarizer {
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

    pub async fn summarize(&self, handle: &CollectionHandle) -> Result<String> {
        let span = info_span!("summarize", collection = %handle.name);
        self.stuffed_summary(handle).instrument(span).await
    }

    async fn stuffed_summary(&self, handle: &CollectionHandle) -> Result<String> {
        self.retriever.ensure_populated(handle).await?;

        let chunks = self.retriever.retrieve(handle, SUMMARY_QUERY, self.k).await?;
        if chunks.is_empty() {
            return Err(RagError::EmptyContext {
                collection: handle.name.clone(),
            });
        }

        let context = build_context(&chunks, self.max_context_chars);
        debug!(
            chunks = chunks.len(),
            used = context.pages.len(),
            context_chars = context.text.chars().count(),
            "generating summary"
        );
        self.model.generate(&summary_prompt(&context.text)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_prompt_requires_all_sections() {
        let prompt = summary_prompt("[Page 3]\nSome text.");
        for needle in [
            "Main themes and topics",
            "Key concepts and ideas",
            "characters or subjects",
            "structure and organization",
            "[Page 3]\nSome text.",
        ] {
            assert!(prompt.contains(needle), "missing {:?}", needle);
        }
    }
}
