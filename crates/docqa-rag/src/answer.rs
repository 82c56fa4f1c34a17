//! Prompt assembly and source attribution around a single `generate` call.
use tracing::{debug, info};

use docqa_core::error::{Error, Result};
use docqa_core::traits::Generator;
use docqa_core::types::{Answer, QueryResult};

/// What the model is told to say when the context does not cover the question.
pub const DECLINE_ANSWER: &str = "I don't have enough information to answer this question.";

pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 8000;

const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOrchestrator {
    max_context_chars: usize,
}

impl Default for AnswerOrchestrator {
    fn default() -> Self {
        Self { max_context_chars: DEFAULT_MAX_CONTEXT_CHARS }
    }
}

impl AnswerOrchestrator {
    pub fn new(max_context_chars: usize) -> Self {
        Self { max_context_chars: max_context_chars.max(1) }
    }

    pub fn max_context_chars(&self) -> usize {
        self.max_context_chars
    }

    /// Chunk texts in result order, separated by a blank line.
    ///
    /// Chunks are added while the total stays within `max_context_chars`. The
    /// first chunk is always present, cut to the budget if it alone exceeds it.
    pub fn build_context(&self, retrieved: &QueryResult) -> String {
        let mut context = String::new();
        let mut used = 0usize;
        for (i, scored) in retrieved.iter().enumerate() {
            let text = scored.chunk.text.as_str();
            let len = text.chars().count();
            if i == 0 {
                if len > self.max_context_chars {
                    debug!(
                        "Truncating first chunk from {} to {} chars",
                        len, self.max_context_chars
                    );
                    context.extend(text.chars().take(self.max_context_chars));
                    return context;
                }
                context.push_str(text);
                used = len;
                continue;
            }
            let needed = CONTEXT_SEPARATOR.len() + len;
            if used + needed > self.max_context_chars {
                debug!("Context budget reached after {} of {} chunks", i, retrieved.len());
                break;
            }
            context.push_str(CONTEXT_SEPARATOR);
            context.push_str(text);
            used += needed;
        }
        context
    }

    pub fn build_prompt(&self, question: &str, retrieved: &QueryResult) -> String {
        render_prompt(&self.build_context(retrieved), question)
    }

    /// Build the prompt, call the generator exactly once, attach the sources.
    pub fn answer(
        &self,
        question: &str,
        retrieved: &QueryResult,
        generator: &dyn Generator,
    ) -> Result<Answer> {
        let prompt = self.build_prompt(question, retrieved);
        info!(
            "Generating answer from {} retrieved chunks ({} prompt chars)",
            retrieved.len(),
            prompt.chars().count()
        );
        let text =
            generator.generate(&prompt).map_err(|e| Error::collaborator("generation", &e))?;
        Ok(Answer { text: text.trim().to_string(), sources: collect_sources(retrieved) })
    }
}

/// Distinct `source_id`s in first-seen order.
pub fn collect_sources(retrieved: &QueryResult) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for scored in retrieved {
        if !sources.contains(&scored.chunk.source_id) {
            sources.push(scored.chunk.source_id.clone());
        }
    }
    sources
}

pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end. \
If you don't know the answer based on the context, just say \"{DECLINE_ANSWER}\" \
Don't try to make up an answer. Be specific and detailed in your response.\n\n\
Context:\n{context}\n\n\
Question: {question}\n\n\
Detailed Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::types::{Chunk, ScoredChunk};
    use std::sync::Mutex;

    fn scored(source: &str, index: usize, text: &str) -> ScoredChunk {
        let chunk = Chunk { source_id: source.into(), chunk_index: index, text: text.into() };
        ScoredChunk { chunk, score: 0.5 }
    }

    struct Recording {
        prompts: Mutex<Vec<String>>,
    }

    impl Generator for Recording {
        fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("  The answer.\n".to_string())
        }
    }

    struct Failing;

    impl Generator for Failing {
        fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn prompt_contains_context_question_and_decline_instruction() {
        let retrieved = vec![scored("a.pdf", 0, "alpha"), scored("b.pdf", 2, "beta")];
        let prompt = AnswerOrchestrator::default().build_prompt("What is alpha?", &retrieved);
        assert!(prompt.contains("Context:\nalpha\n\nbeta\n\nQuestion: What is alpha?"));
        assert!(prompt.contains(DECLINE_ANSWER));
        assert!(prompt.ends_with("Detailed Answer:"));
    }

    #[test]
    fn context_respects_budget() {
        let retrieved =
            vec![scored("a", 0, "aaaa"), scored("b", 0, "bbbb"), scored("c", 0, "cccc")];
        // 4 + 2 + 4 = 10 fits, a third chunk would need 16
        assert_eq!(AnswerOrchestrator::new(12).build_context(&retrieved), "aaaa\n\nbbbb");
        assert_eq!(AnswerOrchestrator::new(16).build_context(&retrieved), "aaaa\n\nbbbb\n\ncccc");
    }

    #[test]
    fn oversized_first_chunk_is_truncated() {
        let retrieved = vec![scored("a", 0, "abcdefgh"), scored("b", 0, "x")];
        assert_eq!(AnswerOrchestrator::new(5).build_context(&retrieved), "abcde");
    }

    #[test]
    fn sources_are_deduplicated_in_order() {
        let retrieved =
            vec![scored("b.pdf", 3, "x"), scored("a.pdf", 0, "y"), scored("b.pdf", 1, "z")];
        assert_eq!(collect_sources(&retrieved), vec!["b.pdf".to_string(), "a.pdf".to_string()]);
    }

    #[test]
    fn generates_once_even_without_context() {
        let generator = Recording { prompts: Mutex::new(Vec::new()) };
        let answer =
            AnswerOrchestrator::default().answer("Anything?", &Vec::new(), &generator).unwrap();
        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Context:\n\n\nQuestion: Anything?"));
        assert_eq!(answer.text, "The answer.");
        assert!(answer.sources.is_empty());
    }

    #[test]
    fn generator_failure_is_a_collaborator_error() {
        let retrieved = vec![scored("a.pdf", 0, "alpha")];
        let err = AnswerOrchestrator::default().answer("q", &retrieved, &Failing).unwrap_err();
        match err {
            Error::Collaborator { what, message } => {
                assert_eq!(what, "generation");
                assert!(message.contains("connection refused"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
