//! docqa-rag
//!
//! Question answering over a [`docqa_vector::VectorIndex`]: similarity
//! retrieval, prompt assembly, and a single generation call per query.
pub mod answer;
pub mod llm;
pub mod pipeline;
pub mod retriever;

pub use answer::{AnswerOrchestrator, DECLINE_ANSWER};
pub use llm::OllamaGenerator;
pub use pipeline::{prepare_index, DocumentSource, IndexPolicy, Models, RagPipeline};
pub use retriever::Retriever;
