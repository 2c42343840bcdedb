//! Answer prompt for the "stuff" strategy: every retrieved chunk goes into one prompt

use crate::types::SearchResult;

/// Separator placed between retrieved chunks in the context block
pub const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    corpus_name: String,
}

impl PromptTemplate {
    pub fn new(corpus_name: impl Into<String>) -> Self {
        Self {
            corpus_name: corpus_name.into(),
        }
    }

    /// Chunk contents joined with blank lines, in retrieval order
    pub fn build_context(results: &[SearchResult]) -> String {
        results
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }

    pub fn render(&self, question: &str, results: &[SearchResult]) -> String {
        format!(
            r#"Use the following pieces of context from the {corpus} documents to answer the question.
If you don't know the answer, just say that you don't know, don't try to make up an answer.
Always cite which document(s) you're referencing.

Context: {context}

Question: {question}

Answer:"#,
            corpus = self.corpus_name,
            context = Self::build_context(results),
            question = question
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(doc_id: &str, content: &str) -> SearchResult {
        SearchResult {
            doc_id: doc_id.to_string(),
            filename: format!("{}.pdf", doc_id),
            dataset: "1".to_string(),
            chunk_index: 0,
            content: content.to_string(),
            score: 0.9,
            vector_score: 0.9,
            keyword_score: None,
        }
    }

    #[test]
    fn test_context_joins_chunks_in_order() {
        let results = vec![result("a", "first chunk"), result("b", "second chunk")];
        assert_eq!(
            PromptTemplate::build_context(&results),
            "first chunk\n\nsecond chunk"
        );
    }

    #[test]
    fn test_render_fills_template() {
        let template = PromptTemplate::new("Epstein investigation");
        let prompt = template.render("Who flew on the plane?", &[result("a", "flight log")]);

        assert!(prompt.starts_with(
            "Use the following pieces of context from the Epstein investigation documents"
        ));
        assert!(prompt.contains("Context: flight log\n\nQuestion: Who flew on the plane?"));
        assert!(prompt.contains("Always cite which document(s) you're referencing."));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_render_with_no_context() {
        let prompt = PromptTemplate::new("test").render("q", &[]);
        assert!(prompt.contains("Context: \n\nQuestion: q"));
    }
}
