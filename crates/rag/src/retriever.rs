use std::fmt::Write;
use std::sync::Arc;

use crate::error::Result;
use crate::store::{EmojiFragment, VectorStoreBackend};

/// Result count for the standalone recall endpoint.
pub const RECALL_TOP_K: usize = 3;
/// Default result count for pipeline similarity queries.
pub const DEFAULT_TOP_K: usize = 4;

/// Uniform similarity-search front over the configured backend.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<VectorStoreBackend>,
}

impl Retriever {
    pub fn new(store: Arc<VectorStoreBackend>) -> Self {
        Self { store }
    }

    pub async fn search(
        &self,
        prompt: &str,
        k: usize,
        allowed_filenames: &[String],
    ) -> Result<Vec<EmojiFragment>> {
        self.store.search(prompt, k, allowed_filenames).await
    }

    pub async fn recall(
        &self,
        prompt: &str,
        allowed_filenames: &[String],
    ) -> Result<Vec<EmojiFragment>> {
        self.search(prompt, RECALL_TOP_K, allowed_filenames).await
    }

    /// Renders fragments into the context block fed to the prompt templates,
    /// one fragment per line, preserving retrieval order. No results means an
    /// empty context, not an error.
    pub fn format_context(fragments: &[EmojiFragment]) -> String {
        let mut formatted = String::new();
        for (i, fragment) in fragments.iter().enumerate() {
            if i > 0 {
                formatted.push('\n');
            }
            let _ = write!(
                formatted,
                "<emoji id='{i}' metadata={}>{}</emoji>",
                fragment.filename, fragment.content
            );
        }
        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_context_preserves_retrieval_order() {
        let fragments = vec![
            EmojiFragment {
                filename: "b.jpg".to_string(),
                content: "second best".to_string(),
            },
            EmojiFragment {
                filename: "a.jpg".to_string(),
                content: "best match".to_string(),
            },
        ];
        let context = Retriever::format_context(&fragments);
        assert_eq!(
            context,
            "<emoji id='0' metadata=b.jpg>second best</emoji>\n<emoji id='1' metadata=a.jpg>best match</emoji>"
        );
    }

    #[test]
    fn format_context_of_nothing_is_empty() {
        assert_eq!(Retriever::format_context(&[]), "");
    }
}
