//! Shared state handed to every request handler

use crate::client::RagClient;
use crate::generation::LlmProvider;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    client: RagClient,
    llm: Arc<dyn LlmProvider>,
    /// Message returned by `GET /`
    title: String,
}

impl AppState {
    pub fn new(client: RagClient, llm: Arc<dyn LlmProvider>) -> Self {
        let title = client.config().server.title.clone();
        Self {
            inner: Arc::new(AppStateInner { client, llm, title }),
        }
    }

    pub fn client(&self) -> &RagClient {
        &self.inner.client
    }

    pub fn llm(&self) -> &dyn LlmProvider {
        self.inner.llm.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.inner.title
    }
}
