use crate::model::{ModelReply, Question, SubjectProfile};
use async_trait::async_trait;

/// Text-generation model service. One invocation interviews one subject on
/// one question; any call may fail independently of the rest of its batch.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(
        &self,
        profile: &SubjectProfile,
        question: &Question,
    ) -> anyhow::Result<ModelReply>;

    fn provider_name(&self) -> &'static str;
}

pub mod fake;
pub mod http;

pub use fake::FakeModelClient;
pub use http::HttpModelClient;
