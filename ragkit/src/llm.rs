//! Language model boundary.

use async_trait::async_trait;

use crate::error::Result;

/// A text-in, text-out language model.
///
/// Implementations wrap a concrete provider and report failures as
/// [`RagError::GenerationError`](crate::RagError::GenerationError). The
/// returned text is the model's message content; any further cleanup is
/// done by the chain's output stage.
///
/// # Example
///
/// ```rust,ignore
/// use ragkit::LanguageModel;
///
/// let reply = model.generate("Say hello").await?;
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model name used in logs and error messages.
    fn name(&self) -> &str;

    /// Generate a completion for a fully rendered prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
