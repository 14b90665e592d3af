//! Prompt template with `{context}` and `{question}` placeholders.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// The default grounding prompt. The "based only on the following context"
/// instruction keeps the model from answering beyond what was retrieved.
pub const DEFAULT_TEMPLATE: &str =
    "Answer the question based only on the following context:\n{context}\n\nQuestion: {question}";

const CONTEXT: &str = "{context}";
const QUESTION: &str = "{question}";

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_TEMPLATE.to_string() }
    }
}

impl PromptTemplate {
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] unless both `{context}` and
    /// `{question}` appear in the template.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT, QUESTION] {
            if !template.contains(placeholder) {
                return Err(RagError::InvalidConfig(format!(
                    "prompt template is missing the {placeholder} placeholder"
                )));
            }
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute both placeholders in a single pass.
    ///
    /// Placeholder-like text inside `context` or `question` is left untouched.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl TryFrom<String> for PromptTemplate {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PromptTemplate> for String {
    fn from(value: PromptTemplate) -> Self {
        value.template
    }
}
