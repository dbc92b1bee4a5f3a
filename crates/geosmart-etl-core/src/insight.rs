//! AI insight: hand a bounded rendering of the profile to a completion client.
//!
//! The raw dataset never reaches the model. The prompt is a fixed analyst
//! instruction, the profile digest as compact JSON and the user's question.
//! When the prompt is over budget, the digest keeps fewer group members until
//! it fits.
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::profile::{Profile, ProfileError};

/// Boxed error returned by completion clients.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Instruction that opens every prompt.
pub const SYSTEM_INSTRUCTION: &str =
    "You are a Senior GIS Expert. Analyze the metadata JSON and answer questions.";

/// Text completion capability.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Return the model's answer to `prompt`.
    async fn infer(&self, prompt: &str) -> Result<String, BoxError>;
}

/// Errors from prompt construction or inference.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InsightError {
    /// The question is blank.
    #[snafu(display("Question is empty"))]
    EmptyQuestion,

    /// Even the smallest digest does not fit the prompt budget.
    #[snafu(display("Prompt is {size} bytes, over the {limit} byte budget"))]
    PromptTooLarge {
        /// Size of the smallest prompt that could be built.
        size: usize,
        /// Configured budget.
        limit: usize,
    },

    /// The profile digest could not be rendered.
    #[snafu(display("Failed to render profile digest: {source}"))]
    Digest {
        /// Underlying profile error.
        source: ProfileError,
    },

    /// The completion client failed.
    #[snafu(display("Inference failed: {source}"))]
    Inference {
        /// Error reported by the client.
        source: BoxError,
    },
}

/// Prompt limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptOptions {
    /// Largest prompt, in bytes.
    pub max_bytes: usize,
    /// Group members to include at most.
    pub top_k: usize,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            max_bytes: 16 * 1024,
            top_k: 5,
        }
    }
}

/// Answer returned by [`ask`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Insight {
    /// The model's answer.
    pub answer: String,
    /// Size of the prompt that was sent.
    pub prompt_bytes: usize,
}

/// Build the prompt for `question`, shrinking the digest to fit the budget.
pub fn build_prompt(
    profile: &Profile,
    question: &str,
    options: &PromptOptions,
) -> Result<String, InsightError> {
    let question = question.trim();
    ensure!(!question.is_empty(), EmptyQuestionSnafu);

    let mut smallest = usize::MAX;
    for top_k in (0..=options.top_k).rev() {
        let metadata = profile.digest(top_k).to_json().context(DigestSnafu)?;
        let prompt = format!("{SYSTEM_INSTRUCTION}\nMetadata: {metadata}\n\nQuestion: {question}");
        if prompt.len() <= options.max_bytes {
            debug!("prompt built with top_k={top_k}: {} bytes", prompt.len());
            return Ok(prompt);
        }
        smallest = smallest.min(prompt.len());
    }
    PromptTooLargeSnafu {
        size: smallest,
        limit: options.max_bytes,
    }
    .fail()
}

/// Ask `client` a question about the dataset summarized by `profile`.
pub async fn ask<C>(
    client: &C,
    profile: &Profile,
    question: &str,
    options: &PromptOptions,
) -> Result<Insight, InsightError>
where
    C: InferenceClient + ?Sized,
{
    let prompt = build_prompt(profile, question, options)?;
    let answer = client.infer(&prompt).await.context(InferenceSnafu)?;
    Ok(Insight {
        answer,
        prompt_bytes: prompt.len(),
    })
}
