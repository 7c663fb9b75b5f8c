//! # AI Review Gateway
//!
//! Thin client for the local Ollama server used to review and rewrite
//! transcript text. Pure request/response with no state; every call is safe
//! to retry. Failures surface as `ReviewUnavailable` and callers must treat
//! them as non-fatal - a save proceeds without an AI title, an explicit
//! review request returns 503.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Supported review transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    FixGrammar,
    Rephrase,
    Improve,
    Summarize,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewAction::FixGrammar => "fix_grammar",
            ReviewAction::Rephrase => "rephrase",
            ReviewAction::Improve => "improve",
            ReviewAction::Summarize => "summarize",
        }
    }

    /// The instruction prepended to the text.
    fn instruction(&self) -> &'static str {
        match self {
            ReviewAction::FixGrammar => {
                "Fix all grammar, spelling and punctuation mistakes in the following text. \
                 Keep the wording and meaning unchanged. Respond with the corrected text only."
            }
            ReviewAction::Rephrase => {
                "Rephrase the following text in a clear, professional tone. \
                 Respond with the rephrased text only."
            }
            ReviewAction::Improve => {
                "Improve the clarity and readability of the following text without \
                 changing its meaning. Respond with the improved text only."
            }
            ReviewAction::Summarize => {
                "Summarize the following text in a few concise sentences. \
                 Respond with the summary only."
            }
        }
    }
}

impl std::str::FromStr for ReviewAction {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "fix_grammar" => Ok(ReviewAction::FixGrammar),
            "rephrase" => Ok(ReviewAction::Rephrase),
            "improve" => Ok(ReviewAction::Improve),
            "summarize" => Ok(ReviewAction::Summarize),
            other => Err(AppError::ValidationError(format!(
                "Unknown review action: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for the Ollama text-generation API.
pub struct ReviewGateway {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl ReviewGateway {
    pub fn new(base_url: &str, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        info!("Review gateway: {} (model: {})", base_url, model);
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Probe whether the Ollama server answers at all.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/version", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Review service not available: {}", e);
                false
            }
        }
    }

    /// Apply a review action to `text` and return the revised text.
    pub async fn review(&self, text: &str, action: ReviewAction) -> AppResult<String> {
        let prompt = format!(
            "{}\n\nOriginal text:\n{}\n\nRewritten text:",
            action.instruction(),
            text
        );
        let result = self.generate(prompt).await?;
        info!("Review completed: {}", action.as_str());
        Ok(result)
    }

    /// Best-effort short title for a transcript. Callers fall back to a
    /// generated placeholder when this fails.
    pub async fn suggest_title(&self, text: &str) -> AppResult<String> {
        // Titles come from the opening of the transcript; the rest only
        // adds latency
        let excerpt: String = text.chars().take(2000).collect();
        let prompt = format!(
            "Suggest a short descriptive title (at most 8 words) for this transcript. \
             Respond with the title only, no quotes.\n\nTranscript:\n{}",
            excerpt
        );

        let title = self.generate(prompt).await?;
        Ok(title.trim_matches(['"', '\'']).trim().to_string())
    }

    async fn generate(&self, prompt: String) -> AppResult<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Review request failed: {}", e);
                AppError::ReviewUnavailable(format!("Cannot reach review service: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::ReviewUnavailable(format!(
                "Review service answered with status {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            AppError::ReviewUnavailable(format!("Invalid review service response: {}", e))
        })?;

        Ok(body.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parsing() {
        assert_eq!(
            "fix_grammar".parse::<ReviewAction>().unwrap(),
            ReviewAction::FixGrammar
        );
        assert_eq!(
            "summarize".parse::<ReviewAction>().unwrap(),
            ReviewAction::Summarize
        );
        assert!("extract_actions".parse::<ReviewAction>().is_err());
    }

    #[test]
    fn test_action_round_trip() {
        for action in [
            ReviewAction::FixGrammar,
            ReviewAction::Rephrase,
            ReviewAction::Improve,
            ReviewAction::Summarize,
        ] {
            assert_eq!(action.as_str().parse::<ReviewAction>().unwrap(), action);
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_review_unavailable() {
        // Port 9 (discard) refuses connections immediately
        let gateway = ReviewGateway::new("http://127.0.0.1:9", "test-model");
        assert!(!gateway.is_available().await);

        let result = gateway.review("text", ReviewAction::Improve).await;
        assert!(matches!(result, Err(AppError::ReviewUnavailable(_))));
    }
}
