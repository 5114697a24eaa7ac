//! LLM interaction: turn the ordered text into a LaTeX body.
//!
//! The whole document goes out in one request so figure labels and question
//! numbering stay consistent across pages. Prompt text lives in
//! [`crate::prompts`]; cleanup of the reply in
//! [`crate::pipeline::postprocess`].
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) gives 500 ms → 1 s → 2 s with the
//! defaults.

use crate::config::PipelineConfig;
use crate::error::Pdf2TexError;
use crate::pipeline::postprocess::clean_latex;
use crate::prompts::{latex_user_message, DEFAULT_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// A cleaned LaTeX body plus usage numbers.
#[derive(Debug, Clone)]
pub struct LatexGeneration {
    pub body: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub retries: u32,
    pub duration_ms: u64,
}

/// Read the ordered text artifact; blank text is an error.
pub async fn read_text(path: &Path) -> Result<String, Pdf2TexError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Pdf2TexError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            Pdf2TexError::Internal(format!("Failed to read '{}': {}", path.display(), e))
        }
    })?;
    if text.trim().is_empty() {
        return Err(Pdf2TexError::EmptyText {
            path: path.to_path_buf(),
        });
    }
    Ok(text)
}

/// Send `text` to the provider and return the cleaned LaTeX body.
///
/// Retries up to `config.max_retries` times; the last provider error is
/// returned as [`Pdf2TexError::LlmApiError`].
pub async fn generate_latex(
    provider: &Arc<dyn LLMProvider>,
    text: &str,
    config: &PipelineConfig,
) -> Result<LatexGeneration, Pdf2TexError> {
    let start = Instant::now();
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(latex_user_message(text)),
    ];
    let options = build_options(config);

    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "LaTeX generation: retry {}/{} after {}ms",
                attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                let duration = start.elapsed();
                debug!(
                    "LaTeX generation: {} input tokens, {} output tokens, {:?}",
                    response.prompt_tokens, response.completion_tokens, duration
                );
                let body = clean_latex(&response.content);
                info!("LaTeX body generated ({} bytes)", body.len());
                return Ok(LatexGeneration {
                    body,
                    input_tokens: response.prompt_tokens,
                    output_tokens: response.completion_tokens,
                    retries: attempt,
                    duration_ms: duration.as_millis() as u64,
                });
            }
            Err(e) => {
                let err_msg = format!("{}", e);
                warn!("LaTeX generation: attempt {} failed: {}", attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    Err(Pdf2TexError::LlmApiError {
        retries: config.max_retries,
        message: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&PipelineConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(7000));
    }

    #[tokio::test]
    async fn blank_text_is_empty_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        std::fs::write(&path, "\n\n  \n").unwrap();
        assert!(matches!(
            read_text(&path).await.unwrap_err(),
            Pdf2TexError::EmptyText { .. }
        ));
    }

    #[tokio::test]
    async fn missing_text_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_text(&dir.path().join("nope.txt")).await.unwrap_err(),
            Pdf2TexError::FileNotFound { .. }
        ));
    }
}
