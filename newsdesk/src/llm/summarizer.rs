// Map-reduce summarization over article chunks
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, warn};

use super::{InferenceProvider, PartialSummary};
use crate::error::PipelineError;

/// Prepended to every chunk before it is summarized
pub const CHUNK_PROMPT: &str = "You are a skilled journalist. Summarize the following section \
of a news article with clarity and depth. Preserve all meaningful details, keep fluent and \
correct punctuation, and use complete sentences:\n\n";

/// Prepended to the joined section summaries for the reduction pass
pub const FINAL_PROMPT: &str = "You are an experienced editor. Combine the following section \
summaries into one fluent, detailed and cohesive summary of the entire article, with smooth \
transitions, so that it reads like a complete article summary:\n\n";

/// Summarize every chunk, join the partial summaries in chunk order and run one
/// reduction pass over the result.
///
/// At most `concurrency` chunk calls are in flight; results are reassembled in the
/// original chunk order either way. The first chunk failure aborts the whole run.
/// An empty reduction falls back to the joined partial summaries.
pub async fn summarize_chunks<P: InferenceProvider + ?Sized>(
    provider: &P,
    chunks: &[String],
    concurrency: usize,
) -> Result<String, PipelineError> {
    let chunk_inputs: Vec<String> = chunks
        .iter()
        .map(|chunk| format!("{}{}", CHUNK_PROMPT, chunk))
        .collect();
    let partials: Vec<PartialSummary> = stream::iter(chunk_inputs)
        .map(|inputs| async move { provider.summarize(&inputs).await })
    .buffered(concurrency.max(1))
    .try_collect()
    .await
    .map_err(|e| {
        warn!("summarizer: chunk summarization failed: {}", e);
        PipelineError::summarization("Failed to summarize text", e)
    })?;

    let empty = partials
        .iter()
        .filter(|p| matches!(p, PartialSummary::Empty))
        .count();
    if empty > 0 {
        warn!(
            "summarizer: {} of {} chunks came back without summary text",
            empty,
            partials.len()
        );
    }

    let combined = partials
        .iter()
        .filter_map(PartialSummary::text)
        .collect::<Vec<_>>()
        .join(" ");

    // Nothing to reduce; caching an empty summary would pin it for this URL.
    if combined.is_empty() {
        return Err(PipelineError::Summarization {
            message: "No section summaries were produced".to_string(),
            details: None,
        });
    }

    let inputs = format!("{}{}", FINAL_PROMPT, combined);
    let reduced = provider.summarize(&inputs).await.map_err(|e| {
        warn!("summarizer: reduction pass failed: {}", e);
        PipelineError::summarization("Failed to summarize final summary", e)
    })?;

    match reduced {
        PartialSummary::Summarized(summary) => {
            info!(
                "summarizer: reduced {} section summaries into {} chars",
                partials.len() - empty,
                summary.len()
            );
            Ok(summary)
        }
        PartialSummary::Empty => {
            warn!("summarizer: reduction pass returned no text, using joined section summaries");
            Ok(combined)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::InferenceError;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned answers in call order and records every prompt it sees.
    struct Scripted {
        answers: Mutex<VecDeque<Result<PartialSummary, InferenceError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<PartialSummary, InferenceError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl InferenceProvider for Scripted {
        async fn summarize(&self, inputs: &str) -> Result<PartialSummary, InferenceError> {
            self.prompts.lock().unwrap().push(inputs.to_string());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(PartialSummary::Empty))
        }
    }

    fn text(s: &str) -> Result<PartialSummary, InferenceError> {
        Ok(PartialSummary::Summarized(s.to_string()))
    }

    fn chunks(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Chunk number {i} body.")).collect()
    }

    #[tokio::test]
    async fn partials_are_joined_then_reduced() {
        let provider = Scripted::new(vec![text("S1"), text("S2"), text("S3"), text("FINAL")]);

        let summary = summarize_chunks(&provider, &chunks(3), 1).await.expect("summary");
        assert_eq!(summary, "FINAL");

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 4);
        assert_eq!(prompts[0], format!("{}Chunk number 1 body.", CHUNK_PROMPT));
        assert_eq!(prompts[3], format!("{}S1 S2 S3", FINAL_PROMPT));
    }

    #[tokio::test]
    async fn chunk_error_aborts_before_reduction() {
        let provider = Scripted::new(vec![
            text("S1"),
            Err(InferenceError::Upstream {
                detail: serde_json::json!("rate limited"),
            }),
            text("S3"),
            text("FINAL"),
        ]);

        let err = summarize_chunks(&provider, &chunks(3), 1).await.unwrap_err();
        match err {
            PipelineError::Summarization { message, details } => {
                assert_eq!(message, "Failed to summarize text");
                assert_eq!(details, Some(serde_json::json!("rate limited")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The third chunk and the reduction pass are never submitted.
        assert_eq!(provider.prompts().len(), 2);
    }

    #[tokio::test]
    async fn empty_reduction_falls_back_to_joined_partials() {
        let provider = Scripted::new(vec![text("S1"), text("S2"), Ok(PartialSummary::Empty)]);

        let summary = summarize_chunks(&provider, &chunks(2), 1).await.expect("summary");
        assert_eq!(summary, "S1 S2");
    }

    #[tokio::test]
    async fn reduction_error_is_reported() {
        let provider = Scripted::new(vec![
            text("S1"),
            Err(InferenceError::Upstream {
                detail: serde_json::json!({"message": "overloaded"}),
            }),
        ]);

        let err = summarize_chunks(&provider, &chunks(1), 1).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to summarize final summary");
    }

    #[tokio::test]
    async fn empty_partials_are_skipped_in_join() {
        let provider = Scripted::new(vec![text("S1"), Ok(PartialSummary::Empty), text("S3"), text("FINAL")]);

        summarize_chunks(&provider, &chunks(3), 1).await.expect("summary");
        assert_eq!(provider.prompts()[3], format!("{}S1 S3", FINAL_PROMPT));
    }

    #[tokio::test]
    async fn all_partials_empty_is_an_error() {
        let provider = Scripted::new(vec![Ok(PartialSummary::Empty), Ok(PartialSummary::Empty)]);

        let err = summarize_chunks(&provider, &chunks(2), 1).await.unwrap_err();
        assert!(matches!(err, PipelineError::Summarization { details: None, .. }));
        assert_eq!(provider.prompts().len(), 2);
    }

    /// Answers with the chunk's own number, finishing later chunks first.
    struct Echo;

    #[async_trait::async_trait]
    impl InferenceProvider for Echo {
        async fn summarize(&self, inputs: &str) -> Result<PartialSummary, InferenceError> {
            if inputs.starts_with(FINAL_PROMPT) {
                return Ok(PartialSummary::Summarized(inputs[FINAL_PROMPT.len()..].to_string()));
            }
            let n: u64 = inputs
                .trim_end_matches(" body.")
                .rsplit(' ')
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(50 * (5 - n))).await;
            Ok(PartialSummary::Summarized(format!("S{n}")))
        }
    }

    #[tokio::test]
    async fn parallel_chunks_keep_chunk_order() {
        let summary = summarize_chunks(&Echo, &chunks(4), 4).await.expect("summary");
        assert_eq!(summary, "S1 S2 S3 S4");
    }
}
