//! Interactive question loop.

use docqa_llm::{Embedder, Generator};

use crate::channel::{Channel, ChannelError};
use crate::error::QueryError;
use crate::pipeline::{Answer, Pipeline};

pub const BANNER: &str = "\
==================================================
Document QA - ask questions about your document
Type 'exit' to quit
==================================================";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("index unusable, ending session: {0}")]
    IndexUnavailable(#[source] QueryError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub asked: usize,
    pub answered: usize,
    pub failed: usize,
}

/// Render an answer with its source pages.
#[must_use]
pub fn format_answer(answer: &Answer) -> String {
    let pages = answer.source_pages();
    if pages.is_empty() {
        return format!("Answer: {}\n", answer.text);
    }
    let pages: Vec<String> = pages.iter().map(ToString::to_string).collect();
    format!("Answer: {}\n(pages: {})\n", answer.text, pages.join(", "))
}

/// Read questions from `channel` until the user quits. A failed question is reported
/// and the loop moves on, unless the index itself is missing or empty.
///
/// # Errors
///
/// Returns an error if the channel fails or the index cannot serve any question.
pub async fn run_chat<E, G, C>(
    pipeline: &Pipeline<E, G>,
    channel: &mut C,
) -> Result<SessionStats, ChatError>
where
    E: Embedder,
    G: Generator,
    C: Channel,
{
    let mut stats = SessionStats::default();
    channel.send(BANNER).await?;

    while let Some(message) = channel.recv().await? {
        let question = message.text.trim();
        if question.is_empty() {
            channel.send("Please enter a question.").await?;
            continue;
        }

        stats.asked += 1;
        tracing::info!(query = stats.asked, "processing query");
        channel.send_status("Searching and generating response...").await?;

        match pipeline.answer(question).await {
            Ok(answer) => {
                stats.answered += 1;
                channel.send(&format_answer(&answer)).await?;
            }
            Err(e) => {
                stats.failed += 1;
                tracing::error!(
                    query = stats.asked,
                    question,
                    stage = %e.stage,
                    retryable = e.is_retryable(),
                    "query failed: {e:#}"
                );
                channel.send(&format!("Error: {}\n", e.user_message())).await?;
                if e.is_fatal() {
                    return Err(ChatError::IndexUnavailable(e));
                }
            }
        }
    }

    channel.send("Goodbye!").await?;
    tracing::info!(
        asked = stats.asked,
        answered = stats.answered,
        failed = stats.failed,
        "chat session ended"
    );
    Ok(stats)
}
