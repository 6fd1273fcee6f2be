//! Grounded prompt template.

use docqa_memory::ScoredChunk;

/// Bumped whenever the template wording changes.
pub const PROMPT_VERSION: &str = "1";

/// Exact reply the model is told to give when the context lacks the answer.
pub const FALLBACK_ANSWER: &str = "The information is not available in the provided context";

/// Separates retrieved chunks inside the `Context:` block.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

const GUARDRAILS: &str = "\
- Do not provide personal advice or medical/legal guidance
- Remain objective and avoid subjective opinions
- Only answer based on the provided context
- Do not make assumptions or use external knowledge";

/// Render the prompt for `question` over `context`, in retrieval order.
#[must_use]
pub fn render(context: &[&str], question: &str) -> String {
    let context = context.join(CONTEXT_DELIMITER);
    format!(
        "You are a helpful assistant answering questions based on provided context.\n\
         \n\
         Instructions:\n\
         - Answer ONLY using information from the context below\n\
         - Be concise and direct\n\
         - If the context doesn't contain the answer, explicitly say \"{FALLBACK_ANSWER}\"\n\
         {GUARDRAILS}\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question:\n\
         {question}\n\
         \n\
         Answer:"
    )
}

/// [`render`] over retrieval results.
#[must_use]
pub fn render_chunks(chunks: &[ScoredChunk], question: &str) -> String {
    let texts: Vec<&str> = chunks.iter().map(|c| c.chunk.text.as_str()).collect();
    render(&texts, question)
}
