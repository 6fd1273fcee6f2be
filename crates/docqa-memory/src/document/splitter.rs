use super::error::ChunkError;
use super::types::{Chunk, Page};
use crate::tokenizer::Tokenize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

impl SplitterConfig {
    /// # Errors
    ///
    /// Returns [`ChunkError::InvalidConfig`] unless `0 <= chunk_overlap < chunk_size`.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(ChunkError::InvalidConfig {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }
}

/// Sliding token window over each page. Windows never span two pages.
#[derive(Debug, Clone)]
pub struct TokenSplitter {
    config: SplitterConfig,
}

impl TokenSplitter {
    /// # Errors
    ///
    /// Returns [`ChunkError::InvalidConfig`] for an unusable window.
    pub fn new(config: SplitterConfig) -> Result<Self, ChunkError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> SplitterConfig {
        self.config
    }

    /// Split `pages` into chunks numbered from 0 in page order.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization fails.
    pub fn split(
        &self,
        tokenizer: &(dyn Tokenize + '_),
        pages: &[Page],
    ) -> Result<Vec<Chunk>, ChunkError> {
        let size = self.config.chunk_size;
        let step = size - self.config.chunk_overlap;
        let mut chunks = Vec::new();

        for page in pages {
            let spans = tokenizer.tokenize(&page.text)?;
            if spans.is_empty() {
                continue;
            }

            let mut start = 0;
            let mut prev_id = None;
            loop {
                let end = (start + size).min(spans.len());
                let id = chunks.len();
                let text = page.text[spans[start].start..spans[end - 1].end].to_owned();
                chunks.push(Chunk {
                    id,
                    page: page.number,
                    text,
                    token_count: end - start,
                    token_start: start,
                    token_end: end,
                    prev_id,
                });
                prev_id = Some(id);

                if end == spans.len() {
                    break;
                }
                start += step;
            }
        }

        tracing::debug!(
            pages = pages.len(),
            chunks = chunks.len(),
            chunk_size = size,
            chunk_overlap = self.config.chunk_overlap,
            tokenizer = tokenizer.name(),
            "split document"
        );
        Ok(chunks)
    }
}

/// Convenience wrapper: validate the window and split in one call.
///
/// # Errors
///
/// Returns [`ChunkError::InvalidConfig`] when `chunk_overlap >= chunk_size`, or a
/// tokenizer error.
pub fn split(
    tokenizer: &(dyn Tokenize + '_),
    pages: &[Page],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    TokenSplitter::new(SplitterConfig {
        chunk_size,
        chunk_overlap,
    })?
    .split(tokenizer, pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::WhitespaceTokenizer;

    fn page(number: usize, text: &str) -> Page {
        Page {
            number,
            text: text.to_owned(),
            source: "test".to_owned(),
        }
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn overlap_equal_to_size_rejected() {
        let err = split(&WhitespaceTokenizer, &[page(1, "a b c")], 4, 4).unwrap_err();
        assert!(matches!(
            err,
            ChunkError::InvalidConfig {
                chunk_size: 4,
                chunk_overlap: 4
            }
        ));
    }

    #[test]
    fn zero_size_rejected() {
        assert!(split(&WhitespaceTokenizer, &[], 0, 0).is_err());
    }

    #[test]
    fn short_page_yields_single_chunk() {
        let chunks = split(&WhitespaceTokenizer, &[page(1, "Paris is the capital of France.")], 500, 100)
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Paris is the capital of France.");
        assert_eq!(chunks[0].token_count, 6);
        assert_eq!(chunks[0].prev_id, None);
    }

    #[test]
    fn window_slides_by_size_minus_overlap() {
        let chunks = split(&WhitespaceTokenizer, &[page(1, &words(10))], 4, 1).unwrap();
        let ranges: Vec<(usize, usize)> =
            chunks.iter().map(|c| (c.token_start, c.token_end)).collect();
        assert_eq!(ranges, [(0, 4), (3, 7), (6, 10)]);
        assert_eq!(chunks[1].text, "w3 w4 w5 w6");
        assert_eq!(chunks[2].prev_id, Some(1));
    }

    #[test]
    fn last_window_may_be_shorter() {
        let chunks = split(&WhitespaceTokenizer, &[page(1, &words(9))], 4, 1).unwrap();
        let last = chunks.last().unwrap();
        assert_eq!((last.token_start, last.token_end), (6, 9));
        assert_eq!(last.token_count, 3);
    }

    #[test]
    fn chunks_never_cross_pages() {
        let pages = [page(1, &words(5)), page(2, ""), page(3, "tail end")];
        let chunks = split(&WhitespaceTokenizer, &pages, 3, 1).unwrap();

        assert!(chunks.iter().all(|c| c.page == 1 || c.page == 3));
        let third = chunks.iter().find(|c| c.page == 3).unwrap();
        assert_eq!(third.text, "tail end");
        assert_eq!(third.prev_id, None);
        let ids: Vec<usize> = chunks.iter().map(|c| c.id).collect();
        assert_eq!(ids, (0..chunks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn text_preserves_inner_whitespace() {
        let chunks = split(&WhitespaceTokenizer, &[page(1, "a  b\nc d")], 3, 0).unwrap();
        assert_eq!(chunks[0].text, "a  b\nc");
        assert_eq!(chunks[1].text, "d");
    }

    #[test]
    fn subword_windows_slice_multibyte_text() {
        let tok = crate::tokenizer::tests::byte_level_bpe();
        let text = "Le café coûte 3 € — 日本語のテキスト. Then the end.";
        let total = tok.tokenize(text).unwrap().len();
        let chunks = split(&tok, &[page(1, text)], 5, 2).unwrap();

        assert!(chunks.len() > 1);
        assert_eq!(chunks.first().unwrap().token_start, 0);
        assert_eq!(chunks.last().unwrap().token_end, total);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].token_end - pair[1].token_start, 2);
        }
        for chunk in &chunks {
            assert!(chunk.token_count <= 5);
            assert!(text.contains(chunk.text.as_str()));
        }
    }

    mod proptest_splitter {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn subword_chunks_are_valid_slices(
                content in "\\PC{1,120}",
                chunk_size in 2usize..12,
                overlap_seed in 0usize..12,
            ) {
                let overlap = overlap_seed % chunk_size;
                let tok = crate::tokenizer::tests::byte_level_bpe();
                let chunks = split(&tok, &[page(1, &content)], chunk_size, overlap).unwrap();
                for chunk in &chunks {
                    prop_assert!(content.contains(chunk.text.as_str()));
                    prop_assert!(chunk.token_count <= chunk_size);
                }
                for pair in chunks.windows(2) {
                    prop_assert_eq!(pair[0].token_end - pair[1].token_start, overlap);
                }
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn split_is_deterministic(
                content in "[a-z ]{0,400}",
                chunk_size in 1usize..40,
                overlap_seed in 0usize..40,
            ) {
                let overlap = overlap_seed % chunk_size;
                let pages = [page(1, &content)];
                let a = split(&WhitespaceTokenizer, &pages, chunk_size, overlap).unwrap();
                let b = split(&WhitespaceTokenizer, &pages, chunk_size, overlap).unwrap();
                prop_assert_eq!(a, b);
            }

            #[test]
            fn token_count_bounded_by_size(
                content in "[a-z ]{1,400}",
                chunk_size in 1usize..40,
                overlap_seed in 0usize..40,
            ) {
                let overlap = overlap_seed % chunk_size;
                let chunks = split(&WhitespaceTokenizer, &[page(1, &content)], chunk_size, overlap).unwrap();
                for chunk in &chunks {
                    prop_assert!(chunk.token_count >= 1);
                    prop_assert!(chunk.token_count <= chunk_size);
                    prop_assert_eq!(
                        WhitespaceTokenizer.tokenize(&chunk.text).unwrap().len(),
                        chunk.token_count
                    );
                }
            }

            #[test]
            fn adjacent_chunks_share_overlap_tokens(
                content in "[a-z ]{1,400}",
                chunk_size in 2usize..40,
                overlap_seed in 0usize..40,
            ) {
                let overlap = overlap_seed % chunk_size;
                let chunks = split(&WhitespaceTokenizer, &[page(1, &content)], chunk_size, overlap).unwrap();
                for pair in chunks.windows(2) {
                    let (a, b) = (&pair[0], &pair[1]);
                    prop_assert_eq!(b.prev_id, Some(a.id));
                    prop_assert_eq!(a.token_end.saturating_sub(b.token_start), overlap);
                    prop_assert!(b.token_end > a.token_end);
                }
            }

            #[test]
            fn windows_cover_every_token(
                content in "[a-z ]{1,400}",
                chunk_size in 1usize..40,
                overlap_seed in 0usize..40,
            ) {
                let overlap = overlap_seed % chunk_size;
                let total = WhitespaceTokenizer.tokenize(&content).unwrap().len();
                let chunks = split(&WhitespaceTokenizer, &[page(1, &content)], chunk_size, overlap).unwrap();
                if total == 0 {
                    prop_assert!(chunks.is_empty());
                } else {
                    prop_assert_eq!(chunks.first().unwrap().token_start, 0);
                    prop_assert_eq!(chunks.last().unwrap().token_end, total);
                }
            }
        }
    }
}
