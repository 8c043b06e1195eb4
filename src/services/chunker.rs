//! Token-aware text chunking with paragraph and sentence boundaries.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::ChunkError;
use crate::models::{Chunk, ChunkingConfig, SentenceMode};
use crate::services::tokens::{TokenCounter, build_token_counter};

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n\s*\r?\n").unwrap());

static SENTENCE_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+\s+").unwrap());

/// Words whose trailing period does not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr.", "mrs.", "ms.", "dr.", "prof.", "sr.", "jr.", "st.", "vs.", "etc.", "e.g.", "i.e.",
    "inc.", "ltd.", "co.", "corp.", "dept.", "fig.", "al.", "no.", "vol.", "approx.", "u.s.",
    "u.k.", "a.m.", "p.m.",
];

/// A paragraph, or a sentence of an oversize paragraph, waiting to be
/// packed into a chunk. `sep` is the separator that preceded it in the
/// source and is reused when the segment joins an existing buffer.
struct Segment {
    text: String,
    sep: &'static str,
}

/// Splits documents into token-bounded chunks with overlap.
///
/// Paragraphs are the preferred unit; a paragraph too large for any chunk
/// falls back to sentences. A single sentence larger than the chunk budget
/// becomes its own oversize chunk rather than being cut mid-word.
pub struct TextChunker {
    config: ChunkingConfig,
    counter: Arc<dyn TokenCounter>,
}

impl TextChunker {
    pub fn new(config: &ChunkingConfig, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            config: config.clone(),
            counter,
        }
    }

    /// Chunker with default budgets and the tokenizer named in the config.
    pub fn with_defaults() -> Result<Self, crate::error::ConfigError> {
        let config = ChunkingConfig::default();
        let counter = build_token_counter(config.tokenizer)?;
        Ok(Self::new(&config, counter))
    }

    /// Split `content` into chunks carrying `source_id`/`source_name`.
    ///
    /// Blank content yields no chunks. Blank source fields are an error.
    pub fn chunk(
        &self,
        content: &str,
        source_id: &str,
        source_name: &str,
    ) -> Result<Vec<Chunk>, ChunkError> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        if source_id.trim().is_empty() {
            return Err(ChunkError::EmptySourceId);
        }
        if source_name.trim().is_empty() {
            return Err(ChunkError::EmptySourceName);
        }

        if self.count(content) <= self.config.chunk_size_tokens {
            return Ok(vec![Chunk::new(
                content.to_string(),
                0,
                source_id,
                source_name,
            )]);
        }

        let segments = self.segments(content);
        let pieces = self.assemble(segments);
        let pieces = self.merge_small(pieces);

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(idx, text)| Chunk::new(text, idx, source_id, source_name))
            .collect();

        debug!(
            source_id,
            chunk_count = chunks.len(),
            "chunked source document"
        );
        Ok(chunks)
    }

    fn count(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Break content into paragraphs, flattening oversize paragraphs into
    /// sentence segments.
    fn segments(&self, content: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        for paragraph in PARAGRAPH_BREAK.split(content) {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            if self.count(paragraph) <= self.config.chunk_size_tokens {
                segments.push(Segment {
                    text: paragraph.to_string(),
                    sep: "\n\n",
                });
            } else {
                for (i, sentence) in self.split_sentences(paragraph).into_iter().enumerate() {
                    segments.push(Segment {
                        text: sentence,
                        sep: if i == 0 { "\n\n" } else { " " },
                    });
                }
            }
        }
        segments
    }

    /// Greedily pack segments into chunk texts, seeding each new chunk with
    /// the overlap suffix of the one it follows.
    fn assemble(&self, segments: Vec<Segment>) -> Vec<String> {
        let mut pieces: Vec<String> = Vec::new();
        let mut current = String::new();

        for seg in segments {
            if current.is_empty() {
                current = seg.text;
            } else {
                let mut candidate =
                    String::with_capacity(current.len() + seg.sep.len() + seg.text.len());
                candidate.push_str(&current);
                candidate.push_str(seg.sep);
                candidate.push_str(&seg.text);

                if self.count(&candidate) <= self.config.chunk_size_tokens {
                    current = candidate;
                    continue;
                }

                let overlap = self.overlap_suffix(&current);
                pieces.push(std::mem::take(&mut current));
                current = if overlap.is_empty() {
                    seg.text
                } else {
                    let mut seeded =
                        String::with_capacity(overlap.len() + seg.sep.len() + seg.text.len());
                    seeded.push_str(&overlap);
                    seeded.push_str(seg.sep);
                    seeded.push_str(&seg.text);
                    // a segment close to the budget leaves no room for overlap
                    if self.count(&seeded) <= self.config.chunk_size_tokens {
                        seeded
                    } else {
                        seg.text
                    }
                };
            }

            // an unsplittable oversize segment becomes its own chunk
            if self.count(&current) > self.config.chunk_size_tokens {
                pieces.push(std::mem::take(&mut current));
            }
        }

        if !current.is_empty() {
            pieces.push(current);
        }
        pieces
    }

    /// Shortest suffix of `text` worth at least `overlap_tokens`, found by
    /// binary search over suffix lengths, then snapped forward to a word
    /// boundary when one falls in the first half of the suffix.
    fn overlap_suffix(&self, text: &str) -> String {
        if self.config.overlap_tokens == 0 {
            return String::new();
        }
        if self.count(text) <= self.config.overlap_tokens {
            return text.to_string();
        }

        let chars: Vec<char> = text.chars().collect();
        let mut lo = 1usize;
        let mut hi = chars.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let suffix: String = chars[chars.len() - mid..].iter().collect();
            if self.count(&suffix) >= self.config.overlap_tokens {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }

        let mut start = chars.len() - lo;
        if start > 0 && !chars[start].is_whitespace() && !chars[start - 1].is_whitespace() {
            // mid-word cut; prefer the next word boundary when it is near
            if let Some(ws) = chars[start..].iter().position(|c| c.is_whitespace())
                && ws < lo / 2
            {
                start += ws;
            }
        }

        chars[start..]
            .iter()
            .collect::<String>()
            .trim_start()
            .to_string()
    }

    fn split_sentences(&self, paragraph: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut start = 0;
        for m in SENTENCE_BOUNDARY.find_iter(paragraph) {
            if self.config.sentence_mode == SentenceMode::Improved
                && !is_sentence_boundary(paragraph, m.start(), m.end(), m.as_str())
            {
                continue;
            }
            let sentence = paragraph[start..m.end()].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = m.end();
        }
        let tail = paragraph[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail.to_string());
        }
        sentences
    }

    /// Merge chunks below the minimum size into their successor when the
    /// merged text still fits the budget. The last chunk may stay small.
    fn merge_small(&self, mut pieces: Vec<String>) -> Vec<String> {
        let mut out = Vec::with_capacity(pieces.len());
        let mut idx = 0;
        while idx < pieces.len() {
            let is_last = idx + 1 == pieces.len();
            if !is_last && self.count(&pieces[idx]) < self.config.min_chunk_tokens {
                let merged = format!("{}\n\n{}", pieces[idx], pieces[idx + 1]);
                if self.count(&merged) <= self.config.chunk_size_tokens {
                    pieces[idx + 1] = merged;
                    idx += 1;
                    continue;
                }
            }
            out.push(std::mem::take(&mut pieces[idx]));
            idx += 1;
        }
        out
    }
}

/// Decide whether a punctuation match really ends a sentence.
fn is_sentence_boundary(text: &str, punct_start: usize, after: usize, matched: &str) -> bool {
    // the next sentence must start with an uppercase letter
    if let Some(next) = text[after..].chars().next()
        && !next.is_uppercase()
    {
        return false;
    }

    // abbreviation checks only apply to a bare period
    if matched.trim_end() != "." {
        return true;
    }

    let before = &text[..punct_start];
    let word_start = before
        .rfind(char::is_whitespace)
        .map(|i| {
            let ws_len = before[i..].chars().next().map_or(1, char::len_utf8);
            i + ws_len
        })
        .unwrap_or(0);
    let word = &text[word_start..punct_start + 1];
    let lowered = word.to_lowercase();

    if ABBREVIATIONS.contains(&lowered.as_str()) {
        return false;
    }
    // single-letter initials, as in "J. Smith"
    if word.chars().count() == 2
        && word.chars().next().is_some_and(|c| c.is_uppercase())
    {
        return false;
    }
    true
}
