//! Recursive separator splitter with character-exact overlap.
//!
//! Text is first cut into pieces no longer than `chunk_size`, trying the
//! coarsest separator first and re-splitting oversized pieces with the finer
//! ones. Pieces keep their trailing separator so they concatenate back to the
//! input. Pieces are then merged greedily into chunks; each chunk after the
//! first starts with the last `overlap` characters of its predecessor.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

/// Paragraph break, line break, sentence end, word break, single character.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Chunk budget and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1500, overlap: 300 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.overlap == 0 || self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking requires 0 < overlap < chunk_size (chunk_size={}, overlap={})",
                self.chunk_size, self.overlap
            )));
        }
        Ok(())
    }
}

/// Split one document with the default separators.
pub fn chunk(document: &Document, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(Chunker::new(ChunkingConfig { chunk_size, overlap })?.chunk(document))
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
    separators: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Piece<'a> {
    text: &'a str,
    // No separator could bring it under `chunk_size`.
    atomic: bool,
}

#[derive(Debug, Default)]
struct Buffer {
    text: String,
    len: usize,
    carried: usize,
}

impl Buffer {
    fn has_fresh(&self) -> bool {
        self.len > self.carried
    }

    fn push(&mut self, s: &str, len: usize) {
        self.text.push_str(s);
        self.len += len;
    }

    /// Hand out the buffered chunk and restart from its last `overlap` characters.
    fn emit(&mut self, overlap: usize) -> String {
        let emitted = std::mem::take(&mut self.text);
        self.restart_from(&emitted, overlap);
        emitted
    }

    fn restart_from(&mut self, emitted: &str, overlap: usize) {
        let tail = char_tail(emitted, overlap);
        self.text = tail.to_string();
        self.len = char_len(tail);
        self.carried = self.len;
    }
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        Self::with_separators(config, DEFAULT_SEPARATORS)
    }

    /// Use a custom separator list, coarsest first. Without a trailing `""`
    /// entry, unsplittable runs longer than `chunk_size` become oversized chunks.
    pub fn with_separators<I, S>(config: ChunkingConfig, separators: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        config.validate()?;
        Ok(Self { config, separators: separators.into_iter().map(Into::into).collect() })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.raw_text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                source_id: document.source_id.clone(),
                chunk_index,
                text,
            })
            .collect()
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut pieces = Vec::new();
        if char_len(text) <= self.config.chunk_size {
            pieces.push(Piece { text, atomic: false });
        } else {
            self.split_recursive(text, &self.separators, &mut pieces);
        }
        self.merge(&pieces)
    }

    fn split_recursive<'a>(&self, text: &'a str, separators: &[String], out: &mut Vec<Piece<'a>>) {
        let size = self.config.chunk_size;
        let found = separators.iter().position(|s| s.is_empty() || text.contains(s.as_str()));
        let Some(pos) = found else {
            out.push(Piece { text, atomic: char_len(text) > size });
            return;
        };
        let sep = separators[pos].as_str();
        if sep.is_empty() {
            out.extend(
                text.char_indices()
                    .map(|(i, c)| Piece { text: &text[i..i + c.len_utf8()], atomic: false }),
            );
            return;
        }
        let finer = &separators[pos + 1..];
        for part in text.split_inclusive(sep) {
            if char_len(part) <= size {
                out.push(Piece { text: part, atomic: false });
            } else {
                self.split_recursive(part, finer, out);
            }
        }
    }

    fn merge(&self, pieces: &[Piece<'_>]) -> Vec<String> {
        let ChunkingConfig { chunk_size, overlap } = self.config;
        let mut chunks = Vec::new();
        let mut buf = Buffer::default();

        for piece in pieces {
            if piece.atomic {
                if buf.has_fresh() {
                    chunks.push(buf.emit(overlap));
                }
                chunks.push(piece.text.to_string());
                buf.restart_from(piece.text, overlap);
                continue;
            }

            let mut rest = piece.text;
            while !rest.is_empty() {
                let len = char_len(rest);
                let room = chunk_size - buf.len;
                if len <= room {
                    buf.push(rest, len);
                    break;
                }
                // A chunk shorter than `overlap` could not seed the next one in full.
                if buf.has_fresh() && buf.len >= overlap {
                    chunks.push(buf.emit(overlap));
                    continue;
                }
                let (head, tail) = split_at_char(rest, room);
                buf.push(head, room);
                chunks.push(buf.emit(overlap));
                rest = tail;
            }
        }

        if buf.has_fresh() {
            chunks.push(buf.text);
        }
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn char_tail(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    s.char_indices().rev().nth(n - 1).map_or(s, |(i, _)| &s[i..])
}

fn split_at_char(s: &str, n: usize) -> (&str, &str) {
    let idx = s.char_indices().nth(n).map_or(s.len(), |(i, _)| i);
    s.split_at(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("doc.pdf", text)
    }

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    fn assert_exact_overlap(chunks: &[Chunk], overlap: usize) {
        for pair in chunks.windows(2) {
            let prev = &pair[0].text;
            let next = &pair[1].text;
            let head = split_at_char(next, overlap).0;
            assert_eq!(char_tail(prev, overlap), head, "{prev:?} -> {next:?}");
        }
    }

    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&c.text);
            } else {
                out.push_str(split_at_char(&c.text, overlap).1);
            }
        }
        out
    }

    #[test]
    fn sentences_with_two_char_overlap() {
        let chunks = chunk(&doc("A. B. C. D."), 6, 2).expect("chunk");
        assert_eq!(texts(&chunks), vec!["A. B. ", ". C. ", ". D."]);
        assert_exact_overlap(&chunks, 2);
        for sentence in ["A.", "B.", "C.", "D."] {
            assert!(chunks.iter().any(|c| c.text.contains(sentence)), "missing {sentence}");
        }
        let indices: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn rejects_bad_overlap() {
        for (size, overlap) in [(10, 0), (10, 10), (10, 11), (0, 0)] {
            let err = chunk(&doc("text"), size, overlap).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)), "size={size} overlap={overlap}");
        }
    }

    #[test]
    fn empty_and_short_text() {
        assert!(chunk(&doc(""), 10, 2).expect("chunk").is_empty());
        let chunks = chunk(&doc("tiny"), 10, 2).expect("chunk");
        assert_eq!(texts(&chunks), vec!["tiny"]);
    }

    #[test]
    fn hard_slices_words_without_separators() {
        let chunks = chunk(&doc("abcdefghijklmnopqrstuvwxyz"), 10, 3).expect("chunk");
        assert_eq!(texts(&chunks), vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]);
    }

    #[test]
    fn paragraphs_are_covered_losslessly() {
        let text = "Revenue grew in the third quarter.\n\nOperating costs fell. Margins improved \
                    across all segments.\nGuidance was raised.\n\nThe board approved a dividend.";
        let chunker = Chunker::new(ChunkingConfig { chunk_size: 40, overlap: 8 }).expect("chunker");
        let chunks = chunker.chunk(&doc(text));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(char_len(&c.text) <= 40, "oversized chunk {:?}", c.text);
        }
        assert_exact_overlap(&chunks, 8);
        assert_eq!(reconstruct(&chunks, 8), text);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "one two three four five six seven eight nine ten\n".repeat(20);
        let chunker =
            Chunker::new(ChunkingConfig { chunk_size: 64, overlap: 16 }).expect("chunker");
        let a = chunker.chunk(&doc(&text));
        let b = chunker.chunk(&doc(&text));
        assert_eq!(a, b);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "éèêë àâä ôö ûüù ïî çœæ";
        let chunks = chunk(&doc(text), 6, 2).expect("chunk");
        for c in &chunks {
            assert!(char_len(&c.text) <= 6);
        }
        assert_exact_overlap(&chunks, 2);
        assert_eq!(reconstruct(&chunks, 2), text);
    }

    #[test]
    fn atomic_piece_is_emitted_oversized() {
        let long_word = "x".repeat(20);
        let text = format!("aa {long_word} bb");
        let chunker = Chunker::with_separators(ChunkingConfig { chunk_size: 8, overlap: 2 }, [" "])
            .expect("chunker");
        let chunks = chunker.chunk(&doc(&text));
        let expected = vec!["aa ".to_string(), format!("{long_word} "), "x bb".to_string()];
        assert_eq!(texts(&chunks), expected);
    }
}
