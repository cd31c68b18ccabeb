//! Paragraph-respecting chunker (C2).
//!
//! Greedily accumulates paragraphs into bounded-size chunks, never splitting
//! a paragraph mid-way. Grounded on `BatchOrchestrator._create_chunks`'s
//! inline fallback algorithm, which is the same algorithm this component
//! implements as a standalone, injectable step.

use crate::ids::ChunkIndex;
use serde::{Deserialize, Serialize};

/// A bounded-size translation unit (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique id within the job; defines merge order (`chunk_<index>`).
    pub id: String,
    /// Chunk text. Contains placeholder tokens, never raw math/code, once
    /// C1 preprocessing has run.
    pub text: String,
    /// Half-open byte range `[start, end)` into the preprocessed source.
    pub byte_range: (usize, usize),
}

/// Split `text` into paragraph-respecting chunks of at most `chunk_size`
/// bytes each (a single oversized paragraph is still emitted whole, never
/// split mid-paragraph). Empty input yields a single chunk containing the
/// (possibly empty) original text.
pub fn chunk(text: &str, chunk_size: usize) -> Vec<Chunk> {
    let paragraphs: Vec<&str> = text.split("\n\n").collect();

    if paragraphs.iter().all(|p| p.is_empty()) {
        return vec![Chunk {
            id: ChunkIndex(0).chunk_id(),
            text: text.to_string(),
            byte_range: (0, text.len()),
        }];
    }

    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_start = 0usize;
    let mut cursor = 0usize;
    let mut index = 0usize;

    fn flush(
        buffer: &mut String,
        buffer_start: usize,
        cursor: usize,
        index: &mut usize,
        chunks: &mut Vec<Chunk>,
    ) {
        if buffer.is_empty() {
            return;
        }
        chunks.push(Chunk {
            id: ChunkIndex(*index).chunk_id(),
            text: buffer.clone(),
            byte_range: (buffer_start, cursor),
        });
        *index += 1;
        buffer.clear();
    }

    for (i, para) in paragraphs.iter().enumerate() {
        let would_be = if buffer.is_empty() {
            para.len()
        } else {
            buffer.len() + 2 + para.len()
        };

        if !buffer.is_empty() && would_be > chunk_size {
            flush(&mut buffer, buffer_start, cursor, &mut index, &mut chunks);
            buffer_start = cursor;
        }

        if buffer.is_empty() {
            buffer.push_str(para);
        } else {
            buffer.push_str("\n\n");
            buffer.push_str(para);
        }

        cursor += para.len();
        if i + 1 < paragraphs.len() {
            cursor += 2; // the "\n\n" separator consumed by split
        }
    }
    flush(&mut buffer, buffer_start, cursor, &mut index, &mut chunks);

    if chunks.is_empty() {
        chunks.push(Chunk {
            id: ChunkIndex(0).chunk_id(),
            text: text.to_string(),
            byte_range: (0, text.len()),
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_one_chunk() {
        let chunks = chunk("", 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "chunk_0");
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn ids_start_at_zero_and_increment() {
        let text = "a".repeat(50) + "\n\n" + &"b".repeat(50) + "\n\n" + &"c".repeat(50);
        let chunks = chunk(&text, 60);
        assert_eq!(chunks[0].id, "chunk_0");
        assert_eq!(chunks[1].id, "chunk_1");
        assert_eq!(chunks[2].id, "chunk_2");
    }

    #[test]
    fn oversized_single_paragraph_is_its_own_chunk() {
        let text = "x".repeat(500);
        let chunks = chunk(&text, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text.len(), 500);
    }

    #[test]
    fn paragraphs_never_split_mid_way() {
        let p1 = "Hello.";
        let p2 = "World.";
        let text = format!("{p1}\n\n{p2}");
        let chunks = chunk(&text, 4);
        // each paragraph too big for chunk_size=4, but never split internally
        assert!(chunks.iter().any(|c| c.text == p1));
        assert!(chunks.iter().any(|c| c.text == p2));
    }

    #[test]
    fn greedily_accumulates_until_size_exceeded() {
        let text = "aa\n\nbb\n\ncc";
        let chunks = chunk(text, 6);
        // "aa\n\nbb" = 6 bytes fits, "cc" starts a new chunk
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "aa\n\nbb");
        assert_eq!(chunks[1].text, "cc");
    }
}
