//! Overlapping window chunker.
//!
//! Splits each page's text into windows of at most `chunk_size` characters,
//! each sharing up to `chunk_overlap` characters with its predecessor. Pages
//! are chunked independently so every chunk carries exactly one page number.
//!
//! # Algorithm
//!
//! 1. A page no longer than `chunk_size` becomes a single chunk.
//! 2. Otherwise the window `[start, start + chunk_size)` is cut at the last
//!    paragraph break, else sentence end, else line break, else whitespace
//!    that lies after `start + chunk_overlap`. With no such boundary the window
//!    is hard-cut at `chunk_size`.
//! 3. The next window starts `chunk_overlap` characters before the cut, moved
//!    forward to the first word start in that region when there is one.
//!
//! Because each window starts at or before the previous cut, every character
//! of the page lands in at least one chunk. Sizes and offsets count `char`s,
//! so multi-byte text is never split inside a character.
//!
//! # Example
//!
//! ```rust
//! use book_rag::chunk::chunk_pages;
//! use book_rag::models::Page;
//!
//! let pages = vec![Page::new(1, "A short page.")];
//! let chunks = chunk_pages(&pages, 1000, 200);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "A short page.");
//! ```

use crate::models::{Chunk, Page};

type BreakRule = fn(&[char], usize) -> bool;

/// Boundary rules in order of preference. Each tests whether a window may
/// end right before position `cut`.
const BREAK_RULES: [BreakRule; 4] = [after_paragraph, after_sentence, after_line, after_space];

fn after_paragraph(c: &[char], cut: usize) -> bool {
    cut >= 2 && c[cut - 1] == '\n' && c[cut - 2] == '\n'
}

fn after_sentence(c: &[char], cut: usize) -> bool {
    cut >= 2 && c[cut - 1].is_whitespace() && matches!(c[cut - 2], '.' | '!' | '?')
}

fn after_line(c: &[char], cut: usize) -> bool {
    c[cut - 1] == '\n'
}

fn after_space(c: &[char], cut: usize) -> bool {
    c[cut - 1].is_whitespace()
}

/// Chunk every page, in page order. Whitespace-only pages produce nothing.
pub fn chunk_pages(pages: &[Page], chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    pages
        .iter()
        .filter(|p| !p.text.trim().is_empty())
        .flat_map(|p| chunk_page(p, chunk_size, chunk_overlap))
        .collect()
}

/// Chunk a single page.
pub fn chunk_page(page: &Page, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let overlap = chunk_overlap.min(chunk_size - 1);

    let chars: Vec<char> = page.text.chars().collect();
    let offsets: Vec<usize> = page
        .text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(page.text.len()))
        .collect();
    let len = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let limit = start + chunk_size;
        let end = if limit >= len {
            len
        } else {
            find_cut(&chars, start + overlap + 1, limit)
        };

        chunks.push(Chunk {
            page: page.number,
            index_in_page: chunks.len(),
            start,
            end,
            text: page.text[offsets[start]..offsets[end]].to_string(),
        });

        if end >= len {
            break;
        }
        start = next_start(&chars, end - overlap, end);
    }

    chunks
}

/// Last position in `min..=max` accepted by the highest-priority rule.
fn find_cut(chars: &[char], min: usize, max: usize) -> usize {
    for rule in BREAK_RULES {
        if let Some(cut) = (min..=max).rev().find(|&cut| rule(chars, cut)) {
            return cut;
        }
    }
    max
}

/// First word start in `from..end`, or `from` if the region has none.
fn next_start(chars: &[char], from: usize, end: usize) -> usize {
    (from..end)
        .find(|&p| p > 0 && chars[p - 1].is_whitespace() && !chars[p].is_whitespace())
        .unwrap_or(from)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic prose: sentences of varying length.
    fn prose(target_chars: usize, seed: u64) -> String {
        let words = [
            "the", "river", "carried", "old", "letters", "toward", "a", "quiet", "harbor",
            "where", "nobody", "remembered", "their", "names",
        ];
        let mut state = seed;
        let mut out = String::new();
        let mut in_sentence = 0;
        while out.chars().count() < target_chars {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let w = words[(state >> 33) as usize % words.len()];
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(w);
            in_sentence += 1;
            if in_sentence > 4 + (state >> 60) as usize {
                out.push('.');
                in_sentence = 0;
            }
        }
        out.chars().take(target_chars).collect()
    }

    fn assert_covers(page: &Page, chunks: &[Chunk]) {
        let len = page.text.chars().count();
        let mut covered = vec![false; len];
        for c in chunks {
            assert_eq!(c.page, page.number);
            let slice: String = page.text.chars().skip(c.start).take(c.end - c.start).collect();
            assert_eq!(slice, c.text, "chunk text must be a slice of its page");
            for flag in covered.iter_mut().take(c.end).skip(c.start) {
                *flag = true;
            }
        }
        assert!(covered.iter().all(|&f| f), "every character must be covered");
    }

    #[test]
    fn test_short_page_single_chunk() {
        let page = Page::new(3, "Hello, world!");
        let chunks = chunk_page(&page, 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].page, 3);
    }

    #[test]
    fn test_page_exactly_chunk_size() {
        let text = "x".repeat(1000);
        let chunks = chunk_page(&Page::new(1, text.clone()), 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_whitespace_pages_dropped() {
        let pages = vec![Page::new(1, "   \n\t "), Page::new(2, "content")];
        let chunks = chunk_pages(&pages, 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, 2);
    }

    #[test]
    fn test_1500_char_page_yields_two_overlapping_chunks() {
        let page = Page::new(2, prose(1500, 7));
        let chunks = chunk_page(&page, 1000, 200);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].start < chunks[0].end, "chunks must overlap");
        assert!(chunks[0].end - chunks[1].start <= 200);
        assert_covers(&page, &chunks);
    }

    #[test]
    fn test_three_page_document() {
        let pages = vec![
            Page::new(1, prose(420, 1)),
            Page::new(2, prose(1500, 2)),
            Page::new(3, prose(300, 3)),
        ];
        let chunks = chunk_pages(&pages, 1000, 200);
        let per_page: Vec<u32> = chunks.iter().map(|c| c.page).collect();
        assert_eq!(per_page, vec![1, 2, 2, 3]);
    }

    #[test]
    fn test_hard_cut_without_whitespace() {
        let page = Page::new(1, "a".repeat(2500));
        let chunks = chunk_page(&page, 1000, 200);
        let spans: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 1000), (800, 1800), (1600, 2500)]);
        assert_covers(&page, &chunks);
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let text = format!("{}\n\n{}", "a ".repeat(300).trim_end(), "b ".repeat(400));
        let page = Page::new(1, text);
        let chunks = chunk_page(&page, 1000, 200);
        assert!(chunks[0].text.ends_with("\n\n"));
    }

    #[test]
    fn test_coverage_and_size_bound() {
        for (size, overlap) in [(50, 10), (100, 0), (120, 119), (1000, 200), (37, 5)] {
            for seed in 0..5 {
                let page = Page::new(1, prose(3000, seed));
                let chunks = chunk_page(&page, size, overlap);
                assert_covers(&page, &chunks);
                for c in &chunks {
                    assert!(c.end - c.start <= size);
                    assert!(c.end > c.start);
                }
                for (i, c) in chunks.iter().enumerate() {
                    assert_eq!(c.index_in_page, i);
                }
            }
        }
    }

    #[test]
    fn test_multibyte_text() {
        let page = Page::new(1, "ümlaut ☃ snow ".repeat(200));
        let chunks = chunk_page(&page, 100, 20);
        assert!(chunks.len() > 1);
        assert_covers(&page, &chunks);
    }

    #[test]
    fn test_deterministic() {
        let pages = vec![Page::new(1, prose(5000, 11))];
        let c1 = chunk_pages(&pages, 500, 100);
        let c2 = chunk_pages(&pages, 500, 100);
        assert_eq!(c1, c2);
    }
}
