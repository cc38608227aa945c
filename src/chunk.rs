//! Overlapping word-window chunker.
//!
//! Splits document text into fixed-size windows of whitespace-separated
//! words. Consecutive windows share `overlap` words so clause boundaries
//! are not lost at window edges. Window positions advance by
//! `chunk_size - overlap` words.

/// Split text into overlapping word windows.
///
/// Returns windows in document order. Empty or whitespace-only input
/// yields no chunks. The final window may be shorter than `chunk_size`;
/// it is emitted once the window reaches the end of the text, so no
/// trailing words are dropped and no redundant tail-only window follows
/// a window that already covered the end.
///
/// Callers must guarantee `overlap < chunk_size`; config validation
/// enforces this before the pipeline runs.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let stride = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut i = 0;

    loop {
        let end = (i + chunk_size).min(words.len());
        chunks.push(words[i..end].join(" "));
        if i + chunk_size >= words.len() {
            break;
        }
        i += stride;
    }

    chunks
}

/// Count whitespace-separated words, matching the chunker's tokenization.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 500, 50).is_empty());
        assert!(chunk_text("   \n\t  ", 500, 50).is_empty());
    }

    #[test]
    fn short_text_single_chunk() {
        let text = words(100);
        let chunks = chunk_text(&text, 500, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn exact_window_single_chunk() {
        let text = words(500);
        let chunks = chunk_text(&text, 500, 50);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        let text = words(1000);
        let chunks = chunk_text(&text, 500, 50);
        assert_eq!(chunks.len(), 2);
        // Second window starts at word 450
        assert!(chunks[1].starts_with("w450 "));
        // Last 50 words of window 0 are the first 50 of window 1
        let tail: Vec<&str> = chunks[0].split(' ').rev().take(50).collect();
        let head: Vec<&str> = chunks[1].split(' ').take(50).collect();
        let tail_rev: Vec<&str> = tail.into_iter().rev().collect();
        assert_eq!(tail_rev, head);
    }

    #[test]
    fn no_words_dropped() {
        for n in [1, 449, 450, 451, 500, 501, 899, 900, 901, 1350] {
            let text = words(n);
            let chunks = chunk_text(&text, 500, 50);
            let last = chunks.last().unwrap();
            assert!(
                last.ends_with(&format!("w{}", n - 1)),
                "last word missing for n={}",
                n
            );
        }
    }

    #[test]
    fn no_redundant_tail_window() {
        // 900 words: window 0 covers 0..500, window 1 covers 450..900
        // and already reaches the end, so there is no third window.
        let text = words(900);
        let chunks = chunk_text(&text, 500, 50);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn whitespace_normalized() {
        let chunks = chunk_text("alpha\n\nbeta\t gamma", 500, 50);
        assert_eq!(chunks, vec!["alpha beta gamma".to_string()]);
    }

    #[test]
    fn word_count_matches_tokenization() {
        assert_eq!(word_count("one  two\nthree"), 3);
        assert_eq!(word_count(""), 0);
    }
}
