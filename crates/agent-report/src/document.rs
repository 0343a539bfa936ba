//! Loaded report text and its search index
//!
//! Each conversation owns one [`DocumentState`]; the analysis tools read and
//! replace it through the session, so concurrent analyses never share a
//! document.

use crate::error::{ReportError, Result};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Target chunk length in characters
pub const CHUNK_SIZE: usize = 500;
/// Characters shared by neighbouring chunks
pub const CHUNK_OVERLAP: usize = 100;
/// Chunks returned per search
pub const SEARCH_RESULTS: usize = 3;

/// Split points, most preferred first; the empty separator splits characters
const SEPARATORS: &[&str] = &[
    "\n\n", "\n", "。", "！", "？", "；", "，", ".", "!", "?", " ", "",
];

/// A document loaded into a conversation
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub text: String,
    chunks: Vec<String>,
    grams: Vec<HashSet<(char, char)>>,
}

impl LoadedDocument {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        let chunks = split_text(&text, CHUNK_SIZE, CHUNK_OVERLAP);
        let grams = chunks.iter().map(|c| bigrams(c)).collect();
        Self {
            path: path.into(),
            text,
            chunks,
            grams,
        }
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    /// Up to `limit` chunks ranked by character-bigram overlap with `query`
    ///
    /// Chunks sharing nothing with the query are never returned; ties keep
    /// document order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&str> {
        let wanted = bigrams(query);
        if wanted.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize)> = self
            .grams
            .iter()
            .enumerate()
            .map(|(i, grams)| (i, wanted.intersection(grams).count()))
            .filter(|(_, score)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        scored
            .into_iter()
            .take(limit)
            .map(|(i, _)| self.chunks[i].as_str())
            .collect()
    }
}

/// Per-conversation document slot
#[derive(Debug, Default)]
pub struct DocumentState {
    document: Option<LoadedDocument>,
}

impl DocumentState {
    /// Replace the loaded document
    pub fn load(&mut self, document: LoadedDocument) -> &LoadedDocument {
        self.document.insert(document)
    }

    pub fn document(&self) -> Option<&LoadedDocument> {
        self.document.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }
}

/// Turns a file into plain text
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load_text(&self, path: &Path) -> Result<String>;
}

/// Reads PDFs with pdf-extract and anything else as UTF-8 text
pub struct FileDocumentLoader;

#[async_trait]
impl DocumentLoader for FileDocumentLoader {
    async fn load_text(&self, path: &Path) -> Result<String> {
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

        let text = if is_pdf {
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
                .await
                .map_err(|e| ReportError::Io(std::io::Error::other(e.to_string())))?
                .map_err(|e| {
                    ReportError::Io(std::io::Error::other(format!(
                        "cannot extract text from {}: {e}",
                        path.display()
                    )))
                })?
        } else {
            tokio::fs::read_to_string(path).await?
        };

        info!(path = %path.display(), chars = text.chars().count(), "Document text loaded");
        Ok(text)
    }
}

fn bigrams(text: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    match chars.as_slice() {
        [] => HashSet::new(),
        [only] => HashSet::from([(*only, *only)]),
        _ => chars.windows(2).map(|w| (w[0], w[1])).collect(),
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Recursive splitter: break on the most preferred separator present, merge
/// small pieces back up to `size`, and recurse into pieces still too long
pub fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chunks: Vec<String> = split_recursive(text, SEPARATORS, size, overlap)
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    debug!(chunks = chunks.len(), "Document split");
    chunks
}

fn split_recursive(text: &str, separators: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let (index, separator) = separators
        .iter()
        .enumerate()
        .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
        .map_or((separators.len(), ""), |(i, sep)| (i, *sep));
    let remaining = separators.get(index + 1..).unwrap_or_default();

    let pieces: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split_inclusive(separator).map(str::to_string).collect()
    };

    let mut output = Vec::new();
    let mut small = Vec::new();
    for piece in pieces {
        if char_len(&piece) <= size {
            small.push(piece);
            continue;
        }
        if !small.is_empty() {
            output.extend(merge(std::mem::take(&mut small), size, overlap));
        }
        if remaining.is_empty() {
            output.push(piece);
        } else {
            output.extend(split_recursive(&piece, remaining, size, overlap));
        }
    }
    if !small.is_empty() {
        output.extend(merge(small, size, overlap));
    }
    output
}

fn merge(pieces: Vec<String>, size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<String> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(&piece);
        if total + len > size && !window.is_empty() {
            chunks.push(window.iter().map(String::as_str).collect::<String>());
            while total > overlap || (total + len > size && total > 0) {
                match window.pop_front() {
                    Some(front) => total -= char_len(&front),
                    None => break,
                }
            }
        }
        total += len;
        window.push_back(piece);
    }
    if !window.is_empty() {
        chunks.push(window.iter().map(String::as_str).collect::<String>());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("营业收入：1,234.56\n净利润：100", CHUNK_SIZE, CHUNK_OVERLAP);
        assert_eq!(chunks, vec!["营业收入：1,234.56\n净利润：100"]);
    }

    #[test]
    fn test_chunks_bounded_and_overlapping() {
        let sentence = "本公司营业收入稳步增长，净利润保持稳定。";
        let text = sentence.repeat(80);
        let chunks = split_text(&text, CHUNK_SIZE, CHUNK_OVERLAP);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| char_len(c) <= CHUNK_SIZE));
        // consecutive chunks share a tail/head
        let tail: String = chunks[0].chars().rev().take(10).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(chunks[1].contains(&tail));
    }

    #[test]
    fn test_unbroken_text_splits_by_character() {
        let text = "资".repeat(1200);
        let chunks = split_text(&text, CHUNK_SIZE, CHUNK_OVERLAP);
        assert!(chunks.iter().all(|c| char_len(c) <= CHUNK_SIZE));
        assert!(chunks.len() >= 3);
    }

    #[test]
    fn test_paragraphs_preferred() {
        let para_a = "甲".repeat(300);
        let para_b = "乙".repeat(300);
        let chunks = split_text(&format!("{para_a}\n\n{para_b}"), CHUNK_SIZE, CHUNK_OVERLAP);
        assert_eq!(chunks, vec![para_a, para_b]);
    }

    #[test]
    fn test_search_ranks_by_overlap() {
        let text = format!(
            "{}\n\n{}\n\n{}",
            "资产负债表 货币资金 应收账款".repeat(20),
            "利润表 营业收入 营业成本 净利润".repeat(20),
            "现金流量表 经营活动".repeat(20)
        );
        let doc = LoadedDocument::new("r.txt", text);

        let hits = doc.search("营业收入", SEARCH_RESULTS);
        assert!(!hits.is_empty());
        assert!(hits[0].contains("营业收入"));
        assert!(doc.search("   ", SEARCH_RESULTS).is_empty());
        assert!(doc.search("zzzz", SEARCH_RESULTS).is_empty());
    }

    #[test]
    fn test_state_replaces_document() {
        let mut state = DocumentState::default();
        assert!(!state.is_loaded());

        state.load(LoadedDocument::new("a.txt", "first"));
        state.load(LoadedDocument::new("b.txt", "second"));
        assert_eq!(state.document().unwrap().text, "second");
    }

    #[tokio::test]
    async fn test_file_loader_reads_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "营业收入：1,234.56").unwrap();

        let text = FileDocumentLoader.load_text(&path).await.unwrap();
        assert_eq!(text, "营业收入：1,234.56");
        assert!(FileDocumentLoader.load_text(&dir.path().join("missing.txt")).await.is_err());
    }
}
