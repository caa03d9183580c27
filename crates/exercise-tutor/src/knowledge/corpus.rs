//! Reads the reference corpus from disk and splits it into retrievable chunks.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::utils::TextUtils;

/// Upper bound on characters per chunk; paragraphs longer than this are split.
pub const MAX_CHUNK_CHARS: usize = 1500;

#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the corpus root, `/`-separated.
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source: String,
    pub text: String,
}

/// Load every readable UTF-8 file under `root`, recursively, in path order.
///
/// Hidden entries are skipped. Files that are not valid UTF-8 are logged and
/// skipped. A missing root is an error.
pub fn load_documents(root: &Path) -> io::Result<Vec<Document>> {
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => {
                debug!("Skipping empty corpus file {}", path.display());
            }
            Ok(text) => {
                let source = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                documents.push(Document { source, text });
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!("Skipping non-text corpus file {}", path.display());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(documents)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

/// Split a document into paragraph-aligned chunks of at most `max_chars` characters.
pub fn chunk_document(document: &Document, max_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, chunks: &mut Vec<Chunk>| {
        if !current.is_empty() {
            chunks.push(Chunk {
                source: document.source.clone(),
                text: std::mem::take(current),
            });
        }
    };

    for paragraph in document.text.split("\n\n") {
        let paragraph = TextUtils::normalize_whitespace(paragraph);
        if paragraph.is_empty() {
            continue;
        }

        for piece in split_long(&paragraph, max_chars) {
            let separator = if current.is_empty() { 0 } else { 2 };
            if current.chars().count() + separator + piece.chars().count() > max_chars {
                flush(&mut current, &mut chunks);
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(piece);
        }
    }
    flush(&mut current, &mut chunks);
    chunks
}

/// Break `text` into pieces of at most `max_chars` characters, preferring spaces.
fn split_long(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while rest.chars().count() > max_chars {
        let hard_end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let cut = rest[..hard_end].rfind(' ').filter(|&i| i > 0).unwrap_or(hard_end);
        pieces.push(rest[..cut].trim_end());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            source: "notes.md".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_load_documents_recurses_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("strings")).unwrap();
        fs::write(dir.path().join("b.txt"), "float conversion").unwrap();
        fs::write(dir.path().join("strings/a.md"), "split on colon").unwrap();
        fs::write(dir.path().join(".hidden"), "ignored").unwrap();
        fs::write(dir.path().join("empty.txt"), "   \n").unwrap();
        fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let docs = load_documents(dir.path()).unwrap();
        let sources: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["b.txt", "strings/a.md"]);
    }

    #[test]
    fn test_load_documents_missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_documents(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_short_paragraphs_share_a_chunk() {
        let chunks = chunk_document(&doc("First para.\n\nSecond   para.\n\n\n\nThird."), 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "First para.\n\nSecond para.\n\nThird.");
        assert_eq!(chunks[0].source, "notes.md");
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let paragraph = "word ".repeat(100);
        let text = format!("{}\n\n{}", paragraph, paragraph);
        let chunks = chunk_document(&doc(&text), 120);

        assert!(chunks.len() > 2);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 120));
        let words: usize = chunks.iter().map(|c| c.text.split_whitespace().count()).sum();
        assert_eq!(words, 200);
    }

    #[test]
    fn test_split_long_without_spaces() {
        let pieces = split_long("abcdefghij", 4);
        assert_eq!(pieces, vec!["abcd", "efgh", "ij"]);
    }
}
