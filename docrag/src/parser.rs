//! Document parsing and directory ingestion.
//!
//! Parsing backends sit behind the [`DocumentParser`] trait: raw file
//! bytes in, ordered modality-tagged [`Chunk`]s out. The built-in
//! [`MarkdownParser`] handles markdown and plain text, normalizing
//! tables and image references to text chunks tagged with their
//! [`Modality`]. External converters (PDF parsing services and the
//! like) plug in behind the same trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::document::{Chunk, Document, Modality};
use crate::error::{RagError, Result};

/// A parsing backend: file bytes in, ordered chunks out.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse one file into an ordered sequence of chunks.
    ///
    /// `source` is the file name or path, recorded in chunk metadata.
    /// Returns [`RagError::Parse`] if the bytes cannot be decoded or
    /// yield no content.
    async fn parse(&self, source: &str, bytes: &[u8]) -> Result<Vec<Chunk>>;

    /// Whether this parser handles files with the given extension
    /// (lowercase, without the leading dot).
    fn supports(&self, extension: &str) -> bool;
}

/// A failure confined to a single source file during ingestion.
#[derive(Debug)]
pub struct IngestFailure {
    /// The file that failed.
    pub source: String,
    /// Why it failed.
    pub error: RagError,
}

/// The outcome of ingesting a directory: whatever parsed successfully,
/// plus per-document failures. A failure never aborts the batch; the
/// caller decides whether to proceed with the partial result.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Number of documents parsed successfully.
    pub documents: usize,
    /// All chunks from all successfully parsed documents, in document
    /// order then ordinal order.
    pub chunks: Vec<Chunk>,
    /// Per-file failures.
    pub failures: Vec<IngestFailure>,
}

/// Recursively ingest every supported file under `dir`.
///
/// Files are visited in sorted path order so chunk ordering is
/// deterministic. Dotfiles are skipped; files the parser does not
/// support are reported as per-document failures, as are unreadable or
/// unparseable files.
///
/// # Errors
///
/// Returns [`RagError::Parse`] only if `dir` itself does not exist or
/// cannot be read. Individual file failures land in the report.
pub async fn ingest_dir(parser: &dyn DocumentParser, dir: &Path) -> Result<IngestReport> {
    let files = collect_files(dir).await?;
    let mut report = IngestReport::default();

    for path in files {
        let source = path.display().to_string();
        let extension =
            path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());

        match extension {
            Some(ext) if parser.supports(&ext) => {}
            _ => {
                report.failures.push(IngestFailure {
                    source: source.clone(),
                    error: RagError::Parse {
                        document: source,
                        message: "unsupported file type".to_string(),
                    },
                });
                continue;
            }
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %source, error = %e, "failed to read file");
                report.failures.push(IngestFailure {
                    source: source.clone(),
                    error: RagError::Parse { document: source, message: format!("read failed: {e}") },
                });
                continue;
            }
        };

        match parser.parse(&source, &bytes).await {
            Ok(chunks) => {
                debug!(file = %source, chunk_count = chunks.len(), "parsed document");
                report.documents += 1;
                report.chunks.extend(chunks);
            }
            Err(error) => {
                warn!(file = %source, error = %error, "failed to parse document");
                report.failures.push(IngestFailure { source, error });
            }
        }
    }

    info!(
        documents = report.documents,
        chunks = report.chunks.len(),
        failures = report.failures.len(),
        "ingestion complete"
    );
    Ok(report)
}

/// Collect regular files under `dir` recursively, sorted by path.
async fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        return Err(RagError::Parse {
            document: dir.display().to_string(),
            message: "directory not found".to_string(),
        });
    }

    let mut pending = vec![dir.to_path_buf()];
    let mut files = Vec::new();

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await.map_err(|e| RagError::Parse {
            document: current.display().to_string(),
            message: format!("failed to read directory: {e}"),
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| RagError::Parse {
            document: current.display().to_string(),
            message: format!("failed to read directory entry: {e}"),
        })? {
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden {
                continue;
            }
            let file_type = entry.file_type().await.map_err(|e| RagError::Parse {
                document: path.display().to_string(),
                message: format!("failed to stat: {e}"),
            })?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Parses markdown and plain text into modality-tagged chunks.
///
/// Prose is grouped per header section and split to `chunk_size`
/// characters with `chunk_overlap` overlap; pipe tables become
/// [`Modality::Table`] chunks; image references contribute their alt
/// text as [`Modality::Image`] chunks. Each chunk records its source
/// file and, when present, the header path it appeared under.
#[derive(Debug, Clone)]
pub struct MarkdownParser {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl MarkdownParser {
    /// Create a parser with the given chunk size and overlap, both in
    /// characters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

/// One normalized region of a document, in source order.
struct Block {
    header_path: String,
    text: String,
    modality: Modality,
}

/// Extract alt text from a standalone image line (`![alt](target)`).
fn image_alt(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("![")?;
    let close = rest.find("](")?;
    if !rest.ends_with(')') {
        return None;
    }
    let alt = rest[..close].trim();
    (!alt.is_empty()).then_some(alt)
}

/// Whether a table row carries no content (a `|---|:---:|` separator).
fn is_table_separator(line: &str) -> bool {
    line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Walk markdown line by line, producing prose sections, tables, and
/// image blocks with their header context.
fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut headers: Vec<String> = Vec::new();
    let mut header_path = String::new();
    let mut prose = String::new();
    let mut table = String::new();

    fn flush(blocks: &mut Vec<Block>, buf: &mut String, header_path: &str, modality: Modality) {
        let text = buf.trim().to_string();
        buf.clear();
        if !text.is_empty() {
            blocks.push(Block { header_path: header_path.to_string(), text, modality });
        }
    }

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('#') {
            flush(&mut blocks, &mut prose, &header_path, Modality::Text);
            flush(&mut blocks, &mut table, &header_path, Modality::Table);

            let level = trimmed.chars().take_while(|c| *c == '#').count();
            let title = trimmed[level..].trim().to_string();
            headers.truncate(level.saturating_sub(1));
            headers.push(title);
            header_path = headers.join(" > ");
        } else if trimmed.starts_with('|') {
            flush(&mut blocks, &mut prose, &header_path, Modality::Text);
            if !is_table_separator(trimmed) {
                if !table.is_empty() {
                    table.push('\n');
                }
                table.push_str(trimmed);
            }
        } else if let Some(alt) = image_alt(trimmed) {
            flush(&mut blocks, &mut prose, &header_path, Modality::Text);
            flush(&mut blocks, &mut table, &header_path, Modality::Table);
            blocks.push(Block {
                header_path: header_path.clone(),
                text: alt.to_string(),
                modality: Modality::Image,
            });
        } else if trimmed.is_empty() {
            flush(&mut blocks, &mut table, &header_path, Modality::Table);
            if !prose.is_empty() && !prose.ends_with("\n\n") {
                prose.push_str("\n\n");
            }
        } else {
            flush(&mut blocks, &mut table, &header_path, Modality::Table);
            if !prose.is_empty() && !prose.ends_with('\n') {
                prose.push(' ');
            }
            prose.push_str(trimmed);
        }
    }

    flush(&mut blocks, &mut prose, &header_path, Modality::Text);
    flush(&mut blocks, &mut table, &header_path, Modality::Table);

    blocks
}

/// Split text at sentence boundaries, keeping the boundary attached to
/// the preceding segment.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, b) in bytes.iter().enumerate() {
        let boundary = matches!(b, b'.' | b'!' | b'?')
            && bytes.get(i + 1).map_or(true, |next| next.is_ascii_whitespace());
        if boundary {
            let end = i + 1;
            if end > start {
                segments.push(text[start..end].trim_start());
            }
            start = end;
        }
    }
    if start < text.len() {
        let tail = text[start..].trim();
        if !tail.is_empty() {
            segments.push(tail);
        }
    }
    segments
}

/// Character-window splitting with overlap, for segments that exceed
/// the chunk size even after sentence splitting.
fn split_by_size(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut out = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        out.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    out
}

/// Split a prose section into pieces of at most `chunk_size` characters:
/// greedy sentence merging first, character windows as a last resort.
fn split_prose(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.chars().count() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        let sentence_len = sentence.chars().count();
        if sentence_len > chunk_size {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            pieces.extend(split_by_size(sentence, chunk_size, chunk_overlap));
        } else if current.is_empty() {
            current = sentence.to_string();
        } else if current.chars().count() + 1 + sentence_len <= chunk_size {
            current.push(' ');
            current.push_str(sentence);
        } else {
            pieces.push(std::mem::take(&mut current));
            current = sentence.to_string();
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[async_trait]
impl DocumentParser for MarkdownParser {
    async fn parse(&self, source: &str, bytes: &[u8]) -> Result<Vec<Chunk>> {
        let text = std::str::from_utf8(bytes).map_err(|e| RagError::Parse {
            document: source.to_string(),
            message: format!("not valid UTF-8: {e}"),
        })?;

        if text.trim().is_empty() {
            return Err(RagError::Parse {
                document: source.to_string(),
                message: "no text content".to_string(),
            });
        }

        let mut document = Document::new(source, text);
        document.metadata.insert("source".to_string(), source.to_string());

        let mut chunks = Vec::new();
        let mut ordinal = 0;

        for block in parse_blocks(&document.text) {
            let pieces = match block.modality {
                Modality::Text => split_prose(&block.text, self.chunk_size, self.chunk_overlap),
                // Tables and figures stay whole unless they exceed the size cap
                Modality::Table | Modality::Image => {
                    if block.text.chars().count() > self.chunk_size {
                        split_by_size(&block.text, self.chunk_size, self.chunk_overlap)
                    } else {
                        vec![block.text.clone()]
                    }
                }
            };

            for piece in pieces {
                let text = if block.header_path.is_empty() {
                    piece
                } else {
                    format!("{}\n{piece}", block.header_path)
                };
                let mut chunk = Chunk::new(&document, ordinal, text, block.modality);
                if !block.header_path.is_empty() {
                    chunk.metadata.insert("header_path".to_string(), block.header_path.clone());
                }
                chunks.push(chunk);
                ordinal += 1;
            }
        }

        if chunks.is_empty() {
            return Err(RagError::Parse {
                document: source.to_string(),
                message: "no indexable content".to_string(),
            });
        }

        Ok(chunks)
    }

    fn supports(&self, extension: &str) -> bool {
        matches!(extension, "md" | "markdown" | "txt" | "text")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> MarkdownParser {
        MarkdownParser::new(200, 20)
    }

    #[tokio::test]
    async fn prose_parses_to_text_chunks_in_order() {
        let chunks = parser()
            .parse("a.md", b"First paragraph.\n\nSecond paragraph.")
            .await
            .unwrap();
        assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
            assert_eq!(chunk.modality, Modality::Text);
            assert!(!chunk.text.is_empty());
        }
    }

    #[tokio::test]
    async fn tables_are_tagged_and_separators_dropped() {
        let md = "Intro text.\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\nOutro.";
        let chunks = parser().parse("t.md", md.as_bytes()).await.unwrap();
        let table: Vec<_> =
            chunks.iter().filter(|c| c.modality == Modality::Table).collect();
        assert_eq!(table.len(), 1);
        assert!(table[0].text.contains("| 1 | 2 |"));
        assert!(!table[0].text.contains("---"));
    }

    #[tokio::test]
    async fn image_alt_text_becomes_an_image_chunk() {
        let md = "See the chart:\n\n![Q1 revenue trend](chart.png)\n";
        let chunks = parser().parse("i.md", md.as_bytes()).await.unwrap();
        let image: Vec<_> =
            chunks.iter().filter(|c| c.modality == Modality::Image).collect();
        assert_eq!(image.len(), 1);
        assert!(image[0].text.contains("Q1 revenue trend"));
    }

    #[tokio::test]
    async fn headers_are_recorded_as_metadata() {
        let md = "# Report\n\n## Finance\n\nNet income was $2M.";
        let chunks = parser().parse("h.md", md.as_bytes()).await.unwrap();
        let chunk = chunks.iter().find(|c| c.text.contains("Net income")).unwrap();
        assert_eq!(chunk.metadata.get("header_path").unwrap(), "Report > Finance");
    }

    #[tokio::test]
    async fn long_prose_is_split_within_the_size_cap() {
        let long = "A sentence here. ".repeat(100);
        let chunks = MarkdownParser::new(120, 20).parse("l.txt", long.as_bytes()).await.unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 120);
        }
    }

    #[tokio::test]
    async fn empty_input_is_a_parse_error() {
        let err = parser().parse("e.md", b"   \n").await.unwrap_err();
        assert!(matches!(err, RagError::Parse { .. }));
    }

    #[tokio::test]
    async fn ingest_reports_failures_per_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.md"), "Revenue grew 10% in Q1.").unwrap();
        std::fs::write(dir.path().join("bad.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(dir.path().join("empty.md"), "").unwrap();

        let report = ingest_dir(&parser(), dir.path()).await.unwrap();
        assert_eq!(report.documents, 1);
        assert!(!report.chunks.is_empty());
        assert_eq!(report.failures.len(), 2);
        for failure in &report.failures {
            assert!(matches!(failure.error, RagError::Parse { .. }));
        }
    }

    #[tokio::test]
    async fn ingesting_a_missing_directory_fails() {
        let err = ingest_dir(&parser(), Path::new("/nonexistent/docrag-data"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Parse { .. }));
    }
}
