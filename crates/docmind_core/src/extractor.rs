//! Text-extraction capability.
//!
//! PDF/Word/Excel parsing is a host-side concern this crate never implements;
//! `DefaultExtractor` only covers the formats that need no external parser
//! (plain text, Markdown) and reports every other supported extension as
//! `Unsupported` so `IndexingPipeline` can record and skip it per file.

use crate::types::{Extracted, FileType};
use std::path::Path;

pub use crate::types::ExtractError;

/// Maps a file path to its extracted title/body/metadata.
pub trait Extractor: Send + Sync {
    fn process_file(&self, path: &Path) -> Result<Extracted, ExtractError>;
}

/// Plain-text and Markdown extraction; everything else reports `Unsupported`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExtractor;

impl Extractor for DefaultExtractor {
    fn process_file(&self, path: &Path) -> Result<Extracted, ExtractError> {
        let file_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(FileType::from_extension)
            .unwrap_or(FileType::Unknown);

        match file_type {
            FileType::Text | FileType::Markdown => extract_text_like(path, file_type),
            _ => Err(ExtractError::Unsupported),
        }
    }
}

fn extract_text_like(path: &Path, file_type: FileType) -> Result<Extracted, ExtractError> {
    let metadata = std::fs::metadata(path).map_err(|_| ExtractError::Unreadable)?;
    let bytes = std::fs::read(path).map_err(|_| ExtractError::Unreadable)?;
    let content = String::from_utf8(bytes).map_err(|_| ExtractError::Corrupted)?;

    if content.trim().is_empty() {
        return Err(ExtractError::Empty);
    }

    let title = derive_title(path, &content);
    let created_at = system_time_to_unix(metadata.created().ok());
    let modified_at = system_time_to_unix(metadata.modified().ok());

    Ok(Extracted {
        file_path: path.to_path_buf(),
        file_type,
        title,
        content,
        size: metadata.len(),
        created_at,
        modified_at,
    })
}

/// First Markdown `# heading` or first non-blank line, else the file stem.
fn derive_title(path: &Path, content: &str) -> String {
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return trimmed.trim_start_matches('#').trim().to_string();
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "untitled".to_string())
}

fn system_time_to_unix(time: Option<std::time::SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_from_markdown_heading() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("notes.md");
        std::fs::write(&path, "# My Title\n\nbody text here").unwrap();

        let extracted = DefaultExtractor.process_file(&path).unwrap();
        assert_eq!(extracted.title, "My Title");
        assert_eq!(extracted.file_type, FileType::Markdown);
        assert!(extracted.content.contains("body text here"));
    }

    #[test]
    fn plain_text_uses_first_nonblank_line_as_title() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("report.txt");
        std::fs::write(&path, "\n\nQuarterly Report\nmore text").unwrap();

        let extracted = DefaultExtractor.process_file(&path).unwrap();
        assert_eq!(extracted.title, "Quarterly Report");
    }

    #[test]
    fn empty_file_reports_empty_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("blank.txt");
        std::fs::write(&path, "   \n  \n").unwrap();

        let err = DefaultExtractor.process_file(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Empty));
    }

    #[test]
    fn non_utf8_file_reports_corrupted() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("binary.txt");
        std::fs::write(&path, [0xFF, 0xFE, 0x00, 0xD8]).unwrap();

        let err = DefaultExtractor.process_file(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Corrupted));
    }

    #[test]
    fn pdf_extension_reports_unsupported() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let err = DefaultExtractor.process_file(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported));
    }

    #[test]
    fn missing_file_reports_unreadable() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("missing.txt");

        let err = DefaultExtractor.process_file(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable));
    }
}
