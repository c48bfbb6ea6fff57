use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use tracing::{debug, warn};

use super::IndexBuildError;

/// A source document ready for chunking.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Stable identifier: the normalized file path, with `#page=N` appended
    /// for individual PDF pages.
    pub id: String,
    pub text: String,
}

fn is_supported_extension(ext: &str) -> bool {
    matches!(ext, "txt" | "md" | "pdf")
}

/// Expand corpus patterns into a sorted, deduplicated list of source files.
///
/// A pattern naming a directory matches every supported file under it,
/// recursively; anything else is passed to the glob matcher as written.
/// Sorting keeps rebuilds over an unchanged corpus deterministic.
pub fn resolve_corpus_files(patterns: &[String]) -> Result<Vec<PathBuf>, IndexBuildError> {
    let mut files = Vec::new();

    for pattern in patterns {
        let expanded = if Path::new(pattern).is_dir() {
            format!("{}/**/*", pattern.trim_end_matches('/'))
        } else {
            pattern.clone()
        };

        let entries = glob(&expanded).map_err(|e| IndexBuildError::DocumentLoad {
            id: pattern.clone(),
            reason: e.to_string(),
        })?;

        for entry in entries {
            let path = entry.map_err(|e| IndexBuildError::DocumentLoad {
                id: pattern.clone(),
                reason: e.to_string(),
            })?;
            if !path.is_file() {
                continue;
            }
            let ext = path
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            if is_supported_extension(ext) {
                files.push(path);
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Load every file into one or more documents.
///
/// Text and markdown files become a single document each; PDFs become one
/// document per page so retrieval can point a reader at the page. Files and
/// pages with nothing to extract are skipped with a warning; an unreadable
/// file aborts the build.
pub fn load_documents(files: &[PathBuf]) -> Result<Vec<Document>, IndexBuildError> {
    let mut documents = Vec::new();

    for path in files {
        // Store forward slashes regardless of OS so ids stay portable.
        let id = path.to_string_lossy().replace('\\', "/");
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        match ext {
            "pdf" => documents.extend(load_pdf_pages(path, &id)?),
            _ => {
                let text = fs::read_to_string(path).map_err(|e| IndexBuildError::DocumentLoad {
                    id: id.clone(),
                    reason: e.to_string(),
                })?;
                if text.trim().is_empty() {
                    warn!("Skipping empty document: {id}");
                    continue;
                }
                documents.push(Document { id, text });
            }
        }
    }

    Ok(documents)
}

/// Extract one document per PDF page, tagged `path#page=N`.
fn load_pdf_pages(path: &Path, id: &str) -> Result<Vec<Document>, IndexBuildError> {
    let pdf = lopdf::Document::load(path).map_err(|e| IndexBuildError::DocumentLoad {
        id: id.to_string(),
        reason: e.to_string(),
    })?;

    let mut documents = Vec::new();
    for (page_number, _) in pdf.get_pages() {
        let text = match pdf.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping page {page_number} of {id}: {e}");
                continue;
            }
        };
        if text.trim().is_empty() {
            debug!("Skipping blank page {page_number} of {id}");
            continue;
        }
        documents.push(Document {
            id: format!("{id}#page={page_number}"),
            text,
        });
    }

    Ok(documents)
}
