//! Workspace document service.
//!
//! Lists supported documents under the workspace root and reads them as
//! plain text. PDF pages are extracted with `lopdf`, DOCX paragraphs with
//! `docx-rs`.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use async_trait::async_trait;
use ignore::WalkBuilder;
use notebook_core::ports::FilesPort;
use notebook_types::{config::WorkspaceConfig, file::FileEntry, NotebookError, Result};

/// Shared, switchable workspace root.
#[derive(Debug, Clone)]
pub struct WorkspaceRoot(Rc<RefCell<PathBuf>>);

impl WorkspaceRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Rc::new(RefCell::new(path.into())))
    }

    pub fn path(&self) -> PathBuf {
        self.0.borrow().clone()
    }

    pub fn set(&self, path: impl Into<PathBuf>) {
        *self.0.borrow_mut() = path.into();
    }

    /// Where saved transcripts for this workspace live.
    pub fn history_dir(&self, dir_name: &str) -> PathBuf {
        self.0.borrow().join(dir_name)
    }
}

pub struct WorkspaceFiles {
    root: WorkspaceRoot,
    config: WorkspaceConfig,
}

impl WorkspaceFiles {
    pub fn new(root: WorkspaceRoot, config: WorkspaceConfig) -> Self {
        Self { root, config }
    }
}

/// Walk `root` for supported documents, sorted by case-insensitive name.
pub fn scan(root: &Path, config: &WorkspaceConfig) -> Vec<FileEntry> {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(true)
        .max_depth(Some(config.max_depth))
        .build();

    let mut entries: Vec<FileEntry> = walker
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| FileEntry::file(entry.path().display().to_string()))
        .filter(|file| config.extensions.iter().any(|ext| *ext == file.extension))
        .collect();

    entries.sort_by_key(|e| e.name.to_lowercase());
    entries
}

/// Read a document as text.
pub async fn read_text(path: &str) -> Result<String> {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match extension.as_str() {
        "md" | "txt" | "html" => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| NotebookError::Read(format!("Failed to read file: {}", e))),
        "pdf" => extract_pdf(&read_bytes(path, "PDF").await?),
        "docx" => extract_docx(&read_bytes(path, "DOCX").await?),
        other => Err(NotebookError::Read(format!(
            "Unsupported file type: {}",
            other
        ))),
    }
}

async fn read_bytes(path: &str, kind: &str) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| NotebookError::Read(format!("Failed to read {}: {}", kind, e)))
}

/// Text of every page in page order. Pages without extractable text are
/// skipped; a document with none at all is an error.
pub fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| NotebookError::Read(format!("Failed to parse PDF: {}", e)))?;

    let mut text = String::new();
    for page in doc.get_pages().into_keys() {
        match doc.extract_text(&[page]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => log::debug!("No text on PDF page {}: {}", page, e),
        }
    }
    if text.is_empty() {
        return Err(NotebookError::Read(
            "Failed to extract any text from PDF".to_string(),
        ));
    }
    Ok(text)
}

/// One line per body paragraph, run text concatenated.
pub fn extract_docx(bytes: &[u8]) -> Result<String> {
    let docx = docx_rs::read_docx(bytes)
        .map_err(|e| NotebookError::Read(format!("Failed to parse DOCX: {}", e)))?;

    let mut text = String::new();
    for child in &docx.document.children {
        let docx_rs::DocumentChild::Paragraph(paragraph) = child else {
            continue;
        };
        for child in &paragraph.children {
            let docx_rs::ParagraphChild::Run(run) = child else {
                continue;
            };
            for child in &run.children {
                if let docx_rs::RunChild::Text(t) = child {
                    text.push_str(&t.text);
                }
            }
        }
        text.push('\n');
    }
    Ok(text)
}

#[async_trait(?Send)]
impl FilesPort for WorkspaceFiles {
    async fn list_files(&self) -> Result<Vec<FileEntry>> {
        let root = self.root.path();
        if !root.is_dir() {
            return Err(NotebookError::Read(format!(
                "Workspace not found: {}",
                root.display()
            )));
        }
        let entries = scan(&root, &self.config);
        log::debug!("{} document(s) under {}", entries.len(), root.display());
        Ok(entries)
    }

    async fn read_file_content(&self, path: &str) -> Result<String> {
        read_text(path).await
    }
}
