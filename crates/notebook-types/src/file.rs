use serde::{Deserialize, Serialize};

/// An entry in the workspace file listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub extension: String,
}

impl FileEntry {
    pub fn file(path: impl Into<String>) -> Self {
        let path = path.into();
        let p = std::path::Path::new(&path);
        let name = p
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.clone());
        let extension = p
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        Self {
            name,
            path,
            is_dir: false,
            extension,
        }
    }
}
