use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notebook_core::ports::HistoryPort;
use notebook_types::{session::HistoryRecord, NotebookError, Result};

use super::{history_file_name, newest_first, stamped, FILE_SUFFIX};

/// Pretty-printed records in a directory, one file per session.
pub struct DirHistory {
    dir: PathBuf,
}

impl DirHistory {
    /// Open (creating if needed) a history directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        Ok(self.dir.join(history_file_name(session_id)?))
    }

    async fn read_record(path: &Path) -> Option<HistoryRecord> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Skipping history entry {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Skipping corrupt history entry {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[async_trait(?Send)]
impl HistoryPort for DirHistory {
    async fn save_history(&self, record: &HistoryRecord) -> Result<()> {
        let path = self.path_for(&record.session_id)?;
        let data = serde_json::to_vec_pretty(&stamped(record))?;
        let write = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&path, data).await
        };
        write
            .await
            .map_err(|e| NotebookError::Persistence(format!("{}: {}", path.display(), e)))
    }

    async fn load_history(&self) -> Result<Vec<HistoryRecord>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(NotebookError::Persistence(e.to_string())),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') || !name.ends_with(FILE_SUFFIX) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(record) = Self::read_record(&entry.path()).await {
                records.push(record);
            }
        }
        newest_first(&mut records);
        Ok(records)
    }
}
