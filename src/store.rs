use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use walkdir::WalkDir;

use crate::model::{CandidateRecord, META_CHAR_COUNT, META_FILE_NAME, META_SOURCE_PATH};

pub const DEFAULT_EXTENSIONS: &[&str] = &["txt", "md"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub records: Vec<CandidateRecord>,
    pub skipped: Vec<SkippedFile>,
}

/// Loads resumes from a directory tree. Each matching file becomes one record;
/// files that cannot be read are skipped and reported, never fatal.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn wants(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    pub fn load(&self) -> IngestReport {
        let mut report = IngestReport::default();

        if !self.root.is_dir() {
            tracing::warn!("Resume directory not found: {}", self.root.display());
            return report;
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    tracing::warn!("Skipping {}: {err}", path.display());
                    report.skipped.push(SkippedFile {
                        path,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.wants(entry.path()) {
                continue;
            }

            match self.read_record(entry.path()) {
                Ok(record) => {
                    tracing::debug!(
                        "Ingested {} ({} chars)",
                        record.id,
                        record.text.chars().count()
                    );
                    report.records.push(record);
                }
                Err(reason) => {
                    tracing::warn!("Skipping {}: {reason}", entry.path().display());
                    report.skipped.push(SkippedFile {
                        path: entry.path().to_path_buf(),
                        reason,
                    });
                }
            }
        }

        tracing::info!(
            "Ingested {} document(s) from {} ({} skipped)",
            report.records.len(),
            self.root.display(),
            report.skipped.len()
        );
        report
    }

    fn read_record(&self, path: &Path) -> std::result::Result<CandidateRecord, String> {
        let bytes = fs::read(path).map_err(|e| format!("read failed: {e}"))?;
        let raw = String::from_utf8(bytes).map_err(|_| "not valid UTF-8 text".to_string())?;
        let text = normalize_text(&raw);
        if text.is_empty() {
            return Err("no text content".to_string());
        }

        let id = relative_id(&self.root, path);
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.clone());

        let mut metadata = BTreeMap::new();
        metadata.insert(META_FILE_NAME.to_string(), file_name);
        metadata.insert(META_SOURCE_PATH.to_string(), path.display().to_string());
        metadata.insert(META_CHAR_COUNT.to_string(), text.chars().count().to_string());

        Ok(CandidateRecord {
            id,
            text,
            metadata,
            ingested_at: Utc::now(),
        })
    }
}

/// Unix line endings, no trailing whitespace per line, trimmed overall.
pub fn normalize_text(raw: &str) -> String {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    raw.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn relative_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(root: &Path) -> DocumentStore {
        let exts: Vec<String> = DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect();
        DocumentStore::new(root, &exts)
    }

    #[test]
    fn loads_matching_files_recursively_in_sorted_order() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("nested")).expect("mkdir");
        fs::write(dir.path().join("b.txt"), "Bob\r\nPython  \r\n").expect("write");
        fs::write(dir.path().join("a.md"), "Alice").expect("write");
        fs::write(dir.path().join("nested/c.TXT"), "Carol").expect("write");
        fs::write(dir.path().join("ignored.pdf"), "%PDF").expect("write");

        let report = store(dir.path()).load();
        let ids: Vec<&str> = report.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a.md", "b.txt", "nested/c.TXT"]);
        assert_eq!(report.records[1].text, "Bob\nPython");
        assert_eq!(report.records[2].file_name(), "c.TXT");
        assert_eq!(report.records[1].metadata[META_CHAR_COUNT], "10");
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn unreadable_files_are_skipped_not_fatal() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("good.txt"), "Dana, CPA").expect("write");
        fs::write(dir.path().join("binary.txt"), [0xff, 0xfe, 0x00, 0x9f]).expect("write");
        fs::write(dir.path().join("blank.txt"), "   \n\n").expect("write");

        let report = store(dir.path()).load();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].id, "good.txt");
        assert_eq!(report.skipped.len(), 2);
        assert!(report
            .skipped
            .iter()
            .any(|s| s.reason.contains("UTF-8")));
    }

    #[test]
    fn missing_directory_yields_empty_report() {
        let dir = tempdir().expect("tempdir");
        let report = store(&dir.path().join("nope")).load();
        assert!(report.records.is_empty());
    }

    #[test]
    fn extensions_accept_leading_dots() {
        let s = DocumentStore::new("/x", &[".TXT".to_string()]);
        assert!(s.wants(Path::new("/x/a.txt")));
        assert!(!s.wants(Path::new("/x/a.md")));
    }
}
