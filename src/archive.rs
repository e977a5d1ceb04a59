use chrono::{DateTime, TimeZone};
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to archive response to {path}: {source}")]
pub struct ArchiveError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Writes each completion to `<root>/<YYYY-MM-DD>/<YYYYmmdd-HHMMSS>-<model>-Response.txt`.
pub struct ResponseArchive {
    root: PathBuf,
}

impl ResponseArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for<Tz: TimeZone>(&self, model: &str, now: &DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: std::fmt::Display,
    {
        let day = now.format("%Y-%m-%d").to_string();
        let stamp = now.format("%Y%m%d-%H%M%S");
        // model ids may contain path separators on some providers
        let model = model.replace(['/', '\\'], "_");
        self.root
            .join(day)
            .join(format!("{stamp}-{model}-Response.txt"))
    }

    pub fn save<Tz: TimeZone>(
        &self,
        response_text: &str,
        model: &str,
        now: &DateTime<Tz>,
    ) -> Result<PathBuf, ArchiveError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let path = self.path_for(model, now);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| ArchiveError {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, response_text).map_err(|source| ArchiveError {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "response archived");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 20, 9, 5, 3).unwrap()
    }

    #[test]
    fn path_uses_date_and_timestamp() {
        let archive = ResponseArchive::new("/data/Responses");
        let path = archive.path_for("gpt-4o", &fixed_time());
        assert_eq!(
            path,
            PathBuf::from("/data/Responses/2024-07-20/20240720-090503-gpt-4o-Response.txt")
        );
    }

    #[test]
    fn save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ResponseArchive::new(dir.path().join("Responses"));
        let text = "--- Response 1 ---\nhello\n";
        let path = archive.save(text, "gpt-4", &fixed_time()).unwrap();

        assert!(path.starts_with(dir.path().join("Responses").join("2024-07-20")));
        assert_eq!(fs::read_to_string(path).unwrap(), text);
    }
}
