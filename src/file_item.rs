use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const START_TEMPLATE: &str = "start_message.txt";
pub const END_TEMPLATE: &str = "end_message.txt";

/// A file whose contents were read into the prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    /// File name without directories, used in the block header.
    pub name: String,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Reads every path as UTF-8, in parallel, keeping the given order.
/// Fails on the first unreadable file.
pub fn load_files(paths: &[PathBuf]) -> Result<Vec<SourceFile>, LoadError> {
    paths
        .par_iter()
        .map(|path| -> Result<SourceFile, LoadError> {
            Ok(SourceFile {
                name: display_name(path),
                content: read(path)?,
            })
        })
        .collect()
}

/// Standard start and end messages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Templates {
    pub start: String,
    pub end: String,
}

pub fn load_templates(dir: &Path) -> Result<Templates, LoadError> {
    Ok(Templates {
        start: read(&dir.join(START_TEMPLATE))?,
        end: read(&dir.join(END_TEMPLATE))?,
    })
}

pub fn save_prompt(path: &Path, prompt: &str) -> Result<(), LoadError> {
    fs::write(path, prompt).map_err(|source| LoadError::Write {
        path: path.to_path_buf(),
        source,
    })
}
