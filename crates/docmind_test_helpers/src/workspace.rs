//! Filesystem fixtures for indexing/search CLI tests.

use assert_fs::TempDir;
use std::fs;

/// A fresh temporary directory, cleaned up when dropped.
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("failed to create temp directory")
}

/// An empty `data_dir` for `docmind`'s stores to be created under; the CLI
/// itself is responsible for creating `documents.db`/`index/`/`embeddings.bin`
/// on first use, so this just reserves the directory.
pub fn data_dir() -> TempDir {
    let temp = temp_dir();
    fs::create_dir_all(temp.path().join("data")).expect("failed to create data dir");
    temp
}

/// Creates a source folder containing the given `(filename, content)` pairs,
/// suitable as the `<folder>` argument to `docmind index`/`docmind rebuild`.
pub fn source_folder_with_files(files: &[(&str, &str)]) -> TempDir {
    let temp = temp_dir();
    for (filename, content) in files {
        let path = temp.path().join(filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directory");
        }
        fs::write(&path, content).expect("failed to write fixture file");
    }
    temp
}
