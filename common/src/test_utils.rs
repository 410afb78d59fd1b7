//! Locations for files written by tests, under `<workspace>/test_output`.

use std::path::PathBuf;

fn output_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .map(|p| p.join("test_output"))
        .unwrap_or_else(|| manifest_dir.join("test_output"))
}

/// Path of a test output file. The output root is created on demand; the
/// file itself is not.
pub fn test_output_path(name: &str) -> PathBuf {
    let root = output_root();
    if let Err(e) = std::fs::create_dir_all(&root) {
        panic!("failed to create {}: {}", root.display(), e);
    }
    root.join(name)
}

/// Fresh, empty directory for a test that writes several files.
pub fn test_output_dir(name: &str) -> PathBuf {
    let dir = test_output_path(name);
    if dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            panic!("failed to clear {}: {}", dir.display(), e);
        }
    }
    if let Err(e) = std::fs::create_dir_all(&dir) {
        panic!("failed to create {}: {}", dir.display(), e);
    }
    dir
}
