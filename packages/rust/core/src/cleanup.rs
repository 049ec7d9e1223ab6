use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, warn};

/// Delete this run's temporary export files. Missing files are ignored and
/// other failures only warn. Returns the number of files removed.
pub fn remove_exports(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed export");
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove export"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_present_and_ignores_missing() {
        let dir = std::env::temp_dir().join(format!("gregory-cleanup-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let present = dir.join("articles_tag.csv");
        std::fs::write(&present, "a").unwrap();
        let missing = dir.join("trials_tag.csv");

        assert_eq!(remove_exports(&[present.clone(), missing]), 1);
        assert!(!present.exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
