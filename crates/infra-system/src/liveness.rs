// Touch-file liveness marker
//
// An external monitor compares the file's mtime against a threshold to spot
// wedged workers.

use lightq_core::error::Result;
use lightq_core::port::LivenessMarker;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub struct TouchFile {
    path: PathBuf,
}

impl TouchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LivenessMarker for TouchFile {
    fn touch(&self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.set_modified(SystemTime::now())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};
    use std::time::Duration;

    #[test]
    fn test_touch_creates_then_updates_mtime() {
        let path = std::env::temp_dir().join(format!("lightq-{}.touch", uuid::Uuid::new_v4()));
        let marker = TouchFile::new(&path);

        assert_ok!(marker.touch());
        let first = std::fs::metadata(&path).unwrap().modified().unwrap();

        // Backdate, then touch again
        let old = SystemTime::now() - Duration::from_secs(3600);
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();
        marker.touch().unwrap();
        let second = std::fs::metadata(&path).unwrap().modified().unwrap();

        assert!(second > old);
        assert!(second + Duration::from_secs(60) >= first);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_touch_in_missing_directory_fails() {
        let marker = TouchFile::new("/nonexistent-lightq-dir/worker.touch");
        assert_err!(marker.touch());
    }
}
