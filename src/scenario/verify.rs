//! Publish output verification

use std::path::{Path, PathBuf};

/// Expected artifacts that are not present as files in the publish output
///
/// Returned paths are relative to `working_dir` so reports stay readable.
pub fn missing_artifacts(
    working_dir: &Path,
    publish_output: &Path,
    expected: &[PathBuf],
) -> Vec<PathBuf> {
    let output_dir = working_dir.join(publish_output);
    expected
        .iter()
        .filter(|artifact| {
            let path = output_dir.join(artifact);
            let present = path.is_file();
            tracing::debug!(path = %path.display(), present, "Checked publish artifact");
            !present
        })
        .map(|artifact| publish_output.join(artifact))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn publish_dir() -> PathBuf {
        Path::new("bin").join("Release").join("PublishOutput")
    }

    #[test]
    fn test_present_artifact_is_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join(publish_dir());
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("web.config"), "<configuration />").unwrap();

        let missing = missing_artifacts(dir.path(), &publish_dir(), &[PathBuf::from("web.config")]);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_missing_artifact_reported_relative_to_project() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(publish_dir())).unwrap();

        let missing = missing_artifacts(
            dir.path(),
            &publish_dir(),
            &[PathBuf::from("web.config"), PathBuf::from("app.dll")],
        );
        assert_eq!(
            missing,
            vec![publish_dir().join("web.config"), publish_dir().join("app.dll")]
        );
    }

    #[test]
    fn test_directory_with_artifact_name_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(publish_dir()).join("web.config")).unwrap();

        let missing = missing_artifacts(dir.path(), &publish_dir(), &[PathBuf::from("web.config")]);
        assert_eq!(missing.len(), 1);
    }

    #[test]
    fn test_absent_output_folder_reports_everything() {
        let dir = tempfile::tempdir().unwrap();
        let missing = missing_artifacts(dir.path(), &publish_dir(), &[PathBuf::from("web.config")]);
        assert_eq!(missing, vec![publish_dir().join("web.config")]);
    }
}
