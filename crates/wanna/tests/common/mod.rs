use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// 最小構成のプロジェクト
pub const MINIMAL_WANNA_YAML: &str = r#"
wanna_project:
  name: sample
  version: "0.1.0"
gcp_profiles:
  - profile_name: default
    project_id: sample-project
    region: europe-west1
    bucket: sample-bucket
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_wanna_yaml(&self, content: &str) {
        let path = self.root.path().join("wanna.yaml");
        fs::write(path, content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_file(&self, relative: &str, content: &str) {
        let path = self.root.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }
}
