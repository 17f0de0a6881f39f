//! マニフェスト
//!
//! build / push / deploy / run の各フェーズ間で受け渡される唯一の状態。
//! バージョンごとのパスに JSON として書き出され、push 以降は読み取り専用です。

use crate::blob::BlobStore;
use crate::error::{CoreError, Result};
use crate::model::{NotificationChannelConfig, ScheduleConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// マニフェストのファイル名
pub const MANIFEST_FILE_NAME: &str = "wanna-manifest.json";
/// コンパイル済みパイプライン定義のファイル名
pub const PIPELINE_SPEC_FILE_NAME: &str = "pipeline_spec.json";
/// 実行時パラメータのファイル名
pub const RUNTIME_PARAMETERS_FILE_NAME: &str = "runtime-parameters.json";

/// 必須のトップレベルキー
const REQUIRED_STRING_KEYS: [&str; 4] = ["name", "project", "location", "version"];

/// マニフェストの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    #[default]
    Job,
    Pipeline,
}

impl ManifestKind {
    /// パス上の複数形ディレクトリ名
    pub fn plural(&self) -> &'static str {
        match self {
            ManifestKind::Job => "jobs",
            ManifestKind::Pipeline => "pipelines",
        }
    }
}

impl std::fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestKind::Job => write!(f, "job"),
            ManifestKind::Pipeline => write!(f, "pipeline"),
        }
    }
}

/// パイプラインのデプロイ設定（スケジュール・通知）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDeployment {
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    #[serde(default)]
    pub notification_channels: Vec<NotificationChannelConfig>,
    #[serde(default)]
    pub sla_hours: Option<f64>,
}

/// フェーズ間で受け渡されるリソース記述
///
/// `image_refs` は論理名のまま保存し、解決済みのイメージは含めない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub project: String,
    pub location: String,
    pub version: String,
    #[serde(default)]
    pub kind: ManifestKind,
    /// リモートAPIにそのまま渡すリクエスト本文
    pub payload: Map<String, Value>,
    pub image_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<PipelineDeployment>,
    /// 初回ビルド時刻
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Manifest {
    /// 必須項目のみで作成
    pub fn new(
        kind: ManifestKind,
        name: impl Into<String>,
        project: impl Into<String>,
        location: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            location: location.into(),
            version: version.into(),
            kind,
            payload: Map::new(),
            image_refs: Vec::new(),
            service_account: None,
            network: None,
            encryption_key: None,
            labels: BTreeMap::new(),
            deployment: None,
            created_at: None,
        }
    }

    /// 正規化された JSON 表現
    pub fn to_canonical_json(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// リモートのリリースディレクトリ
///
/// `gs://<bucket>/wanna-<kind>s/<name>/deployment/release/<version>`
pub fn release_dir_uri(bucket_uri: &str, kind: ManifestKind, name: &str, version: &str) -> String {
    format!(
        "{}/wanna-{}/{}/deployment/release/{}",
        bucket_uri.trim_end_matches('/'),
        kind.plural(),
        name,
        version
    )
}

/// リモートのマニフェスト URI
pub fn release_manifest_uri(bucket_uri: &str, kind: ManifestKind, name: &str, version: &str) -> String {
    format!(
        "{}/{}",
        release_dir_uri(bucket_uri, kind, name, version),
        MANIFEST_FILE_NAME
    )
}

/// ローカルのマニフェスト保存先
#[derive(Debug, Clone)]
pub struct ManifestStore {
    build_dir: PathBuf,
}

impl ManifestStore {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
        }
    }

    /// `build/<kind>s/<name>/<version>/`
    pub fn version_dir(&self, kind: ManifestKind, name: &str, version: &str) -> PathBuf {
        self.build_dir.join(kind.plural()).join(name).join(version)
    }

    pub fn manifest_path(&self, kind: ManifestKind, name: &str, version: &str) -> PathBuf {
        self.version_dir(kind, name, version).join(MANIFEST_FILE_NAME)
    }

    /// マニフェストを書き出す
    ///
    /// 同一バージョンの再ビルドは上書きになるが、既存ファイルの
    /// `created_at` は引き継ぐ（`manifest` 側も書き換える）。
    #[instrument(skip(self, manifest), fields(name = %manifest.name, version = %manifest.version))]
    pub fn write(&self, manifest: &mut Manifest) -> Result<PathBuf> {
        let dir = self.version_dir(manifest.kind, &manifest.name, &manifest.version);
        std::fs::create_dir_all(&dir).map_err(|e| CoreError::IoError {
            path: dir.clone(),
            message: e.to_string(),
        })?;

        let path = dir.join(MANIFEST_FILE_NAME);
        if let Some(first) = previous_created_at(&path) {
            debug!(created_at = %first, "Keeping creation time of existing manifest");
            manifest.created_at = Some(first);
        }
        let bytes = manifest.to_canonical_json()?;
        std::fs::write(&path, bytes).map_err(|e| CoreError::IoError {
            path: path.clone(),
            message: e.to_string(),
        })?;

        info!(path = %path.display(), "Manifest written");
        Ok(path)
    }

    /// マニフェストを読み込む
    pub fn read(&self, path: &Path) -> Result<Manifest> {
        read_manifest_file(path)
    }

    /// 名前とバージョンからローカルのマニフェストを読み込む
    pub fn read_version(&self, kind: ManifestKind, name: &str, version: &str) -> Result<Manifest> {
        let path = self.manifest_path(kind, name, version);
        if !path.exists() {
            return Err(CoreError::ManifestNotFound(path.display().to_string()));
        }
        read_manifest_file(&path)
    }
}

/// 既存マニフェストの作成時刻（読めなければ `None`）
fn previous_created_at(path: &Path) -> Option<DateTime<Utc>> {
    if !path.is_file() {
        return None;
    }
    read_manifest_file(path).ok()?.created_at
}

/// ファイルからマニフェストを読み込む
pub fn read_manifest_file(path: &Path) -> Result<Manifest> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CoreError::ManifestNotFound(path.display().to_string())
        } else {
            CoreError::IoError {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        }
    })?;
    parse_manifest(&bytes, &path.display().to_string())
}

/// BlobStore 上のマニフェストを読み込む
pub async fn read_manifest_uri(store: &dyn BlobStore, uri: &str) -> Result<Manifest> {
    let bytes = store.read(uri).await?;
    parse_manifest(&bytes, uri)
}

/// 構造検証付きでマニフェストをパース
///
/// 未知のキーは無視し、省略可能なキーの欠落はデフォルト値で補う。
pub fn parse_manifest(bytes: &[u8], origin: &str) -> Result<Manifest> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| CoreError::manifest_corrupt(origin, format!("JSON として読めません: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| CoreError::manifest_corrupt(origin, "トップレベルがオブジェクトではありません"))?;

    for key in REQUIRED_STRING_KEYS {
        match object.get(key) {
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(CoreError::manifest_corrupt(
                    origin,
                    format!("'{}' は文字列である必要があります（実際: {}）", key, json_type(other)),
                ));
            }
            None => {
                return Err(CoreError::manifest_corrupt(
                    origin,
                    format!("必須キー '{}' がありません", key),
                ));
            }
        }
    }

    match object.get("payload") {
        Some(Value::Object(_)) => {}
        Some(other) => {
            return Err(CoreError::manifest_corrupt(
                origin,
                format!("'payload' はオブジェクトである必要があります（実際: {}）", json_type(other)),
            ));
        }
        None => {
            return Err(CoreError::manifest_corrupt(origin, "必須キー 'payload' がありません"));
        }
    }

    match object.get("image_refs") {
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => {}
        Some(_) => {
            return Err(CoreError::manifest_corrupt(
                origin,
                "'image_refs' は文字列の配列である必要があります",
            ));
        }
        None => {
            return Err(CoreError::manifest_corrupt(origin, "必須キー 'image_refs' がありません"));
        }
    }

    let manifest: Manifest = serde_json::from_value(value)
        .map_err(|e| CoreError::manifest_corrupt(origin, e.to_string()))?;
    debug!(origin = %origin, name = %manifest.name, version = %manifest.version, "Manifest parsed");
    Ok(manifest)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChannelType;
    use serde_json::json;

    fn sample_manifest() -> Manifest {
        let mut manifest = Manifest::new(ManifestKind::Pipeline, "churn", "my-project", "europe-west1", "v1");
        manifest.payload = json!({
            "displayName": "churn",
            "runtimeConfig": { "parameterValues": { "epochs": 3 } }
        })
        .as_object()
        .cloned()
        .unwrap();
        manifest.image_refs = vec!["trainer".into(), "serving".into()];
        manifest.service_account = Some("sa@my-project.iam.gserviceaccount.com".into());
        manifest.labels.insert("wanna_project".into(), "sample".into());
        manifest.deployment = Some(PipelineDeployment {
            schedule: Some(ScheduleConfig {
                cron: "0 2 * * *".into(),
                timezone: "Etc/UTC".into(),
            }),
            notification_channels: vec![NotificationChannelConfig {
                name: "ops".into(),
                channel: ChannelType::Email {
                    emails: vec!["ops@example.com".into()],
                },
            }],
            sla_hours: Some(2.5),
        });
        manifest.created_at = Some(Utc::now());
        manifest
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(temp_dir.path().join("build"));
        let mut manifest = sample_manifest();

        let path = store.write(&mut manifest).unwrap();
        assert!(path.ends_with("build/pipelines/churn/v1/wanna-manifest.json"));

        let read = store.read(&path).unwrap();
        assert_eq!(read, manifest);

        let by_version = store.read_version(ManifestKind::Pipeline, "churn", "v1").unwrap();
        assert_eq!(by_version, manifest);
    }

    #[test]
    fn test_rewrite_keeps_first_created_at() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(temp_dir.path().join("build"));
        let first: DateTime<Utc> = "2026-01-02T03:04:05Z".parse().unwrap();

        let mut manifest = sample_manifest();
        manifest.created_at = Some(first);
        store.write(&mut manifest).unwrap();

        let mut rebuilt = sample_manifest();
        rebuilt.payload.insert("displayName".into(), json!("churn-v2"));
        let path = store.write(&mut rebuilt).unwrap();

        assert_eq!(rebuilt.created_at, Some(first));
        let read = store.read(&path).unwrap();
        assert_eq!(read.created_at, Some(first));
        assert_eq!(read.payload["displayName"], json!("churn-v2"));

        // 別バージョンは新しい時刻のまま
        let mut next = sample_manifest();
        next.version = "v2".into();
        store.write(&mut next).unwrap();
        assert_ne!(next.created_at, Some(first));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let bytes = br#"{
            "name": "train", "project": "p", "location": "europe-west1", "version": "v2",
            "payload": {}, "image_refs": ["trainer"],
            "written_by": "wanna 9.9", "future_section": {"a": 1}
        }"#;
        let manifest = parse_manifest(bytes, "mem").unwrap();
        assert_eq!(manifest.kind, ManifestKind::Job);
        assert_eq!(manifest.image_refs, vec!["trainer".to_string()]);
        assert!(manifest.service_account.is_none());
        assert!(manifest.labels.is_empty());
    }

    #[test]
    fn test_missing_required_key_is_corrupt() {
        let bytes = br#"{"name": "train", "project": "p", "version": "v1", "payload": {}, "image_refs": []}"#;
        match parse_manifest(bytes, "/tmp/x.json") {
            Err(CoreError::ManifestCorrupt { path, reason }) => {
                assert_eq!(path, "/tmp/x.json");
                assert!(reason.contains("location"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_type_is_corrupt() {
        let bytes = br#"{"name": "t", "project": "p", "location": "l", "version": 1, "payload": {}, "image_refs": []}"#;
        assert!(matches!(
            parse_manifest(bytes, "x"),
            Err(CoreError::ManifestCorrupt { .. })
        ));

        let bytes = br#"{"name": "t", "project": "p", "location": "l", "version": "1", "payload": [], "image_refs": []}"#;
        assert!(matches!(
            parse_manifest(bytes, "x"),
            Err(CoreError::ManifestCorrupt { .. })
        ));

        let bytes = br#"{"name": "t", "project": "p", "location": "l", "version": "1", "payload": {}, "image_refs": [1]}"#;
        assert!(matches!(
            parse_manifest(bytes, "x"),
            Err(CoreError::ManifestCorrupt { .. })
        ));

        assert!(matches!(
            parse_manifest(b"not json", "x"),
            Err(CoreError::ManifestCorrupt { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(temp_dir.path());
        assert!(matches!(
            store.read_version(ManifestKind::Job, "train", "v1"),
            Err(CoreError::ManifestNotFound(_))
        ));
    }

    #[test]
    fn test_release_uris() {
        assert_eq!(
            release_dir_uri("gs://bucket/", ManifestKind::Pipeline, "churn", "v1"),
            "gs://bucket/wanna-pipelines/churn/deployment/release/v1"
        );
        assert_eq!(
            release_manifest_uri("gs://bucket", ManifestKind::Job, "train", "v1"),
            "gs://bucket/wanna-jobs/train/deployment/release/v1/wanna-manifest.json"
        );
    }
}
