//! リモートAPI リクエスト本文の組み立て
//!
//! Vertex AI の CustomJob / PipelineJob の JSON 形式でマニフェストの payload を作成します。

use crate::error::{CoreError, Result};
use crate::loader::Project;
use crate::manifest::{
    Manifest, ManifestKind, PIPELINE_SPEC_FILE_NAME, PipelineDeployment, release_dir_uri,
};
use crate::model::{JobConfig, PipelineConfig, PipelineParams};
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// プロファイル・リソース・所有者ラベルを合成
pub fn resource_labels(project: &Project, own: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = project.profile.labels.clone();
    labels.extend(own.clone());
    let ownership = project.config.ownership_label();
    labels.insert(ownership.key, ownership.value);
    labels
}

/// ジョブのマニフェストを作成
///
/// `image_uri` はワーカーイメージのバージョン付きタグ。
pub fn job_manifest(project: &Project, job: &JobConfig, version: &str, image_uri: &str) -> Manifest {
    let profile = &project.profile;
    let location = job.region.clone().unwrap_or_else(|| profile.region.clone());
    let service_account = job
        .service_account
        .clone()
        .or_else(|| profile.service_account.clone());
    let network = job.network.clone().or_else(|| profile.network.clone());
    let labels = resource_labels(project, &job.labels);

    let mut machine_spec = json!({ "machineType": job.worker.machine_type });
    if let Some(acc) = &job.worker.accelerator {
        machine_spec["acceleratorType"] = json!(acc.accelerator_type);
        machine_spec["acceleratorCount"] = json!(acc.count);
    }

    let mut container_spec = json!({ "imageUri": image_uri });
    if !job.worker.command.is_empty() {
        container_spec["command"] = json!(job.worker.command);
    }
    if !job.worker.args.is_empty() {
        container_spec["args"] = json!(job.worker.args);
    }
    if !job.env_vars.is_empty() {
        container_spec["env"] = Value::Array(
            job.env_vars
                .iter()
                .map(|(k, v)| json!({ "name": k, "value": v }))
                .collect(),
        );
    }

    let output_dir = job.base_output_directory.clone().unwrap_or_else(|| {
        format!("{}/wanna-jobs/{}/outputs", profile.bucket_uri(), job.name)
    });

    let mut job_spec = json!({
        "workerPoolSpecs": [{
            "machineSpec": machine_spec,
            "replicaCount": job.worker.replica_count,
            "containerSpec": container_spec,
        }],
        "baseOutputDirectory": { "outputUriPrefix": output_dir },
    });
    if let Some(sa) = &service_account {
        job_spec["serviceAccount"] = json!(sa);
    }
    if let Some(net) = &network {
        job_spec["network"] = json!(net);
    }
    if let Some(tb) = &job.tensorboard_ref {
        job_spec["tensorboard"] = json!(format!(
            "projects/{}/locations/{}/tensorboards/{}",
            profile.project_id, location, tb
        ));
    }
    if let Some(timeout) = job.timeout_seconds {
        job_spec["scheduling"] = json!({ "timeout": format!("{}s", timeout) });
    }

    let mut payload = Map::new();
    payload.insert("displayName".into(), json!(job.name));
    payload.insert("labels".into(), json!(labels));
    payload.insert("jobSpec".into(), job_spec);
    if let Some(key) = &profile.kms_key {
        payload.insert("encryptionSpec".into(), json!({ "kmsKeyName": key }));
    }

    let mut manifest = Manifest::new(
        ManifestKind::Job,
        &job.name,
        &profile.project_id,
        location,
        version,
    );
    manifest.payload = payload;
    manifest.image_refs = vec![job.worker.docker_image_ref.clone()];
    manifest.service_account = service_account;
    manifest.network = network;
    manifest.encryption_key = profile.kms_key.clone();
    manifest.labels = labels;
    manifest.created_at = Some(Utc::now());
    manifest
}

/// パイプラインの成果物を置くバケット URI
pub fn pipeline_bucket_uri(project: &Project, pipeline: &PipelineConfig) -> String {
    pipeline
        .bucket
        .as_ref()
        .map(|b| {
            if b.starts_with("gs://") {
                b.trim_end_matches('/').to_string()
            } else {
                format!("gs://{}", b.trim_end_matches('/'))
            }
        })
        .unwrap_or_else(|| project.profile.bucket_uri())
}

/// `pipeline_params` を実行時パラメータのマップに解決
///
/// ファイル指定の場合はプロジェクトルートからの相対パスとして YAML を読む。
pub fn pipeline_parameter_values(
    project: &Project,
    pipeline: &PipelineConfig,
) -> Result<Map<String, Value>> {
    match &pipeline.pipeline_params {
        None => Ok(Map::new()),
        Some(PipelineParams::Inline(values)) => {
            Ok(values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        }
        Some(PipelineParams::File(path)) => {
            let path = project.resolve_path(path);
            let content = std::fs::read_to_string(&path).map_err(|e| CoreError::IoError {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let value: Value =
                serde_yaml::from_str(&content).map_err(|e| CoreError::YamlParse {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            match value {
                Value::Object(map) => Ok(map),
                Value::Null => Ok(Map::new()),
                _ => Err(CoreError::InvalidConfig(format!(
                    "pipeline_params はマッピングである必要があります: {}",
                    path.display()
                ))),
            }
        }
    }
}

/// パイプラインのマニフェストを作成
///
/// `parameter_values` はコンパイル時に確定した実行時パラメータ。
pub fn pipeline_manifest(
    project: &Project,
    pipeline: &PipelineConfig,
    version: &str,
    parameter_values: Map<String, Value>,
) -> Manifest {
    let profile = &project.profile;
    let location = pipeline
        .region
        .clone()
        .unwrap_or_else(|| profile.region.clone());
    let bucket_uri = pipeline_bucket_uri(project, pipeline);
    let service_account = pipeline
        .service_account
        .clone()
        .or_else(|| profile.service_account.clone());
    let network = pipeline.network.clone().or_else(|| profile.network.clone());
    let labels = resource_labels(project, &pipeline.labels);

    let release_dir = release_dir_uri(&bucket_uri, ManifestKind::Pipeline, &pipeline.name, version);

    let mut payload = Map::new();
    payload.insert("displayName".into(), json!(pipeline.name));
    payload.insert("labels".into(), json!(labels));
    payload.insert(
        "templateUri".into(),
        json!(format!("{}/{}", release_dir, PIPELINE_SPEC_FILE_NAME)),
    );
    payload.insert(
        "runtimeConfig".into(),
        json!({
            "gcsOutputDirectory": format!("{}/wanna-pipelines/{}/executions", bucket_uri, pipeline.name),
            "parameterValues": Value::Object(parameter_values),
        }),
    );
    if let Some(sa) = &service_account {
        payload.insert("serviceAccount".into(), json!(sa));
    }
    if let Some(net) = &network {
        payload.insert("network".into(), json!(net));
    }
    if let Some(key) = &profile.kms_key {
        payload.insert("encryptionSpec".into(), json!({ "kmsKeyName": key }));
    }

    let notification_channels = pipeline
        .notification_channels_ref
        .iter()
        .filter_map(|name| project.config.notification_channel(name).cloned())
        .collect();

    let mut manifest = Manifest::new(
        ManifestKind::Pipeline,
        &pipeline.name,
        &profile.project_id,
        location,
        version,
    );
    manifest.payload = payload;
    manifest.image_refs = pipeline.docker_image_ref.clone();
    manifest.service_account = service_account;
    manifest.network = network;
    manifest.encryption_key = profile.kms_key.clone();
    manifest.labels = labels;
    manifest.deployment = Some(PipelineDeployment {
        schedule: pipeline.schedule.clone(),
        notification_channels,
        sla_hours: pipeline.sla_hours,
    });
    manifest.created_at = Some(Utc::now());
    manifest
}
