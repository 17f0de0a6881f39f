//! wanna.yaml の意味検証
//!
//! パース後に一度だけ実行し、問題をまとめて報告します。

use crate::error::{CoreError, Result};
use crate::model::{BuildSpec, WannaConfig};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

/// 名前・ラベルの書式
struct NamingRules {
    label_key: Regex,
    label_value: Regex,
    resource_name: Regex,
}

impl NamingRules {
    fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| CoreError::InvalidConfig(format!("正規表現のコンパイルエラー: {}", e)))
        };
        Ok(Self {
            label_key: compile(r"^[a-z][a-z0-9_-]{0,62}$")?,
            label_value: compile(r"^[a-z0-9_-]{0,63}$")?,
            resource_name: compile(r"^[a-z]([a-z0-9-]{0,61}[a-z0-9])?$")?,
        })
    }
}

/// 設定全体を検証
pub fn validate_config(config: &WannaConfig) -> Result<()> {
    let rules = NamingRules::new()?;
    let mut issues = Vec::new();

    check_unique(
        "docker.images",
        config
            .docker
            .iter()
            .flat_map(|d| d.images.iter().map(|i| i.name.as_str())),
        &mut issues,
    );
    check_unique("jobs", config.jobs.iter().map(|j| j.name.as_str()), &mut issues);
    check_unique(
        "pipelines",
        config.pipelines.iter().map(|p| p.name.as_str()),
        &mut issues,
    );
    check_unique(
        "notebooks",
        config.notebooks.iter().map(|n| n.name.as_str()),
        &mut issues,
    );
    check_unique(
        "tensorboards",
        config.tensorboards.iter().map(|t| t.name.as_str()),
        &mut issues,
    );
    check_unique(
        "notification_channels",
        config.notification_channels.iter().map(|c| c.name.as_str()),
        &mut issues,
    );
    check_unique(
        "gcp_profiles",
        config.gcp_profiles.iter().map(|p| p.profile_name.as_str()),
        &mut issues,
    );

    if let Some(docker) = &config.docker {
        for image in &docker.images {
            match &image.build {
                BuildSpec::LocalBuild { context_dir, .. } if context_dir.as_os_str().is_empty() => {
                    issues.push(format!("docker.images.{}: context_dir が空です", image.name));
                }
                BuildSpec::Provided { image_url } if image_url.trim().is_empty() => {
                    issues.push(format!("docker.images.{}: image_url が空です", image.name));
                }
                _ => {}
            }
        }
    }

    for job in &config.jobs {
        check_resource_name(&rules, "jobs", &job.name, &mut issues);
        check_image_ref(config, &format!("jobs.{}", job.name), &job.worker.docker_image_ref, &mut issues);
        if let Some(tb) = &job.tensorboard_ref
            && config.tensorboard(tb).is_none()
        {
            issues.push(format!("jobs.{}: tensorboard_ref '{}' が未定義です", job.name, tb));
        }
        check_labels(&rules, &format!("jobs.{}", job.name), &job.labels, &mut issues);
    }

    for pipeline in &config.pipelines {
        check_resource_name(&rules, "pipelines", &pipeline.name, &mut issues);
        for image_ref in &pipeline.docker_image_ref {
            check_image_ref(config, &format!("pipelines.{}", pipeline.name), image_ref, &mut issues);
        }
        for channel in &pipeline.notification_channels_ref {
            if config.notification_channel(channel).is_none() {
                issues.push(format!(
                    "pipelines.{}: notification_channels_ref '{}' が未定義です",
                    pipeline.name, channel
                ));
            }
        }
        if let Some(sla) = pipeline.sla_hours
            && sla <= 0.0
        {
            issues.push(format!("pipelines.{}: sla_hours は正の値が必要です", pipeline.name));
        }
        check_labels(&rules, &format!("pipelines.{}", pipeline.name), &pipeline.labels, &mut issues);
    }

    for notebook in &config.notebooks {
        check_resource_name(&rules, "notebooks", &notebook.name, &mut issues);
        if let Some(image_ref) = notebook.environment.docker_image_ref() {
            check_image_ref(config, &format!("notebooks.{}", notebook.name), image_ref, &mut issues);
        }
        if let Some(tb) = &notebook.tensorboard_ref
            && config.tensorboard(tb).is_none()
        {
            issues.push(format!(
                "notebooks.{}: tensorboard_ref '{}' が未定義です",
                notebook.name, tb
            ));
        }
        check_labels(&rules, &format!("notebooks.{}", notebook.name), &notebook.labels, &mut issues);
    }

    for tensorboard in &config.tensorboards {
        check_labels(
            &rules,
            &format!("tensorboards.{}", tensorboard.name),
            &tensorboard.labels,
            &mut issues,
        );
    }

    for profile in &config.gcp_profiles {
        check_labels(
            &rules,
            &format!("gcp_profiles.{}", profile.profile_name),
            &profile.labels,
            &mut issues,
        );
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(CoreError::InvalidConfig(issues.join("\n")))
    }
}

fn check_unique<'a>(section: &str, names: impl Iterator<Item = &'a str>, issues: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            issues.push(format!("{}: 名前 '{}' が重複しています", section, name));
        }
    }
}

fn check_image_ref(config: &WannaConfig, owner: &str, image_ref: &str, issues: &mut Vec<String>) {
    if config.image(image_ref).is_none() {
        issues.push(format!(
            "{}: docker_image_ref '{}' が docker.images に定義されていません",
            owner, image_ref
        ));
    }
}

fn check_resource_name(rules: &NamingRules, section: &str, name: &str, issues: &mut Vec<String>) {
    if !rules.resource_name.is_match(name) {
        issues.push(format!(
            "{}: 名前 '{}' は小文字・数字・ハイフンのみ使用できます",
            section, name
        ));
    }
}

fn check_labels(
    rules: &NamingRules,
    owner: &str,
    labels: &BTreeMap<String, String>,
    issues: &mut Vec<String>,
) {
    for (key, value) in labels {
        if !rules.label_key.is_match(key) {
            issues.push(format!("{}: 無効なラベルキー '{}'", owner, key));
        }
        if !rules.label_value.is_match(value) {
            issues.push(format!("{}: 無効なラベル値 '{}={}'", owner, key, value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> WannaConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    const BASE: &str = r#"
wanna_project:
  name: sample
docker:
  repository: repo
  images:
    - name: trainer
      build_type: local_build_image
      context_dir: ./trainer
"#;

    #[test]
    fn test_valid_config() {
        let config = parse(&format!(
            "{}{}",
            BASE,
            r#"
jobs:
  - name: train
    worker:
      docker_image_ref: trainer
    labels:
      team: ml-platform
"#
        ));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_unresolved_image_ref() {
        let config = parse(&format!(
            "{}{}",
            BASE,
            r#"
jobs:
  - name: train
    worker:
      docker_image_ref: unknown
"#
        ));
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("unknown"));
    }

    #[test]
    fn test_duplicate_names_and_bad_labels_are_all_reported() {
        let config = parse(&format!(
            "{}{}",
            BASE,
            r#"
tensorboards:
  - name: board
    labels:
      Team: x
  - name: board
"#
        ));
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("重複"));
        assert!(err.contains("Team"));
    }

    #[test]
    fn test_pipeline_channel_ref() {
        let config = parse(&format!(
            "{}{}",
            BASE,
            r#"
pipelines:
  - name: churn
    pipeline_file: pipeline.py
    notification_channels_ref: [ops]
"#
        ));
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("ops"));
    }

    #[test]
    fn test_invalid_resource_name() {
        let config = parse(&format!(
            "{}{}",
            BASE,
            r#"
notebooks:
  - name: My_Notebook
"#
        ));
        assert!(validate_config(&config).is_err());
    }
}
