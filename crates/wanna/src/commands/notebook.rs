use super::FleetOptions;
use super::{fleet, release};
use crate::utils::{self, Workspace};
use colored::Colorize;
use std::collections::HashMap;
use std::sync::Arc;
use wanna_cloud::{Action, ActionType, FleetApi, FleetDiffer, FleetMember, Plan};
use wanna_cloud_gcp::{NotebookApi, NotebookImage, NotebookSpec};
use wanna_core::payload::resource_labels;
use wanna_core::{NotebookConfig, NotebookEnvironment, PushMode};

const KIND: &str = "notebook";

fn zone_of(workspace: &Workspace, notebook: &NotebookConfig) -> String {
    notebook
        .zone
        .clone()
        .unwrap_or_else(|| workspace.project.profile.zone_or_default())
}

fn member_of(workspace: &Workspace, notebook: &NotebookConfig) -> FleetMember {
    FleetMember {
        name: notebook.name.clone(),
        location: zone_of(workspace, notebook),
        labels: resource_labels(&workspace.project, &notebook.labels),
    }
}

fn selected<'a>(workspace: &'a Workspace, options: &FleetOptions) -> anyhow::Result<Vec<&'a NotebookConfig>> {
    let notebooks = utils::select(
        &workspace.project.config.notebooks,
        options.name.as_deref(),
        KIND,
        |notebook| notebook.name.as_str(),
    )?;
    if notebooks.is_empty() {
        utils::print_step("No notebooks declared in wanna.yaml");
    }
    Ok(notebooks)
}

/// 宣言されたゾーンを全て一覧対象にする
fn api(workspace: &Workspace) -> Arc<NotebookApi> {
    let mut zones: Vec<String> = workspace
        .project
        .config
        .notebooks
        .iter()
        .map(|notebook| zone_of(workspace, notebook))
        .collect();
    zones.push(workspace.project.profile.zone_or_default());
    Arc::new(NotebookApi::new(workspace.gcloud(), zones))
}

fn differ(workspace: &Workspace, api: Arc<NotebookApi>) -> FleetDiffer<NotebookApi> {
    FleetDiffer::new(api, workspace.project.config.ownership_label())
}

/// 作成用の仕様を組み立てる
///
/// コンテナ環境のノートブックはイメージをビルドしてプッシュしてから作成する。
async fn specs_for(
    workspace: &Workspace,
    notebooks: &[&NotebookConfig],
) -> anyhow::Result<HashMap<String, NotebookSpec>> {
    let project = &workspace.project;
    let profile = &project.profile;
    let refs: Vec<&str> = notebooks
        .iter()
        .filter_map(|notebook| notebook.environment.docker_image_ref())
        .collect();

    let mut images = HashMap::new();
    if !refs.is_empty() {
        let version = workspace.version(None);
        let mut orchestrator = release::orchestrator(workspace, &version, PushMode::All)?;
        let resolved = orchestrator
            .resolve_all(&refs)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        release::push_images(workspace, &resolved).await?;
        for image in resolved {
            images.insert(image.image_ref.clone(), image.image_uri().to_string());
        }
    }

    let mut specs = HashMap::new();
    for notebook in notebooks {
        let image = match &notebook.environment {
            NotebookEnvironment::Container { docker_image_ref } => NotebookImage::Container {
                uri: images
                    .get(docker_image_ref)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("image '{}' was not resolved", docker_image_ref))?,
            },
            NotebookEnvironment::Vm { vm_image } => NotebookImage::Vm {
                project: vm_image.project.clone(),
                family: vm_image.family.clone(),
            },
        };
        let member = member_of(workspace, notebook);
        specs.insert(
            notebook.name.clone(),
            NotebookSpec {
                name: member.name,
                zone: member.location,
                machine_type: notebook.machine_type.clone(),
                image,
                owner: notebook.owner.clone(),
                labels: member.labels,
                boot_disk_gb: notebook.boot_disk_gb,
                network: profile.network.clone(),
                subnet: profile.subnet.clone(),
                service_account: profile.service_account.clone(),
            },
        );
    }
    Ok(specs)
}

/// 未作成のものだけを作成する
pub async fn create(workspace: &Workspace, options: &FleetOptions) -> anyhow::Result<()> {
    let notebooks = selected(workspace, options)?;
    let declared: Vec<FleetMember> = notebooks.iter().map(|n| member_of(workspace, n)).collect();
    let differ = differ(workspace, api(workspace));
    let diff = differ.plan(&declared).await?;

    let missing: Vec<&NotebookConfig> = notebooks
        .into_iter()
        .filter(|n| diff.to_create.iter().any(|m| m.name == n.name))
        .collect();
    for member in declared.iter().filter(|m| !missing.iter().any(|n| n.name == m.name)) {
        utils::print_ok(&format!("Notebook {} already exists", member.name.cyan()));
    }
    if missing.is_empty() {
        return Ok(());
    }
    if options.dry_run {
        for notebook in &missing {
            utils::print_step(&format!("Would create notebook {}", notebook.name.cyan()));
        }
        return Ok(());
    }

    let specs = specs_for(workspace, &missing).await?;
    let results = differ.create_all(specs.into_iter().collect()).await;
    utils::finish_members("Created notebook", &results)
}

pub async fn delete(workspace: &Workspace, options: &FleetOptions) -> anyhow::Result<()> {
    let notebooks = selected(workspace, options)?;
    let api = api(workspace);
    let differ = differ(workspace, api.clone());
    let live = api.list(differ.scope()).await?;

    let targets: Vec<FleetMember> = live
        .into_iter()
        .filter(|m| notebooks.iter().any(|n| n.name == m.name))
        .collect();
    if targets.is_empty() {
        utils::print_ok("No matching notebooks are running");
        return Ok(());
    }

    let plan = Plan::new(
        targets
            .iter()
            .map(|m| Action {
                action_type: ActionType::Delete,
                resource_type: KIND.to_string(),
                resource_id: m.name.clone(),
                location: m.location.clone(),
            })
            .collect(),
    );
    if !fleet::approve(&plan, options)? {
        return Ok(());
    }

    let results = differ.delete_all(targets).await;
    utils::finish_members("Deleted notebook", &results)
}

/// 宣言に揃える（未宣言の所有インスタンスは削除）
pub async fn sync(workspace: &Workspace, options: &FleetOptions) -> anyhow::Result<()> {
    let declared: Vec<FleetMember> = workspace
        .project
        .config
        .notebooks
        .iter()
        .map(|n| member_of(workspace, n))
        .collect();
    let differ = differ(workspace, api(workspace));
    let diff = fleet::restrict(differ.plan(&declared).await?, options.name.as_deref());

    let plan = Plan::from_fleet_diff(KIND, &diff);
    if !fleet::approve(&plan, options)? {
        return Ok(());
    }

    let to_create: Vec<&NotebookConfig> = workspace
        .project
        .config
        .notebooks
        .iter()
        .filter(|n| diff.to_create.iter().any(|m| m.name == n.name))
        .collect();
    let specs = specs_for(workspace, &to_create).await?;
    let report = differ.apply(&diff, |member| specs.get(&member.name).cloned()).await;
    fleet::finish_report(KIND, &report)
}

pub async fn report(workspace: &Workspace, options: &FleetOptions) -> anyhow::Result<()> {
    let api = api(workspace);
    for notebook in selected(workspace, options)? {
        let zone = zone_of(workspace, notebook);
        match api.describe(&notebook.name, &zone).await {
            Ok(status) => {
                println!("{} ({})", status.name.cyan().bold(), status.zone);
                println!("  state: {}", status.state);
                if let Some(creator) = &status.creator {
                    println!("  creator: {}", creator);
                }
                if let Some(uri) = &status.proxy_uri {
                    println!("  jupyterlab: {}", uri);
                }
            }
            Err(e) if e.is_not_found() => {
                println!("{} ({})", notebook.name.cyan().bold(), zone);
                println!("  state: {}", "NOT CREATED".dimmed());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
