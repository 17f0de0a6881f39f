use super::FleetOptions;
use super::fleet;
use crate::utils::{self, Workspace};
use colored::Colorize;
use std::sync::Arc;
use wanna_cloud::{Action, ActionType, FleetDiffer, FleetMember, Plan};
use wanna_cloud_gcp::{TensorboardApi, TensorboardSpec};
use wanna_core::TensorboardConfig;
use wanna_core::payload::resource_labels;

const KIND: &str = "tensorboard";

fn region_of(workspace: &Workspace, tensorboard: &TensorboardConfig) -> String {
    tensorboard
        .region
        .clone()
        .unwrap_or_else(|| workspace.project.profile.region.clone())
}

fn spec_of(workspace: &Workspace, tensorboard: &TensorboardConfig) -> TensorboardSpec {
    TensorboardSpec {
        name: tensorboard.name.clone(),
        region: region_of(workspace, tensorboard),
        labels: resource_labels(&workspace.project, &tensorboard.labels),
    }
}

fn selected<'a>(
    workspace: &'a Workspace,
    options: &FleetOptions,
) -> anyhow::Result<Vec<&'a TensorboardConfig>> {
    let tensorboards = utils::select(
        &workspace.project.config.tensorboards,
        options.name.as_deref(),
        KIND,
        |tb| tb.name.as_str(),
    )?;
    if tensorboards.is_empty() {
        utils::print_step("No tensorboards declared in wanna.yaml");
    }
    Ok(tensorboards)
}

fn api(workspace: &Workspace) -> Arc<TensorboardApi> {
    let mut regions: Vec<String> = workspace
        .project
        .config
        .tensorboards
        .iter()
        .map(|tb| region_of(workspace, tb))
        .collect();
    regions.push(workspace.project.profile.region.clone());
    Arc::new(TensorboardApi::new(workspace.gcloud(), regions))
}

fn differ(workspace: &Workspace, api: Arc<TensorboardApi>) -> FleetDiffer<TensorboardApi> {
    FleetDiffer::new(api, workspace.project.config.ownership_label())
}

/// 未作成のものだけを作成する
pub async fn create(workspace: &Workspace, options: &FleetOptions) -> anyhow::Result<()> {
    let specs: Vec<TensorboardSpec> = selected(workspace, options)?
        .into_iter()
        .map(|tb| spec_of(workspace, tb))
        .collect();
    let declared: Vec<FleetMember> = specs.iter().map(TensorboardSpec::member).collect();
    let differ = differ(workspace, api(workspace));
    let diff = differ.plan(&declared).await?;

    let (missing, existing): (Vec<TensorboardSpec>, Vec<TensorboardSpec>) = specs
        .into_iter()
        .partition(|spec| diff.to_create.iter().any(|m| m.name == spec.name));
    for spec in &existing {
        utils::print_ok(&format!("Tensorboard {} already exists", spec.name.cyan()));
    }
    if missing.is_empty() {
        return Ok(());
    }
    if options.dry_run {
        for spec in &missing {
            utils::print_step(&format!("Would create tensorboard {}", spec.name.cyan()));
        }
        return Ok(());
    }

    let results = differ
        .create_all(missing.into_iter().map(|spec| (spec.name.clone(), spec)).collect())
        .await;
    utils::finish_members("Created tensorboard", &results)
}

pub async fn delete(workspace: &Workspace, options: &FleetOptions) -> anyhow::Result<()> {
    let tensorboards = selected(workspace, options)?;
    let api = api(workspace);
    let differ = differ(workspace, api.clone());

    let targets: Vec<FleetMember> = api
        .list_details(differ.scope())
        .await?
        .into_iter()
        .filter(|info| tensorboards.iter().any(|tb| tb.name == info.display_name))
        .map(|info| FleetMember {
            name: info.display_name,
            location: info.region,
            labels: info.labels,
        })
        .collect();
    if targets.is_empty() {
        utils::print_ok("No matching tensorboards exist");
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
    utils::finish_members("Deleted tensorboard", &results)
}

/// 宣言に揃える（未宣言の所有インスタンスは削除）
pub async fn sync(workspace: &Workspace, options: &FleetOptions) -> anyhow::Result<()> {
    let specs: Vec<TensorboardSpec> = workspace
        .project
        .config
        .tensorboards
        .iter()
        .map(|tb| spec_of(workspace, tb))
        .collect();
    let declared: Vec<FleetMember> = specs.iter().map(TensorboardSpec::member).collect();
    let differ = differ(workspace, api(workspace));
    let diff = fleet::restrict(differ.plan(&declared).await?, options.name.as_deref());

    let plan = Plan::from_fleet_diff(KIND, &diff);
    if !fleet::approve(&plan, options)? {
        return Ok(());
    }

    let report = differ
        .apply(&diff, |member| {
            specs.iter().find(|spec| spec.name == member.name).cloned()
        })
        .await;
    fleet::finish_report(KIND, &report)
}

/// 所有者ラベルの付いた Tensorboard とコンソールURL
pub async fn list(workspace: &Workspace, options: &FleetOptions) -> anyhow::Result<()> {
    let api = api(workspace);
    let scope = workspace.project.config.ownership_label();
    let mut found = api.list_details(&scope).await?;
    if let Some(name) = options.name.as_deref().filter(|n| *n != "all") {
        found.retain(|info| info.display_name == name);
    }

    if found.is_empty() {
        println!("No tensorboards labelled {}", scope.to_string().cyan());
        return Ok(());
    }
    for info in &found {
        println!("{} ({})", info.display_name.cyan().bold(), info.region);
        println!("  resource: {}", info.resource_name);
        println!("  url: {}", info.console_url());
    }
    Ok(())
}
