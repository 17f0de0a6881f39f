//! notebook / tensorboard の sync で共通する表示と確認

use super::FleetOptions;
use crate::utils;
use colored::Colorize;
use wanna_cloud::{ActionType, FleetDiff, FleetMember, FleetReport, Plan};

/// `-n` 指定時はその名前の差分だけに絞る
pub fn restrict(diff: FleetDiff, name: Option<&str>) -> FleetDiff {
    match name {
        None | Some("all") => diff,
        Some(name) => {
            let keep = |members: Vec<FleetMember>| -> Vec<FleetMember> {
                members.into_iter().filter(|m| m.name == name).collect()
            };
            FleetDiff {
                to_delete: keep(diff.to_delete),
                to_create: keep(diff.to_create),
            }
        }
    }
}

pub fn print_plan(plan: &Plan) {
    if !plan.has_changes() {
        utils::print_ok("Already in sync, nothing to do");
        return;
    }
    println!("{}", "Planned changes:".bold());
    for action in &plan.actions {
        let marker = match action.action_type {
            ActionType::Create => "+".green(),
            ActionType::Update => "~".yellow(),
            ActionType::Delete => "-".red(),
        };
        println!("  {} {}", marker, action.describe());
    }
    println!("{}", plan.summary());
}

/// 計画を表示し、実行してよいかを判定
///
/// `--dry-run` は表示のみ、`--yes` はプロンプトを省略する。
pub fn approve(plan: &Plan, options: &FleetOptions) -> anyhow::Result<bool> {
    print_plan(plan);
    if !plan.has_changes() || options.dry_run {
        return Ok(false);
    }
    if options.yes {
        return Ok(true);
    }
    let approved = utils::confirm("Apply these changes?")?;
    if !approved {
        println!("{}", "Cancelled".yellow());
    }
    Ok(approved)
}

/// 結果を表示し、失敗があればエラーにする
pub fn finish_report(kind: &str, report: &FleetReport) -> anyhow::Result<()> {
    for name in &report.created {
        utils::print_ok(&format!("Created {} {}", kind, name.cyan()));
    }
    for name in &report.deleted {
        utils::print_ok(&format!("Deleted {} {}", kind, name.cyan()));
    }
    for (name, error) in &report.failed {
        utils::print_failed(&format!("{} {}: {}", kind, name, error));
    }
    let failed: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
    utils::ensure_none_failed(&format!("{} sync", kind), &failed)
}
