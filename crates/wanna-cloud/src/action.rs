//! 実行前に表示する計画

use crate::fleet::FleetDiff;
use serde::{Deserialize, Serialize};

/// 計画された1つの操作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,

    /// リソース種別（"notebook", "tensorboard" など）
    pub resource_type: String,

    pub resource_id: String,

    /// ゾーンまたはリージョン
    pub location: String,
}

impl Action {
    pub fn describe(&self) -> String {
        format!(
            "{} {} {} ({})",
            self.action_type, self.resource_type, self.resource_id, self.location
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
        }
    }
}

/// 操作の一覧
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    /// フリート差分から作成（削除 → 作成の順）
    pub fn from_fleet_diff(resource_type: &str, diff: &FleetDiff) -> Self {
        let deletes = diff.to_delete.iter().map(|m| Action {
            action_type: ActionType::Delete,
            resource_type: resource_type.to_string(),
            resource_id: m.name.clone(),
            location: m.location.clone(),
        });
        let creates = diff.to_create.iter().map(|m| Action {
            action_type: ActionType::Create,
            resource_type: resource_type.to_string(),
            resource_id: m.name.clone(),
            location: m.location.clone(),
        });
        Self::new(deletes.chain(creates).collect())
    }

    pub fn has_changes(&self) -> bool {
        !self.actions.is_empty()
    }

    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete",
            self.create, self.update, self.delete
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::FleetMember;

    #[test]
    fn test_plan_from_fleet_diff() {
        let diff = FleetDiff {
            to_delete: vec![FleetMember::new("old", "europe-west1-b")],
            to_create: vec![
                FleetMember::new("a", "europe-west1-b"),
                FleetMember::new("b", "europe-west1-b"),
            ],
        };
        let plan = Plan::from_fleet_diff("notebook", &diff);

        assert!(plan.has_changes());
        assert_eq!(plan.actions[0].action_type, ActionType::Delete);
        assert_eq!(plan.actions[0].describe(), "delete notebook old (europe-west1-b)");
        assert_eq!(plan.summary().to_string(), "2 to create, 0 to update, 1 to delete");
    }

    #[test]
    fn test_empty_plan() {
        let plan = Plan::from_fleet_diff("tensorboard", &FleetDiff::default());
        assert!(!plan.has_changes());
    }
}
