//! 長期稼働インスタンス群の差分
//!
//! 宣言されたメンバーと稼働中のメンバーを比較し、作成・削除対象を求めます。
//! 差分の計算と実行は分かれており、実行せずに表示すればドライランになります。

use crate::error::Result;
use crate::fanout::{DEFAULT_PARALLELISM, run_bounded};
use crate::provider::FleetApi;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use wanna_core::OwnershipLabel;

/// インスタンス1台分の識別情報
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FleetMember {
    pub name: String,
    /// ゾーンまたはリージョン
    pub location: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl FleetMember {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn is_owned_by(&self, scope: &OwnershipLabel) -> bool {
        scope.is_carried_by(&self.labels)
    }
}

/// 差分（互いに素）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetDiff {
    pub to_delete: Vec<FleetMember>,
    pub to_create: Vec<FleetMember>,
}

impl FleetDiff {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_create.is_empty()
    }
}

/// 宣言と稼働中の差分を計算
///
/// - 削除対象: 所有者ラベルを持ち、名前が宣言に無い稼働中メンバー
/// - 作成対象: (名前, 場所) が稼働中に無い宣言メンバー
///
/// 所有者ラベルの無いメンバーは決して削除対象にならない。
pub fn diff(declared: &[FleetMember], live: &[FleetMember], scope: &OwnershipLabel) -> FleetDiff {
    let declared_names: HashSet<&str> = declared.iter().map(|m| m.name.as_str()).collect();
    let live_keys: HashSet<(&str, &str)> = live
        .iter()
        .map(|m| (m.name.as_str(), m.location.as_str()))
        .collect();

    let to_delete: Vec<FleetMember> = live
        .iter()
        .filter(|m| m.is_owned_by(scope) && !declared_names.contains(m.name.as_str()))
        .cloned()
        .collect();

    let to_create: Vec<FleetMember> = declared
        .iter()
        .filter(|m| !live_keys.contains(&(m.name.as_str(), m.location.as_str())))
        .cloned()
        .collect();

    for member in &to_delete {
        assert!(
            member.is_owned_by(scope),
            "refusing to delete '{}': it does not carry {}",
            member.name,
            scope
        );
    }

    debug!(
        delete = to_delete.len(),
        create = to_create.len(),
        "Fleet diff computed"
    );
    FleetDiff {
        to_delete,
        to_create,
    }
}

/// メンバーごとの実行結果
#[derive(Debug, Default)]
pub struct FleetReport {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl FleetReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 稼働中の一覧取得と差分・実行をまとめる
pub struct FleetDiffer<A: FleetApi> {
    api: Arc<A>,
    scope: OwnershipLabel,
    parallelism: usize,
}

impl<A: FleetApi + 'static> FleetDiffer<A> {
    pub fn new(api: Arc<A>, scope: OwnershipLabel) -> Self {
        Self {
            api,
            scope,
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn scope(&self) -> &OwnershipLabel {
        &self.scope
    }

    /// 稼働中メンバーを取得して差分を計算（何も実行しない）
    #[instrument(skip(self, declared), fields(kind = self.api.kind(), scope = %self.scope))]
    pub async fn plan(&self, declared: &[FleetMember]) -> Result<FleetDiff> {
        let live = self.api.list(&self.scope).await?;
        debug!(live = live.len(), declared = declared.len(), "Listed live members");
        Ok(diff(declared, &live, &self.scope))
    }

    /// 指定メンバーを並列に作成
    pub async fn create_all(&self, specs: Vec<(String, A::Spec)>) -> Vec<(String, Result<()>)> {
        let api = self.api.clone();
        run_bounded(specs, self.parallelism, move |spec| {
            let api = api.clone();
            async move { api.create(&spec).await }
        })
        .await
    }

    /// 指定メンバーを並列に削除
    pub async fn delete_all(&self, members: Vec<FleetMember>) -> Vec<(String, Result<()>)> {
        let api = self.api.clone();
        let items = members.into_iter().map(|m| (m.name.clone(), m)).collect();
        run_bounded(items, self.parallelism, move |member| {
            let api = api.clone();
            async move { api.delete(&member).await }
        })
        .await
    }

    /// 差分を実行する
    ///
    /// `spec_for` は作成対象メンバーの宣言を返す。全ワーカーの完了を待ってから結果を返す。
    pub async fn apply<F>(&self, diff: &FleetDiff, spec_for: F) -> FleetReport
    where
        F: Fn(&FleetMember) -> Option<A::Spec>,
    {
        let mut report = FleetReport::default();

        let specs: Vec<(String, A::Spec)> = diff
            .to_create
            .iter()
            .filter_map(|m| spec_for(m).map(|spec| (m.name.clone(), spec)))
            .collect();

        for (name, result) in self.create_all(specs).await {
            match result {
                Ok(()) => report.created.push(name),
                Err(e) => report.failed.push((name, e.to_string())),
            }
        }
        for (name, result) in self.delete_all(diff.to_delete.clone()).await {
            match result {
                Ok(()) => report.deleted.push(name),
                Err(e) => report.failed.push((name, e.to_string())),
            }
        }

        info!(
            created = report.created.len(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Fleet reconciled"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn scope() -> OwnershipLabel {
        OwnershipLabel::new("wanna_project", "sample")
    }

    fn owned(name: &str) -> FleetMember {
        FleetMember::new(name, "europe-west1-b").with_label("wanna_project", "sample")
    }

    #[test]
    fn test_diff_basic() {
        let declared = vec![owned("a"), owned("b")];
        let live = vec![
            owned("b"),
            owned("stale"),
            FleetMember::new("someone-else", "europe-west1-b"),
        ];

        let diff = diff(&declared, &live, &scope());
        assert_eq!(diff.to_create, vec![owned("a")]);
        assert_eq!(diff.to_delete, vec![owned("stale")]);
    }

    #[test]
    fn test_other_project_label_is_not_deleted() {
        let live = vec![FleetMember::new("nb", "z").with_label("wanna_project", "other")];
        let diff = diff(&[], &live, &scope());
        assert!(diff.to_delete.is_empty());
    }

    #[test]
    fn test_location_change_creates() {
        let declared = vec![FleetMember::new("nb", "us-central1-a")];
        let live = vec![FleetMember::new("nb", "europe-west1-b").with_label("wanna_project", "sample")];
        let diff = diff(&declared, &live, &scope());
        // 名前が宣言にあるので削除はしない
        assert!(diff.to_delete.is_empty());
        assert_eq!(diff.to_create.len(), 1);
    }

    fn member_strategy() -> impl Strategy<Value = FleetMember> {
        (
            "[a-d]{1,2}",
            prop_oneof![Just("z1"), Just("z2")],
            prop::option::of(prop_oneof![Just("sample"), Just("other")]),
        )
            .prop_map(|(name, location, owner)| {
                let member = FleetMember::new(name, location);
                match owner {
                    Some(owner) => member.with_label("wanna_project", owner),
                    None => member,
                }
            })
    }

    proptest! {
        #[test]
        fn prop_diff_is_safe(
            declared in prop::collection::vec(member_strategy(), 0..8),
            live in prop::collection::vec(member_strategy(), 0..8),
        ) {
            let scope = scope();
            let diff = diff(&declared, &live, &scope);

            for member in &diff.to_delete {
                prop_assert!(live.contains(member));
                prop_assert!(member.is_owned_by(&scope));
                prop_assert!(!declared.iter().any(|d| d.name == member.name));
            }
            for member in &diff.to_create {
                prop_assert!(!live
                    .iter()
                    .any(|l| l.name == member.name && l.location == member.location));
                prop_assert!(declared.contains(member));
            }
        }
    }

    #[derive(Default)]
    struct FakeFleet {
        live: Mutex<Vec<FleetMember>>,
        fail: Option<String>,
    }

    #[async_trait]
    impl FleetApi for FakeFleet {
        type Spec = FleetMember;

        fn kind(&self) -> &'static str {
            "notebook"
        }

        async fn list(&self, _scope: &OwnershipLabel) -> Result<Vec<FleetMember>> {
            Ok(self.live.lock().unwrap().clone())
        }

        async fn create(&self, spec: &FleetMember) -> Result<()> {
            if self.fail.as_deref() == Some(spec.name.as_str()) {
                return Err(CloudError::ApiError("quota exceeded".into()));
            }
            self.live.lock().unwrap().push(spec.clone());
            Ok(())
        }

        async fn delete(&self, member: &FleetMember) -> Result<()> {
            self.live.lock().unwrap().retain(|m| m.name != member.name);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_plan_then_apply_converges() {
        let api = Arc::new(FakeFleet {
            live: Mutex::new(vec![owned("stale"), owned("keep")]),
            fail: None,
        });
        let differ = FleetDiffer::new(api.clone(), scope());
        let declared = vec![owned("keep"), owned("new-1"), owned("new-2")];

        let diff = differ.plan(&declared).await.unwrap();
        // plan は何も変更しない
        assert_eq!(api.live.lock().unwrap().len(), 2);

        let report = differ.apply(&diff, |m| Some(m.clone())).await;
        assert!(report.is_success());
        assert_eq!(report.deleted, vec!["stale".to_string()]);
        assert_eq!(report.created.len(), 2);

        assert!(differ.plan(&declared).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_reports_failures_after_all_workers() {
        let api = Arc::new(FakeFleet {
            live: Mutex::new(Vec::new()),
            fail: Some("bad".into()),
        });
        let differ = FleetDiffer::new(api.clone(), scope()).with_parallelism(1);
        let declared = vec![owned("bad"), owned("good")];

        let diff = differ.plan(&declared).await.unwrap();
        let report = differ.apply(&diff, |m| Some(m.clone())).await;

        assert!(!report.is_success());
        assert_eq!(report.failed[0].0, "bad");
        assert_eq!(report.created, vec!["good".to_string()]);
    }
}
