// Wire models returned by the Maestro API. Field names follow the
// camelCase JSON the service emits; nullable strings are `Option`s so a
// missing or `null` value deserializes cleanly. Required strings and lists
// read `null` as empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A channel builds are published to (e.g. ".NET 9").
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub classification: String,
}

/// A build registered in the build asset registry (BAR).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    /// BAR ID.
    pub id: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub commit: String,
    #[serde(default)]
    pub azure_dev_ops_build_number: Option<String>,
    pub date_produced: DateTime<Utc>,
    #[serde(default, rename = "gitHubRepository")]
    pub github_repository: Option<String>,
    #[serde(default, rename = "gitHubBranch")]
    pub github_branch: Option<String>,
    #[serde(default)]
    pub azure_dev_ops_repository: Option<String>,
    #[serde(default)]
    pub azure_dev_ops_branch: Option<String>,
    #[serde(default)]
    pub azure_dev_ops_account: Option<String>,
    #[serde(default)]
    pub azure_dev_ops_project: Option<String>,
    #[serde(default)]
    pub azure_dev_ops_build_id: Option<i64>,
}

impl Build {
    /// Repository the build was produced from, GitHub first.
    pub fn repository(&self) -> Option<&str> {
        non_empty(&self.github_repository).or_else(|| non_empty(&self.azure_dev_ops_repository))
    }

    /// Link to the Azure DevOps build results page, when the build carries
    /// enough information to construct it.
    pub fn build_link(&self) -> Option<String> {
        let account = non_empty(&self.azure_dev_ops_account)?;
        let project = non_empty(&self.azure_dev_ops_project)?;
        let build_id = self.azure_dev_ops_build_id?;
        Some(format!(
            "https://dev.azure.com/{}/{}/_build/results?buildId={}",
            account, project, build_id
        ))
    }

    /// Link to the commit on GitHub.
    pub fn commit_link(&self) -> Option<String> {
        let repo = non_empty(&self.github_repository)?;
        if self.commit.is_empty() {
            return None;
        }
        Some(format!("{}/commit/{}", repo.trim_end_matches('/'), self.commit))
    }
}

/// Which way code moves for a source-enabled subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    Backflow,
    ForwardFlow,
}

/// A Maestro subscription: flows builds of `source_repository` published
/// to `channel` into `target_branch` of `target_repository`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub enabled: bool,
    pub source_enabled: bool,
    #[serde(default)]
    pub source_repository: Option<String>,
    #[serde(default)]
    pub target_repository: Option<String>,
    #[serde(default)]
    pub target_branch: Option<String>,
    #[serde(default)]
    pub source_directory: Option<String>,
    #[serde(default)]
    pub target_directory: Option<String>,
    #[serde(default)]
    pub pull_request_failure_notification_tags: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub excluded_assets: Vec<String>,
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_build: Option<Build>,
}

impl Subscription {
    pub fn is_backflow(&self) -> bool {
        self.source_enabled && non_empty(&self.source_directory).is_some()
    }

    pub fn is_forward_flow(&self) -> bool {
        self.source_enabled && non_empty(&self.target_directory).is_some()
    }

    /// Backflow wins when both directories are populated; the server does
    /// not forbid that combination.
    pub fn flow_direction(&self) -> Option<FlowDirection> {
        if self.is_backflow() {
            Some(FlowDirection::Backflow)
        } else if self.is_forward_flow() {
            Some(FlowDirection::ForwardFlow)
        } else {
            None
        }
    }
}

/// Structured failure payload sent by the server with non-2xx responses.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
    #[serde(default, alias = "Errors")]
    pub errors: Vec<String>,
}

// `null` on the wire reads as the empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subscription_json() -> serde_json::Value {
        json!({
            "id": "6c1a5c1e-8a0e-4f8b-9d3a-0a7d8e2f4b11",
            "enabled": true,
            "sourceEnabled": true,
            "sourceRepository": "https://github.com/dotnet/runtime",
            "targetRepository": "https://github.com/dotnet/dotnet",
            "targetBranch": "main",
            "sourceDirectory": null,
            "targetDirectory": "src/runtime",
            "pullRequestFailureNotificationTags": "@dotnet/runtime-infra",
            "excludedAssets": ["Microsoft.NETCore.App.Ref", "*.symbols"],
            "channel": { "id": 8, "name": ".NET 10", "classification": "product" },
            "lastAppliedBuild": {
                "id": 254711,
                "commit": "4f2c0a1",
                "azureDevOpsBuildNumber": "20250101.3",
                "dateProduced": "2025-01-01T10:30:00Z",
                "gitHubRepository": "https://github.com/dotnet/runtime",
                "azureDevOpsAccount": "dnceng",
                "azureDevOpsProject": "internal",
                "azureDevOpsBuildId": 2600001
            }
        })
    }

    #[test]
    fn null_collections_and_channel_fields_read_as_empty() {
        let mut nulls = subscription_json();
        nulls["excludedAssets"] = serde_json::Value::Null;
        nulls["channel"]["name"] = serde_json::Value::Null;
        nulls["channel"]["classification"] = serde_json::Value::Null;
        nulls["lastAppliedBuild"]["commit"] = serde_json::Value::Null;

        let list: Vec<Subscription> =
            serde_json::from_value(json!([subscription_json(), nulls])).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[1].excluded_assets.is_empty());
        assert_eq!(list[1].channel.name, "");
        assert_eq!(list[1].channel.classification, "");
        assert_eq!(list[1].last_applied_build.as_ref().map(|b| b.commit.as_str()), Some(""));
        assert_eq!(list[0].channel.classification, "product");
    }

    #[test]
    fn subscription_deserializes_from_camel_case() {
        let sub: Subscription = serde_json::from_value(subscription_json()).unwrap();
        assert_eq!(sub.target_branch.as_deref(), Some("main"));
        assert_eq!(sub.channel.name, ".NET 10");
        assert_eq!(sub.excluded_assets.len(), 2);
        assert!(sub.source_directory.is_none());
        assert_eq!(sub.last_applied_build.as_ref().map(|b| b.id), Some(254711));
    }

    #[test]
    fn subscription_round_trips_through_json() {
        let sub: Subscription = serde_json::from_value(subscription_json()).unwrap();
        let text = serde_json::to_string(&sub).unwrap();
        let back: Subscription = serde_json::from_str(&text).unwrap();
        assert_eq!(sub, back);
    }

    #[test]
    fn flow_predicates_follow_directory_fields() {
        let mut sub: Subscription = serde_json::from_value(subscription_json()).unwrap();
        assert!(sub.is_forward_flow());
        assert!(!sub.is_backflow());
        assert_eq!(sub.flow_direction(), Some(FlowDirection::ForwardFlow));

        sub.source_directory = Some("runtime".into());
        assert!(sub.is_backflow());
        assert!(sub.is_forward_flow());
        assert_eq!(sub.flow_direction(), Some(FlowDirection::Backflow));

        sub.source_enabled = false;
        assert_eq!(sub.flow_direction(), None);
    }

    #[test]
    fn empty_directory_is_not_a_flow() {
        let mut sub: Subscription = serde_json::from_value(subscription_json()).unwrap();
        sub.target_directory = Some(String::new());
        assert!(!sub.is_forward_flow());
    }

    #[test]
    fn build_links() {
        let sub: Subscription = serde_json::from_value(subscription_json()).unwrap();
        let build = sub.last_applied_build.unwrap();
        assert_eq!(build.repository(), Some("https://github.com/dotnet/runtime"));
        assert_eq!(
            build.build_link().as_deref(),
            Some("https://dev.azure.com/dnceng/internal/_build/results?buildId=2600001")
        );
        assert_eq!(
            build.commit_link().as_deref(),
            Some("https://github.com/dotnet/runtime/commit/4f2c0a1")
        );
    }

    #[test]
    fn api_error_accepts_either_casing() {
        let lower: ApiError =
            serde_json::from_str(r#"{"message":"nope","errors":["a","b"]}"#).unwrap();
        let upper: ApiError =
            serde_json::from_str(r#"{"Message":"nope","Errors":["a","b"]}"#).unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.errors, vec!["a".to_string(), "b".to_string()]);
    }
}
