// UI layer: an interactive menu on top of the Maestro client, using
// `dialoguer` for prompts and `indicatif` for the in-flight spinner.
// It only renders what the client returns; HTTP work stays in the library.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::style::Stylize;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{MaestroApi, MaestroApiClient};
use crate::error::MaestroError;
use crate::models::{FlowDirection, Subscription};
use crate::time_ago::time_ago;

/// Main interactive menu. Subscriptions fetched during the session are
/// kept in a local cache keyed by id, so searching does not refetch.
pub async fn main_menu(api: &MaestroApiClient) -> Result<()> {
    let mut cache: HashMap<Uuid, Subscription> = HashMap::new();

    loop {
        let items = vec![
            "List subscriptions",
            "Search subscriptions",
            "Show subscription",
            "Exit",
        ];
        let selection = Select::new().items(&items).default(0).interact()?;
        match selection {
            0 => {
                if refresh(api, &mut cache).await {
                    print_list(&sorted(cache.values()));
                }
            }
            1 => {
                if cache.is_empty() && !refresh(api, &mut cache).await {
                    continue;
                }
                let query: String = Input::new()
                    .with_prompt("Search (repository, branch, channel or id)")
                    .allow_empty(true)
                    .interact_text()?;
                print_list(&filter_subscriptions(cache.values(), &query));
            }
            2 => {
                let raw: String = Input::new().with_prompt("Subscription id").interact_text()?;
                let id = match Uuid::parse_str(raw.trim()) {
                    Ok(id) => id,
                    Err(_) => {
                        println!("'{}' is not a valid subscription id.", raw.trim());
                        continue;
                    }
                };
                let result = with_spinner("Loading subscription...", |cancel| async move {
                    api.subscriptions().get_subscription(id, &cancel).await
                })
                .await;
                match result {
                    Ok(subscription) => {
                        print_detail(&subscription);
                        cache.insert(subscription.id, subscription);
                    }
                    Err(e) => report(&e),
                }
            }
            3 => break,
            _ => {}
        }
    }
    Ok(())
}

// Returns false when the fetch failed; the error has been printed.
async fn refresh(api: &MaestroApiClient, cache: &mut HashMap<Uuid, Subscription>) -> bool {
    let result = with_spinner("Fetching subscriptions...", |cancel| async move {
        api.subscriptions().list_subscriptions(&cancel).await
    })
    .await;

    match result {
        Ok(subscriptions) => {
            cache.clear();
            cache.extend(subscriptions.into_iter().map(|s| (s.id, s)));
            true
        }
        Err(e) => {
            report(&e);
            false
        }
    }
}

/// Run a request with a spinner; Ctrl-C cancels it.
async fn with_spinner<T, F, Fut>(message: &'static str, request: F) -> T
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T>,
{
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = request(cancel).await;

    spinner.finish_and_clear();
    watcher.abort();
    result
}

fn report(error: &MaestroError) {
    match error {
        MaestroError::Authentication(msg) => println!("{} {}", "Authentication failed:".red(), msg),
        MaestroError::Cancelled => println!("Cancelled."),
        other => println!("{} {}", "Request failed:".red(), other),
    }
}

fn print_list(subscriptions: &[&Subscription]) {
    if subscriptions.is_empty() {
        println!("No subscriptions found.");
        return;
    }
    for subscription in subscriptions {
        let line = summary_line(subscription);
        if subscription.enabled {
            println!("{}", line);
        } else {
            println!("{}", line.dark_grey());
        }
    }
    println!("{} subscription(s)", subscriptions.len());
}

fn print_detail(subscription: &Subscription) {
    for (label, value) in detail_lines(subscription, Utc::now()) {
        println!("{:>24}  {}", label.bold(), value);
    }
}

/// Single-line rendering used in lists.
pub fn summary_line(subscription: &Subscription) -> String {
    let mut line = format!(
        "{}  {} -> {} ({}) [{}]",
        subscription.id,
        short_repo(subscription.source_repository.as_deref()),
        short_repo(subscription.target_repository.as_deref()),
        subscription.target_branch.as_deref().unwrap_or("-"),
        subscription.channel.name,
    );
    if let Some(label) = flow_label(subscription) {
        line.push_str(&format!(" <{}>", label));
    }
    if !subscription.enabled {
        line.push_str(" (disabled)");
    }
    line
}

/// Labelled fields for the detail view.
pub fn detail_lines(
    subscription: &Subscription,
    now: DateTime<Utc>,
) -> Vec<(&'static str, String)> {
    let or_dash = |v: &Option<String>| {
        v.clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "-".into())
    };

    let mut lines = vec![
        ("Id", subscription.id.to_string()),
        ("Enabled", subscription.enabled.to_string()),
        ("Source", or_dash(&subscription.source_repository)),
        ("Target", or_dash(&subscription.target_repository)),
        ("Branch", or_dash(&subscription.target_branch)),
        (
            "Channel",
            format!("{} ({})", subscription.channel.name, subscription.channel.classification),
        ),
        ("Flow", flow_label(subscription).unwrap_or("-").to_string()),
        ("Source directory", or_dash(&subscription.source_directory)),
        ("Target directory", or_dash(&subscription.target_directory)),
        (
            "Failure notifications",
            or_dash(&subscription.pull_request_failure_notification_tags),
        ),
    ];
    if !subscription.excluded_assets.is_empty() {
        lines.push(("Excluded assets", subscription.excluded_assets.join(", ")));
    }
    if let Some(build) = &subscription.last_applied_build {
        lines.push((
            "Last applied build",
            format!(
                "{} ({}, {})",
                build.azure_dev_ops_build_number.as_deref().unwrap_or("-"),
                build.id,
                time_ago(build.date_produced, now)
            ),
        ));
        if let Some(link) = build.commit_link() {
            lines.push(("Commit", link));
        }
        if let Some(link) = build.build_link() {
            lines.push(("Build", link));
        }
    }
    lines
}

/// Case-insensitive substring search over id, repositories, branch and
/// channel. An empty query matches everything. Results are sorted.
pub fn filter_subscriptions<'a>(
    subscriptions: impl IntoIterator<Item = &'a Subscription>,
    query: &str,
) -> Vec<&'a Subscription> {
    let needle = query.trim().to_lowercase();
    let matching = subscriptions.into_iter().filter(|s| {
        if needle.is_empty() {
            return true;
        }
        let id = s.id.to_string();
        let hit = [
            Some(id.as_str()),
            s.source_repository.as_deref(),
            s.target_repository.as_deref(),
            s.target_branch.as_deref(),
            Some(s.channel.name.as_str()),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle));
        hit
    });
    sorted(matching)
}

fn sorted<'a>(subscriptions: impl IntoIterator<Item = &'a Subscription>) -> Vec<&'a Subscription> {
    let mut list: Vec<_> = subscriptions.into_iter().collect();
    list.sort_by(|a, b| {
        a.source_repository
            .cmp(&b.source_repository)
            .then_with(|| a.target_repository.cmp(&b.target_repository))
            .then_with(|| a.id.cmp(&b.id))
    });
    list
}

fn flow_label(subscription: &Subscription) -> Option<&'static str> {
    subscription.flow_direction().map(|d| match d {
        FlowDirection::Backflow => "backflow",
        FlowDirection::ForwardFlow => "forward flow",
    })
}

fn short_repo(repo: Option<&str>) -> &str {
    match repo {
        Some(r) => r
            .trim_end_matches('/')
            .strip_prefix("https://github.com/")
            .unwrap_or(r),
        None => "-",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Build, Channel};

    const GH_RUNTIME: &str = "https://github.com/dotnet/runtime";
    const GH_SDK: &str = "https://github.com/dotnet/sdk";

    fn subscription(id: u128, source: &str, target: &str, channel: &str) -> Subscription {
        Subscription {
            id: Uuid::from_u128(id),
            enabled: true,
            source_enabled: false,
            source_repository: Some(source.to_string()),
            target_repository: Some(target.to_string()),
            target_branch: Some("main".to_string()),
            source_directory: None,
            target_directory: None,
            pull_request_failure_notification_tags: None,
            excluded_assets: vec![],
            channel: Channel {
                id: 1,
                name: channel.to_string(),
                classification: "product".to_string(),
            },
            last_applied_build: None,
        }
    }

    #[test]
    fn filter_matches_repository_and_channel() {
        let subs = vec![
            subscription(1, GH_RUNTIME, GH_SDK, ".NET 10"),
            subscription(2, "https://github.com/dotnet/arcade", GH_RUNTIME, ".NET Eng"),
            subscription(3, "https://github.com/dotnet/aspnetcore", GH_SDK, ".NET 9"),
        ];

        let hits = filter_subscriptions(&subs, "RUNTIME");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, Uuid::from_u128(2));

        let hits = filter_subscriptions(&subs, ".net 9");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, Uuid::from_u128(3));

        assert_eq!(filter_subscriptions(&subs, "  ").len(), 3);
    }

    #[test]
    fn filter_matches_id() {
        let subs = vec![subscription(0xabc, "a", "b", "c")];
        let id = Uuid::from_u128(0xabc).to_string();
        assert_eq!(filter_subscriptions(&subs, &id[id.len() - 6..]).len(), 1);
    }

    #[test]
    fn summary_shortens_github_urls_and_marks_flow() {
        let mut sub = subscription(1, GH_RUNTIME, "https://github.com/dotnet/dotnet", ".NET 10");
        sub.source_enabled = true;
        sub.target_directory = Some("src/runtime".into());
        sub.enabled = false;
        let line = summary_line(&sub);
        assert!(line.contains("dotnet/runtime -> dotnet/dotnet (main) [.NET 10]"));
        assert!(line.contains("<forward flow>"));
        assert!(line.ends_with("(disabled)"));
    }

    #[test]
    fn detail_includes_build_age_and_links() {
        let now = Utc::now();
        let mut sub = subscription(1, GH_RUNTIME, GH_SDK, ".NET 10");
        sub.last_applied_build = Some(Build {
            id: 42,
            commit: "abc123".into(),
            azure_dev_ops_build_number: Some("20250101.1".into()),
            date_produced: now - chrono::Duration::days(2),
            github_repository: Some("https://github.com/dotnet/runtime".into()),
            github_branch: None,
            azure_dev_ops_repository: None,
            azure_dev_ops_branch: None,
            azure_dev_ops_account: None,
            azure_dev_ops_project: None,
            azure_dev_ops_build_id: None,
        });

        let lines = detail_lines(&sub, now);
        let build = lines.iter().find(|(l, _)| *l == "Last applied build").unwrap();
        assert_eq!(build.1, "20250101.1 (42, 2 days ago)");
        assert!(lines.iter().any(|(l, v)| *l == "Commit" && v.ends_with("/commit/abc123")));
        assert!(!lines.iter().any(|(l, _)| *l == "Build"));
        assert!(lines.iter().any(|(l, v)| *l == "Flow" && v == "-"));
    }
}
