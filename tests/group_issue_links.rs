//! Group issue link tests.
//!
//! Link sync walks the groups stored in the replica, streams each group's
//! issues and replaces that group's links. It stops at the first failing
//! group and only advances the `group_issues` watermark when every group
//! succeeded.

mod common;

use common::{group, issue, setup_store, FakeRemote};
use gitlab_replica::config::SyncConfig;
use gitlab_replica::models::ResourceType;
use gitlab_replica::services::sync_events::{SyncMode, SyncState, SyncStep};
use gitlab_replica::services::sync_orchestrator::SyncOrchestrator;
use std::sync::Arc;
use std::time::Duration;

async fn orchestrator_with_groups(
    group_ids: &[i64],
) -> (tempfile::TempDir, Arc<FakeRemote>, SyncOrchestrator<FakeRemote>) {
    let (dir, store) = setup_store().await;
    let remote = Arc::new(FakeRemote::new());
    remote.with(|s| {
        s.groups = group_ids
            .iter()
            .map(|id| group(*id, &format!("g{}", id)))
            .collect();
    });
    let orchestrator = SyncOrchestrator::new(remote.clone(), store, SyncConfig::default());
    orchestrator
        .sync_resource(ResourceType::Groups)
        .await
        .unwrap();
    (dir, remote, orchestrator)
}

#[tokio::test]
async fn test_links_are_replaced_not_accumulated() {
    let (_dir, remote, orchestrator) = orchestrator_with_groups(&[1]).await;
    let store = orchestrator.store().clone();

    remote.with(|s| {
        s.group_issues.insert(
            1,
            vec![
                issue(100, 1, 10, "2024-01-01T00:00:00.000Z"),
                issue(101, 2, 10, "2024-01-01T00:00:00.000Z"),
            ],
        );
    });
    let first = orchestrator.sync_group_issue_links().await.unwrap();
    assert_eq!(first.mode, SyncMode::Full);
    assert_eq!(store.linked_issue_ids(1).await.unwrap(), vec![100, 101]);

    // Force an unfiltered refetch so the new listing is authoritative.
    sqlx::query("DELETE FROM sync_watermarks WHERE resource_type = 'group_issues'")
        .execute(store.pool())
        .await
        .unwrap();
    remote.with(|s| {
        s.group_issues.insert(
            1,
            vec![
                issue(101, 2, 10, "2024-01-01T00:00:00.000Z"),
                issue(102, 3, 10, "2024-01-01T00:00:00.000Z"),
            ],
        );
    });
    orchestrator.sync_group_issue_links().await.unwrap();

    assert_eq!(store.linked_issue_ids(1).await.unwrap(), vec![101, 102]);
    let listed = common::ids(&store.list_issues_by_group(1).await.unwrap(), |i| i.id);
    assert_eq!(listed, vec![101, 102]);
}

#[tokio::test]
async fn test_group_issues_fetched_in_all_states() {
    let (_dir, remote, orchestrator) = orchestrator_with_groups(&[1]).await;
    remote.with(|s| {
        let mut closed = issue(100, 1, 10, "2024-01-01T00:00:00.000Z");
        closed.state = "closed".to_string();
        s.group_issues.insert(1, vec![closed]);
    });

    orchestrator.sync_group_issue_links().await.unwrap();

    let queries = remote.state.lock().unwrap().group_issue_queries.clone();
    assert!(!queries.is_empty());
    assert!(queries.iter().all(|(_, q)| q.state.as_deref() == Some("all")));
    assert_eq!(orchestrator.store().get_issue(100).await.unwrap().state, "closed");
}

#[tokio::test]
async fn test_first_failing_group_aborts_pass() {
    let (_dir, remote, orchestrator) = orchestrator_with_groups(&[1, 2, 3]).await;
    let store = orchestrator.store().clone();
    remote.with(|s| {
        s.group_issues.insert(1, vec![issue(100, 1, 10, "2024-01-01T00:00:00.000Z")]);
        s.group_issues.insert(2, vec![issue(200, 1, 20, "2024-01-01T00:00:00.000Z")]);
        s.group_issues.insert(3, vec![issue(300, 1, 30, "2024-01-01T00:00:00.000Z")]);
    });
    remote.fail("group:2");

    let err = orchestrator.sync_group_issue_links().await.unwrap_err();

    assert_eq!(err.failed_step(), Some(SyncStep::GroupIssueLinks));
    assert_eq!(
        orchestrator.state().await,
        SyncState::Failed(SyncStep::GroupIssueLinks)
    );
    // Group 1 ran before the failure and stays committed.
    assert_eq!(store.linked_issue_ids(1).await.unwrap(), vec![100]);
    // Group 3 never ran.
    assert!(store.linked_issue_ids(3).await.unwrap().is_empty());
    let queried: Vec<i64> = remote
        .state
        .lock()
        .unwrap()
        .group_issue_queries
        .iter()
        .map(|(g, _)| *g)
        .collect();
    assert!(!queried.contains(&3));
    assert!(store
        .get_watermark(ResourceType::GroupIssues)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_no_stored_groups_is_noop() {
    let (_dir, store) = setup_store().await;
    let remote = Arc::new(FakeRemote::new());
    remote.with(|s| s.groups = vec![group(1, "remote-only")]);
    let orchestrator = SyncOrchestrator::new(remote.clone(), store.clone(), SyncConfig::default());

    let outcome = orchestrator.sync_group_issue_links().await.unwrap();

    assert_eq!(outcome.fetched, 0);
    assert!(remote.state.lock().unwrap().group_issue_queries.is_empty());
    assert!(store
        .get_watermark(ResourceType::GroupIssues)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_empty_incremental_window_keeps_links() {
    let (_dir, remote, orchestrator) = orchestrator_with_groups(&[1]).await;
    let store = orchestrator.store().clone();
    remote.with(|s| {
        s.group_issues.insert(1, vec![issue(100, 1, 10, "2024-01-01T00:00:00.000Z")]);
    });
    orchestrator.sync_group_issue_links().await.unwrap();
    let first = store
        .get_watermark(ResourceType::GroupIssues)
        .await
        .unwrap()
        .unwrap();

    // Nothing changed since the watermark.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let outcome = orchestrator.sync_group_issue_links().await.unwrap();

    assert_eq!(outcome.mode, SyncMode::Incremental);
    assert_eq!(store.linked_issue_ids(1).await.unwrap(), vec![100]);
    let second = store
        .get_watermark(ResourceType::GroupIssues)
        .await
        .unwrap()
        .unwrap();
    assert!(second.last_synced_at > first.last_synced_at);

    let queries = remote.state.lock().unwrap().group_issue_queries.clone();
    assert!(queries.last().unwrap().1.updated_after.is_some());
}

#[tokio::test]
async fn test_unfiltered_empty_listing_clears_links() {
    let (_dir, remote, orchestrator) = orchestrator_with_groups(&[1]).await;
    let store = orchestrator.store().clone();
    remote.with(|s| {
        s.group_issues.insert(1, vec![issue(100, 1, 10, "2024-01-01T00:00:00.000Z")]);
    });
    orchestrator.sync_group_issue_links().await.unwrap();

    sqlx::query("DELETE FROM sync_watermarks WHERE resource_type = 'group_issues'")
        .execute(store.pool())
        .await
        .unwrap();
    remote.with(|s| {
        s.group_issues.remove(&1);
    });
    orchestrator.sync_group_issue_links().await.unwrap();

    assert!(store.linked_issue_ids(1).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_stops_link_sync() {
    let (_dir, remote, orchestrator) = orchestrator_with_groups(&[1, 2, 3, 4]).await;
    let store = orchestrator.store().clone();
    remote.with(|s| {
        for g in 1..=4 {
            s.group_issues
                .insert(g, vec![issue(g * 100, 1, g, "2024-01-01T00:00:00.000Z")]);
        }
        s.group_page_delay = Some(Duration::from_millis(200));
    });
    let orchestrator = Arc::new(orchestrator);

    let running = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.sync_group_issue_links().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.cancel().await;

    let err = running.await.unwrap().unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.failed_step(), Some(SyncStep::GroupIssueLinks));
    assert!(store
        .get_watermark(ResourceType::GroupIssues)
        .await
        .unwrap()
        .is_none());
    // Cancelled while the first group's page was in flight.
    for g in 1..=4 {
        assert!(store.linked_issue_ids(g).await.unwrap().is_empty());
    }
}
