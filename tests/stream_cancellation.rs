//! Streaming fetch tests against the fake remote.
//!
//! Records arrive one at a time in server order. Cancelling mid-stream stops
//! delivery immediately, stops page requests, and the completion signal
//! reports the cancellation exactly once.

mod common;

use common::{issue, FakeRemote};
use futures::StreamExt;
use gitlab_replica::error::ReplicaError;
use gitlab_replica::services::remote::{stream_group_issues, IssuesQuery};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn remote_with_issues(count: i64) -> Arc<FakeRemote> {
    let remote = Arc::new(FakeRemote::new());
    remote.with(|s| {
        s.group_issues.insert(
            7,
            (1..=count)
                .map(|n| issue(n, n, 70, "2024-01-01T00:00:00.000Z"))
                .collect(),
        );
    });
    remote
}

fn pages_requested(remote: &FakeRemote) -> usize {
    remote.state.lock().unwrap().group_issue_queries.len()
}

#[tokio::test]
async fn test_stream_delivers_in_server_order() {
    let remote = remote_with_issues(7);
    let stream = stream_group_issues(
        remote.clone(),
        7,
        IssuesQuery::all_states(None),
        3,
        CancellationToken::new(),
    );

    let ids: Vec<i64> = stream.collect_all().await.unwrap().iter().map(|i| i.id).collect();

    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(pages_requested(&remote), 3);
}

#[tokio::test]
async fn test_cancel_mid_stream_yields_nothing_further() {
    let remote = remote_with_issues(50);
    let cancel = CancellationToken::new();
    let mut stream = stream_group_issues(
        remote.clone(),
        7,
        IssuesQuery::all_states(None),
        5,
        cancel.clone(),
    );

    let mut seen = Vec::new();
    while let Some(item) = stream.next().await {
        seen.push(item.id);
        if seen.len() == 3 {
            cancel.cancel();
        }
    }

    assert_eq!(seen, vec![1, 2, 3]);
    assert!(stream.next().await.is_none());
    let outcome = stream.finish().await;
    assert!(matches!(outcome, Err(ReplicaError::Cancelled)));
    assert!(pages_requested(&remote) <= 2);
}

#[tokio::test]
async fn test_stream_page_error_reported_on_completion() {
    let remote = remote_with_issues(4);
    remote.fail("group:7");
    let mut stream = stream_group_issues(
        remote.clone(),
        7,
        IssuesQuery::all_states(None),
        2,
        CancellationToken::new(),
    );

    assert!(stream.next_item().await.is_none());
    let err = stream.finish().await.unwrap_err();
    assert!(matches!(err, ReplicaError::Transport { status_code: Some(503), .. }));
}

#[tokio::test]
async fn test_stream_passes_window_to_every_page() {
    let remote = remote_with_issues(4);
    let stream = stream_group_issues(
        remote.clone(),
        7,
        IssuesQuery::all_states(Some("2023-06-01T00:00:00Z".to_string())),
        2,
        CancellationToken::new(),
    );

    assert_eq!(stream.collect_all().await.unwrap().len(), 4);

    let queries = remote.state.lock().unwrap().group_issue_queries.clone();
    let pages: Vec<u32> = queries.iter().map(|(_, q)| q.page).collect();
    assert_eq!(pages, vec![1, 2, 3]);
    assert!(queries
        .iter()
        .all(|(g, q)| *g == 7 && q.updated_after.as_deref() == Some("2023-06-01T00:00:00Z")));
}
