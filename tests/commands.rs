mod support;

use std::fs;

use hwgrader::{RepoEntry, commands, forge::IssueState};
use support::FakeForge;

fn entries() -> Vec<RepoEntry> {
    vec![
        RepoEntry {
            name: "group-1".into(),
            id:   11,
        },
        RepoEntry {
            name: "group-2".into(),
            id:   12,
        },
        RepoEntry {
            name: "group-3".into(),
            id:   13,
        },
    ]
}

#[tokio::test]
async fn comment_posts_and_changes_state_everywhere() {
    let forge = FakeForge::default();
    commands::comment(&forge, &entries(), 4, "Graded", Some(IssueState::Close))
        .await
        .unwrap();

    let notes = forge.notes.lock().unwrap();
    assert_eq!(notes.len(), 3);
    assert_eq!(notes[0], (11, 4, "Graded".to_string()));
    let changes = forge.state_changes.lock().unwrap();
    assert_eq!(changes.last(), Some(&(13, 4, IssueState::Close)));
}

#[tokio::test]
async fn comment_keeps_going_after_a_failure() {
    let forge = FakeForge::default().failing_for(12);
    let err = commands::comment(&forge, &entries(), 4, "Graded", None)
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("group-2"));
    let notes = forge.notes.lock().unwrap();
    let projects: Vec<u64> = notes.iter().map(|(project, ..)| *project).collect();
    assert_eq!(projects, vec![11, 13]);
    assert!(forge.state_changes.lock().unwrap().is_empty());
}

#[test]
fn messages_can_come_from_markdown_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feedback.md");
    fs::write(&path, "# Feedback\n\nWell done.\n").unwrap();

    let message = commands::resolve_message(path.to_str().unwrap()).unwrap();
    assert_eq!(message, "# Feedback\n\nWell done.\n");
    assert_eq!(commands::resolve_message("Please rebase").unwrap(), "Please rebase");
}

#[tokio::test]
async fn comment_all_reads_the_repository_list() {
    let dir = tempfile::tempdir().unwrap();
    let repos = dir.path().join("repos.json");
    fs::write(&repos, r#"[{"name": "group-1", "id": 11}]"#).unwrap();

    let forge = FakeForge::default();
    commands::comment_all(&forge, &repos, 2, "Reopened", Some(IssueState::Reopen))
        .await
        .unwrap();
    assert_eq!(forge.state_changes.lock().unwrap().as_slice(), &[(11, 2, IssueState::Reopen)]);
}
