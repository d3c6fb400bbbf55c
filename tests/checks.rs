mod support;

use std::{collections::HashMap, fs, sync::Arc, time::Duration};

use hwgrader::{
    Settings,
    evaluation::{
        Check, CheckError, CheckOutcome,
        checks::{CiStatusCheck, CleanRepoCheck, CommandCheck, OopCheck},
    },
};
use support::{FakeForge, checkout};

fn ci_check(forge: FakeForge) -> CiStatusCheck {
    let projects = HashMap::from([("group-1".to_string(), 11)]);
    CiStatusCheck::new(Arc::new(forge), projects, "master")
}

#[tokio::test]
async fn ci_passes_when_the_latest_pipeline_succeeded() {
    let dir = tempfile::tempdir().unwrap();
    let forge = FakeForge::default()
        .with_pipeline(11, "success")
        .with_pipeline(11, "failed");

    let outcome = ci_check(forge).execute(&checkout(&dir.path().join("group-1"))).await.unwrap();
    assert_eq!(outcome, CheckOutcome::passed());
}

#[tokio::test]
async fn ci_fails_with_the_latest_status() {
    let dir = tempfile::tempdir().unwrap();
    let forge = FakeForge::default()
        .with_pipeline(11, "failed")
        .with_pipeline(11, "success");

    let outcome = ci_check(forge).execute(&checkout(&dir.path().join("group-1"))).await.unwrap();
    assert_eq!(outcome, CheckOutcome::failed("Latest pipeline on master has status failed"));
}

#[tokio::test]
async fn ci_fails_without_pipelines() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = ci_check(FakeForge::default())
        .execute(&checkout(&dir.path().join("group-1")))
        .await
        .unwrap();
    assert_eq!(outcome, CheckOutcome::failed("No pipelines found"));
}

#[tokio::test]
async fn ci_raises_for_unknown_checkouts_and_forge_errors() {
    let dir = tempfile::tempdir().unwrap();

    let err = ci_check(FakeForge::default())
        .execute(&checkout(&dir.path().join("group-2")))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckError::MissingProject(ref name) if name == "group-2"));

    let err = ci_check(FakeForge::default().failing_for(11))
        .execute(&checkout(&dir.path().join("group-1")))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckError::Forge(_)));
}

#[tokio::test]
async fn clean_repo_allows_up_to_the_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.cpp", "b.hpp", "c.c", "README.md", "notes.txt"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    let checkout = checkout(dir.path());

    let at_ceiling = CleanRepoCheck::new(Settings::default(), 3);
    assert_eq!(at_ceiling.execute(&checkout).await.unwrap(), CheckOutcome::passed());

    let below = CleanRepoCheck::new(Settings::default(), 2);
    assert_eq!(
        below.execute(&checkout).await.unwrap(),
        CheckOutcome::failed("Committed too many third party source files")
    );
}

#[tokio::test]
async fn clean_repo_ignores_the_build_folder() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("hw_build/CMakeFiles")).unwrap();
    fs::write(dir.path().join("hw_build/CMakeCache.txt"), "").unwrap();
    fs::write(dir.path().join("main.cpp"), "").unwrap();

    let check = CleanRepoCheck::new(Settings::default(), 100);
    assert_eq!(check.execute(&checkout(dir.path())).await.unwrap(), CheckOutcome::passed());
}

#[tokio::test]
async fn oop_check_flags_structs() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("list.hpp"), "class List {};\n").unwrap();
    let check = OopCheck::new(Settings::default());
    assert_eq!(check.execute(&checkout(dir.path())).await.unwrap().score, 1);

    fs::write(dir.path().join("node.hpp"), "#pragma once\n\nstruct Node { int value; };\n").unwrap();
    assert_eq!(check.execute(&checkout(dir.path())).await.unwrap().score, 0);
}

#[tokio::test]
async fn command_check_follows_the_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout(dir.path());

    let passing = CommandCheck::new(Settings::default(), "test -d .");
    assert_eq!(passing.execute(&checkout).await.unwrap(), CheckOutcome::passed());

    let failing = CommandCheck::new(Settings::default(), "exit 3");
    let outcome = failing.execute(&checkout).await.unwrap();
    assert_eq!(outcome.score, 0);
    assert!(outcome.comment.unwrap().starts_with("`exit 3` exited with"));
}

#[tokio::test]
async fn command_check_runs_in_the_checkout() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Doxyfile"), "").unwrap();

    let check = CommandCheck::new(Settings::default(), "test -f Doxyfile");
    assert_eq!(check.execute(&checkout(dir.path())).await.unwrap(), CheckOutcome::passed());
}

#[tokio::test]
async fn command_check_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::default().with_command_timeout(Some(Duration::from_millis(100)));

    let check = CommandCheck::new(settings, "sleep 5");
    let outcome = check.execute(&checkout(dir.path())).await.unwrap();
    assert_eq!(outcome, CheckOutcome::failed("`sh` timed out"));
}
