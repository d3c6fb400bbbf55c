mod support;

use std::{fs, path::Path};

use chrono::NaiveDate;
use git2::Repository;
use hwgrader::diff::{
    Diff, DiffCreator, DiffReport, TOTAL_AUTHOR, create_diffs, write_diff_reports,
    write_inactive_summary,
};
use support::{commit_at, noon};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Commits on March 1st, 5th and 7th; the last one also touches the build
/// folder.
fn history() -> (tempfile::TempDir, Vec<String>) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let first = commit_at(&repo, &[("main.cpp", "int main() {}\n")], "Initial commit", noon(2024, 3, 1));
    let second = commit_at(&repo, &[("list.cpp", "struct Node;\n")], "Add list", noon(2024, 3, 5));
    let third = commit_at(
        &repo,
        &[("list.cpp", "class Node;\n"), ("hw_build/log.txt", "built\n")],
        "Use a class",
        noon(2024, 3, 7),
    );
    let hashes = [first, second, third].iter().map(|oid| oid.to_string()).collect();
    (dir, hashes)
}

#[test]
fn no_since_date_means_no_diffs() {
    let (dir, _) = history();
    let reports = create_diffs(&[dir.path().to_path_buf()], None, None, None).unwrap();
    assert!(reports.is_empty());
}

#[test]
fn total_diff_comes_first_then_newest_commit() {
    let (dir, hashes) = history();
    let report = DiffCreator::new(dir.path(), None).create(date(2024, 3, 4), None).unwrap();

    let diffs = report.diffs();
    assert_eq!(diffs.len(), 3);

    assert!(diffs[0].is_total());
    assert_eq!(diffs[0].hexsha, hashes[1]);
    assert_eq!(diffs[0].message, "Add list");
    assert!(diffs[0].patch.contains("+class Node;"));
    assert!(diffs[0].patch.contains("-struct Node;"));

    assert_eq!(diffs[1].hexsha, hashes[2]);
    assert_eq!(diffs[1].author, "Student");
    assert_eq!(diffs[1].message, "Use a class");
    assert_eq!(diffs[2].hexsha, hashes[1]);
    assert!(diffs[2].patch.contains("+struct Node;"));
}

#[test]
fn until_limits_the_commit_range() {
    let (dir, hashes) = history();
    let report = DiffCreator::new(dir.path(), None)
        .create(date(2024, 3, 4), Some(date(2024, 3, 5)))
        .unwrap();

    let hexshas: Vec<&str> = report.diffs().iter().map(|diff| diff.hexsha.as_str()).collect();
    assert_eq!(hexshas, vec![hashes[1].as_str(), hashes[1].as_str()]);
    assert_eq!(report.diffs()[0].author, TOTAL_AUTHOR);
}

#[test]
fn root_commit_only_yields_the_total_diff() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let root = commit_at(&repo, &[("main.cpp", "int main() {}\n")], "Initial commit", noon(2024, 3, 1));

    let report = DiffCreator::new(dir.path(), None).create(date(2024, 3, 1), None).unwrap();
    assert_eq!(report.diffs().len(), 1);
    assert!(report.diffs()[0].is_total());
    assert_eq!(report.diffs()[0].hexsha, root.to_string());
}

#[test]
fn quiet_checkouts_have_no_diffs() {
    let (dir, _) = history();
    let report = DiffCreator::new(dir.path(), None).create(date(2024, 4, 1), None).unwrap();
    assert!(!report.has_diffs());
}

#[test]
fn excluded_folder_is_left_out_of_the_total_diff() {
    let (dir, _) = history();
    let report = DiffCreator::new(dir.path(), Some("hw_build".into()))
        .create(date(2024, 3, 4), None)
        .unwrap();

    assert!(!report.diffs()[0].patch.contains("hw_build"));
    assert!(report.diffs()[0].patch.contains("list.cpp"));
    assert!(report.diffs()[1].patch.contains("hw_build/log.txt"));
}

#[test]
fn write_creates_overview_and_patches() {
    let (dir, hashes) = history();
    let reports = create_diffs(
        &[dir.path().to_path_buf()],
        Some(date(2024, 3, 6)),
        None,
        Some(Path::new("hw_build")),
    )
    .unwrap();
    write_diff_reports(&reports, "homework-2-diff").unwrap();

    let csv = fs::read_to_string(dir.path().join("homework-2-diff.csv")).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some(",hexsha,author,message"));
    assert_eq!(lines.next(), Some(format!("0,{},total,Use a class", hashes[2]).as_str()));
    assert_eq!(lines.next(), Some(format!("1,{},Student,Use a class", hashes[2]).as_str()));

    for index in 0..2 {
        let base = dir.path().join(format!("{index}-{}", hashes[2]));
        assert!(base.with_extension("patch").is_file());
        let html = fs::read_to_string(base.with_extension("html")).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
    }
}

#[test]
fn inactive_summary_lists_checkouts_without_diffs() {
    let workspace = tempfile::tempdir().unwrap();
    let reports = vec![
        DiffReport::new("workspace/idle-group", Vec::new()),
        DiffReport::new("workspace/busy-group", vec![Diff {
            hexsha:  "abc".into(),
            author:  TOTAL_AUTHOR.into(),
            message: "Work".into(),
            patch:   String::new(),
        }]),
    ];

    let path = write_inactive_summary(&reports, workspace.path(), date(2024, 3, 4)).unwrap();
    let summary = fs::read_to_string(path).unwrap();
    assert!(summary.contains("idle-group"));
    assert!(!summary.contains("busy-group"));
}
