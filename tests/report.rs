use std::fs;

use hwgrader::evaluation::{EvaluationReport, EvaluationResult, summary_table, write_evaluation_reports};

fn result(name: &str, score: u32, max_score: u32, comment: &str) -> EvaluationResult {
    EvaluationResult::new(name, score, max_score, comment)
}

#[test]
fn identical_results_count_once() {
    let report = EvaluationReport::new("repo", "https://example.com", vec![
        result("Build", 1, 1, ""),
        result("Build", 1, 1, ""),
        result("Test", 1, 1, ""),
    ]);

    assert_eq!(report.score(), 2);
    assert_eq!(report.max_score(), 2);
    assert_eq!(report.results().len(), 3);
}

#[test]
fn results_that_differ_count_separately() {
    let report = EvaluationReport::new("repo", "https://example.com", vec![
        result("Build", 2, 2, ""),
        result("Build", 0, 2, "Build: CMake failed"),
        result("Test", 1, 1, ""),
    ]);

    assert_eq!(report.score(), 3);
    assert_eq!(report.max_score(), 5);
}

#[test]
fn json_round_trips() {
    let report = EvaluationReport::new("workspace/group", "https://example.com/group", vec![
        result("Build", 1, 1, ""),
        result("Test", 0, 1, "Test: No tests were found"),
    ]);

    let json = report.to_json().unwrap();
    assert!(json.contains("\"max_score\": 2"));
    assert_eq!(EvaluationReport::from_json(&json).unwrap(), report);
}

#[test]
fn student_markdown_lists_comments_only() {
    let report = EvaluationReport::new("repo", "https://example.com", vec![
        result("Build", 1, 1, ""),
        result("Test", 0, 1, "Test: No tests were found"),
    ]);

    assert_eq!(
        report.to_student_markdown(),
        "Score: 1\n\nMax score: 2\n\n- Test: No tests were found\n"
    );
}

#[test]
fn full_markdown_embeds_json_and_feedback() {
    let report = EvaluationReport::new("repo", "https://example.com/group", vec![result(
        "Build", 0, 1, "Build: CMake failed",
    )]);
    let markdown = report.to_markdown().unwrap();

    assert!(markdown.starts_with("# Homework Evaluation Report\n\n[Repo](https://example.com/group)"));
    assert!(markdown.contains("Overall: 0/1"));
    assert!(markdown.contains("```json\n{"));
    assert!(markdown.contains("## Manual Evaluation"));
    assert!(markdown.ends_with("- Build: CMake failed\n"));
}

#[test]
fn write_creates_three_files_in_the_checkout() {
    let dir = tempfile::tempdir().unwrap();
    let report = EvaluationReport::new(dir.path(), "https://example.com", vec![result("Build", 1, 1, "")]);

    write_evaluation_reports(std::slice::from_ref(&report), "homework-1-report").unwrap();

    let json = fs::read_to_string(dir.path().join("homework-1-report.json")).unwrap();
    assert_eq!(EvaluationReport::from_json(&json).unwrap(), report);
    assert!(dir.path().join("homework-1-report.md").is_file());
    let students = fs::read_to_string(dir.path().join("homework-1-report_students.md")).unwrap();
    assert_eq!(students, "Score: 1\n\nMax score: 1\n");
}

#[test]
fn summary_table_has_a_row_per_checkout() {
    let reports = vec![
        EvaluationReport::new("workspace/alpha", "", vec![result("Build", 1, 1, "")]),
        EvaluationReport::new("workspace/beta", "", vec![result("Build", 0, 1, "")]),
    ];
    let table = summary_table(&reports);

    assert!(table.contains("Evaluation Overview"));
    assert!(table.contains("alpha"));
    assert!(table.contains("beta"));
}

#[test]
fn totals_saturate_instead_of_overflowing() {
    let report = EvaluationReport::new("repo", "", vec![
        result("Build", u32::MAX, u32::MAX, ""),
        result("Test", 1, 1, ""),
    ]);
    assert_eq!(report.score(), u32::MAX);
    assert_eq!(report.max_score(), u32::MAX);
}

#[test]
fn results_table_lists_every_job() {
    let report = EvaluationReport::new("workspace/alpha", "", vec![
        result("Build", 1, 1, ""),
        result("Test", 0, 2, "Test: No tests were found"),
    ]);
    let table = report.results_table();

    assert!(table.contains("alpha"));
    for header in ["Job", "Score", "Max", "Comment"] {
        assert!(table.contains(header));
    }
    assert!(table.contains("Test: No tests were found"));
}
