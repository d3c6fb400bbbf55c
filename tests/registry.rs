mod support;

use std::{fs, path::Path, sync::Arc};

use hwgrader::{
    Settings,
    evaluation::{
        CheckContext, GraphError, JobDefinitionFile, Registry, RegistryError, StaticRegistry,
    },
};
use support::FakeForge;

fn context_with_forge() -> CheckContext {
    CheckContext::new(Settings::default()).with_forge(Arc::new(FakeForge::default()))
}

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn default_catalog_maps_both_assignments() {
    let registry = StaticRegistry::default_catalog(&context_with_forge()).unwrap();
    assert_eq!(registry.assignments(), vec![1, 2]);

    let first = registry.plan(1).unwrap();
    assert_eq!(first.root_names(), vec!["Clean Repo Check", "CMake Build"]);

    let second = registry.plan(2).unwrap();
    assert_eq!(second.root_names(), vec!["CMake Build", "Make Test", "CI Status Check"]);
}

#[test]
fn unknown_assignments_are_an_error() {
    let registry = StaticRegistry::default_catalog(&context_with_forge()).unwrap();
    assert!(matches!(registry.plan(3), Err(RegistryError::UnknownAssignment(3))));
}

#[test]
fn default_catalog_needs_a_forge() {
    let err = StaticRegistry::default_catalog(&CheckContext::new(Settings::default()))
        .err()
        .unwrap();
    assert!(matches!(err, RegistryError::Check { ref job, .. } if job == "CI Status Check"));
}

#[test]
fn definition_file_builds_plans() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "jobs.toml", r#"
        [jobs.build]
        check = "cmake-build"

        [jobs.tests]
        check = "make-test"
        weight = 2
        depends_on = ["build"]

        [jobs.docs]
        check = "command"
        name = "Doxygen"
        command = "doxygen Doxyfile"

        [assignments]
        1 = ["build"]
        4 = ["tests", "docs"]
    "#);

    let registry = JobDefinitionFile::load(&path)
        .unwrap()
        .into_registry(&CheckContext::new(Settings::default()))
        .unwrap();
    assert_eq!(registry.assignments(), vec![1, 4]);

    let plan = registry.plan(4).unwrap();
    assert_eq!(plan.root_names(), vec!["Make Test", "Doxygen"]);
    assert_eq!(plan.graph().len(), 3);

    let tests = plan.graph().spec(plan.roots()[0]).unwrap();
    assert_eq!(tests.weight(), 2);
    assert_eq!(tests.depends_on().len(), 1);
}

#[test]
fn unreachable_jobs_are_not_instantiated() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "jobs.toml", r#"
        [jobs.ci]
        check = "ci-status"

        [jobs.oop]
        check = "oop"

        [assignments]
        1 = ["oop"]
    "#);

    // Building the CI job would fail without a forge.
    let registry = JobDefinitionFile::load(&path)
        .unwrap()
        .into_registry(&CheckContext::new(Settings::default()))
        .unwrap();
    assert_eq!(registry.plan(1).unwrap().graph().len(), 1);
}

#[test]
fn includes_resolve_relative_to_the_including_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("shared")).unwrap();
    write(&dir.path().join("shared"), "common.toml", r#"
        [jobs.clean]
        check = "clean-repo"
        max_source_files = 20

        [assignments]
        1 = ["clean"]
    "#);
    let path = write(dir.path(), "jobs.toml", r#"
        include = ["shared/common.toml"]

        [jobs.format]
        check = "clang-format"

        [assignments]
        1 = ["clean", "format"]
    "#);

    let definitions = JobDefinitionFile::load(&path).unwrap();
    assert_eq!(definitions.assignments(), vec![1]);
    let registry = definitions
        .into_registry(&CheckContext::new(Settings::default()))
        .unwrap();
    assert_eq!(registry.plan(1).unwrap().root_names(), vec!["Clean Repo Check", "Clang Format Check"]);
}

#[test]
fn duplicate_jobs_across_includes_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "common.toml", r#"
        [jobs.build]
        check = "cmake-build"
    "#);
    let path = write(dir.path(), "jobs.toml", r#"
        include = ["common.toml"]

        [jobs.build]
        check = "cmake-build"

        [assignments]
        1 = ["build"]
    "#);

    let err = JobDefinitionFile::load(&path).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateJob(ref id) if id == "build"));
}

#[test]
fn files_without_assignments_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "jobs.toml", r#"
        [jobs.build]
        check = "cmake-build"
    "#);

    assert!(matches!(
        JobDefinitionFile::load(&path),
        Err(RegistryError::NoAssignments { .. })
    ));
}

#[test]
fn non_numeric_assignments_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "jobs.toml", r#"
        [jobs.build]
        check = "cmake-build"

        [assignments]
        first = ["build"]
    "#);

    assert!(matches!(
        JobDefinitionFile::load(&path),
        Err(RegistryError::InvalidAssignment { ref key, .. }) if key == "first"
    ));
}

#[test]
fn unknown_check_kinds_fail_to_parse() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "jobs.toml", r#"
        [jobs.lint]
        check = "pylint"

        [assignments]
        1 = ["lint"]
    "#);

    assert!(matches!(JobDefinitionFile::load(&path), Err(RegistryError::Parse { .. })));
}

#[test]
fn missing_files_fail_to_read() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        JobDefinitionFile::load(&dir.path().join("missing.toml")),
        Err(RegistryError::Read { .. })
    ));
}

#[test]
fn dangling_references_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "jobs.toml", r#"
        [jobs.tests]
        check = "make-test"
        depends_on = ["compile"]

        [assignments]
        1 = ["tests"]
    "#);

    let err = JobDefinitionFile::load(&path)
        .unwrap()
        .into_registry(&CheckContext::new(Settings::default()))
        .err()
        .unwrap();
    assert!(matches!(err, RegistryError::UnknownJob { ref reference, .. } if reference == "compile"));
}

#[test]
fn dependency_cycles_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "jobs.toml", r#"
        [jobs.a]
        check = "oop"
        depends_on = ["b"]

        [jobs.b]
        check = "oop"
        depends_on = ["a"]

        [assignments]
        1 = ["a"]
    "#);

    let err = JobDefinitionFile::load(&path)
        .unwrap()
        .into_registry(&CheckContext::new(Settings::default()))
        .err()
        .unwrap();
    assert!(matches!(err, RegistryError::Cycle(_)));
}

#[test]
fn commands_need_a_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "jobs.toml", r#"
        [jobs.docs]
        check = "command"
        command = "true"

        [assignments]
        1 = ["docs"]
    "#);

    let err = JobDefinitionFile::load(&path)
        .unwrap()
        .into_registry(&CheckContext::new(Settings::default()))
        .err()
        .unwrap();
    assert!(matches!(err, RegistryError::MissingName(ref id) if id == "docs"));
}

#[test]
fn misspelled_parameters_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "jobs.toml", r#"
        [jobs.coverage]
        check = "code-coverage"
        min_coverge = 50

        [assignments]
        1 = ["coverage"]
    "#);

    let err = JobDefinitionFile::load(&path).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::UnknownParameter { ref job, ref key, .. } if job == "coverage" && key == "min_coverge"
    ));
}

#[test]
fn parameters_of_other_kinds_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "jobs.toml", r#"
        [jobs.build]
        check = "cmake-build"
        branch = "main"

        [assignments]
        1 = ["build"]
    "#);

    let err = JobDefinitionFile::load(&path).unwrap_err();
    assert!(matches!(err, RegistryError::UnknownParameter { ref key, .. } if key == "branch"));
}

#[test]
fn scores_that_cannot_be_represented_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "jobs.toml", r#"
        [jobs.oop]
        check = "oop"
        weight = 4294967295
        max_run_score = 2

        [assignments]
        1 = ["oop"]
    "#);

    let err = JobDefinitionFile::load(&path)
        .unwrap()
        .into_registry(&CheckContext::new(Settings::default()))
        .err()
        .unwrap();
    assert!(matches!(err, RegistryError::Graph(GraphError::ScoreOverflow(ref name)) if name == "OOP Check"));
}
