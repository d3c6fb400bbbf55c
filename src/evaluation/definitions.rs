//! Job definitions loaded at run time.
//!
//! A definition file is TOML:
//!
//! ```toml
//! include = ["common.toml"]
//!
//! [jobs.build]
//! check = "cmake-build"
//!
//! [jobs.tests]
//! check = "make-test"
//! weight = 2
//! depends_on = ["build"]
//!
//! [jobs.docs]
//! check = "command"
//! name = "Doxygen"
//! command = "doxygen Doxyfile"
//!
//! [assignments]
//! 1 = ["build"]
//! 2 = ["tests", "docs"]
//! ```
//!
//! Includes resolve relative to the including file and are merged before it,
//! so a file can override the assignments of the files it includes. A job
//! that leaves `depends_on` unset gets the prerequisite its kind implies
//! (`make-test` a build, `code-coverage` a debug build).

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use itertools::Itertools;
use serde::Deserialize;
use tracing::{debug, info};

use super::{
    checks::{CheckContext, CheckSpec},
    job::{JobGraph, JobId, JobSpec},
    registry::{RegistryError, StaticRegistry},
};

/// Keys every `[jobs.<id>]` table may set, whatever its kind.
const COMMON_KEYS: [&str; 5] = ["check", "name", "weight", "max_run_score", "depends_on"];

/// Serde default for weights and caps.
fn one() -> u32 {
    1
}

/// One `[jobs.<id>]` table.
#[derive(Debug, Clone, Deserialize)]
struct RawJob {
    /// Display name; defaults to the name of the check kind.
    name:          Option<String>,
    /// Score multiplier.
    #[serde(default = "one")]
    weight:        u32,
    /// Raw score cap.
    #[serde(default = "one")]
    max_run_score: u32,
    /// Explicit prerequisites; `None` means the kind's implicit one.
    depends_on:    Option<Vec<String>>,
    /// Kind and parameters.
    #[serde(flatten)]
    check:         CheckSpec,
}

/// The contents of one file.
#[derive(Debug, Deserialize)]
struct RawFile {
    /// Sibling files merged before this one.
    #[serde(default)]
    include:     Vec<PathBuf>,
    /// Job id to definition, kept as tables until the keys are checked.
    #[serde(default)]
    jobs:        BTreeMap<String, toml::Table>,
    /// Assignment number (as a string key) to root job ids.
    #[serde(default)]
    assignments: BTreeMap<String, Vec<String>>,
}

/// A job after defaults and implicit prerequisites were applied.
#[derive(Debug, Clone)]
struct ResolvedJob {
    /// Display name.
    name:          String,
    /// Score multiplier.
    weight:        u32,
    /// Raw score cap.
    max_run_score: u32,
    /// Prerequisite job ids, in order.
    depends_on:    Vec<String>,
    /// Kind and parameters.
    check:         CheckSpec,
}

/// A parsed job definition file with all includes merged.
#[derive(Debug, Clone)]
pub struct JobDefinitionFile {
    /// The file that was loaded.
    path:        PathBuf,
    /// Job id to definition.
    jobs:        BTreeMap<String, RawJob>,
    /// Assignment number to root job ids.
    assignments: BTreeMap<u32, Vec<String>>,
}

/// Parses one job table, rejecting keys its kind does not know.
fn parse_job(path: &Path, id: &str, table: toml::Table) -> Result<RawJob, RegistryError> {
    let unknown: Vec<String> = table.keys().cloned().collect();
    let job: RawJob = toml::Value::Table(table)
        .try_into()
        .map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let parameters = job.check.parameters();
    if let Some(key) = unknown
        .into_iter()
        .find(|key| !COMMON_KEYS.contains(&key.as_str()) && !parameters.contains(&key.as_str()))
    {
        return Err(RegistryError::UnknownParameter {
            path: path.to_path_buf(),
            job: id.to_string(),
            key,
        });
    }
    Ok(job)
}

impl JobDefinitionFile {
    /// Loads `path` and everything it includes.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let mut definitions = Self {
            path:        path.to_path_buf(),
            jobs:        BTreeMap::new(),
            assignments: BTreeMap::new(),
        };
        let mut visited = HashSet::new();
        definitions.merge_file(path, &mut visited)?;

        if definitions.assignments.is_empty() {
            return Err(RegistryError::NoAssignments {
                path: path.to_path_buf(),
            });
        }
        info!(
            "Loaded {} jobs for assignments {} from {}",
            definitions.jobs.len(),
            definitions.assignments.keys().join(", "),
            path.display()
        );
        Ok(definitions)
    }

    /// Merges one file, its includes first. Files already merged are skipped,
    /// which also breaks include loops.
    fn merge_file(&mut self, path: &Path, visited: &mut HashSet<PathBuf>) -> Result<(), RegistryError> {
        let read_error = |source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        };
        let canonical = fs::canonicalize(path).map_err(read_error)?;
        if !visited.insert(canonical) {
            debug!("Skipping {} which was already included", path.display());
            return Ok(());
        }

        let contents = fs::read_to_string(path).map_err(read_error)?;
        let raw: RawFile = toml::from_str(&contents).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let folder = path.parent().unwrap_or(Path::new("."));
        for include in &raw.include {
            self.merge_file(&folder.join(include), visited)?;
        }

        for (id, table) in raw.jobs {
            if self.jobs.contains_key(&id) {
                return Err(RegistryError::DuplicateJob(id));
            }
            let job = parse_job(path, &id, table)?;
            self.jobs.insert(id, job);
        }

        for (key, roots) in raw.assignments {
            let number = key
                .trim()
                .parse::<u32>()
                .map_err(|_| RegistryError::InvalidAssignment {
                    path: path.to_path_buf(),
                    key:  key.clone(),
                })?;
            self.assignments.insert(number, roots);
        }

        Ok(())
    }

    /// The file that was loaded.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Assignment numbers defined, ascending.
    pub fn assignments(&self) -> Vec<u32> {
        self.assignments.keys().copied().collect()
    }

    /// Applies names, defaults and implicit prerequisites.
    fn resolve(&self) -> Result<BTreeMap<String, ResolvedJob>, RegistryError> {
        let mut resolved = BTreeMap::new();
        let mut implied = BTreeMap::new();

        for (id, job) in &self.jobs {
            let depends_on = match (&job.depends_on, job.check.implicit_prerequisite()) {
                (Some(explicit), _) => explicit.clone(),
                (None, Some((builtin, check))) => {
                    if !self.jobs.contains_key(builtin) {
                        implied.insert(builtin.to_string(), check);
                    }
                    vec![builtin.to_string()]
                }
                (None, None) => Vec::new(),
            };
            let name = job
                .name
                .clone()
                .or_else(|| job.check.default_name().map(str::to_string))
                .ok_or_else(|| RegistryError::MissingName(id.clone()))?;

            resolved.insert(id.clone(), ResolvedJob {
                name,
                weight: job.weight,
                max_run_score: job.max_run_score,
                depends_on,
                check: job.check.clone(),
            });
        }

        for (id, check) in implied {
            let name = check.default_name().unwrap_or(id.as_str()).to_string();
            resolved.insert(id, ResolvedJob {
                name,
                weight: 1,
                max_run_score: 1,
                depends_on: Vec::new(),
                check,
            });
        }

        for (id, job) in &resolved {
            if let Some(missing) = job.depends_on.iter().find(|dep| !resolved.contains_key(*dep)) {
                return Err(RegistryError::UnknownJob {
                    reference: missing.clone(),
                    by:        format!("job `{id}`"),
                });
            }
        }
        for (number, roots) in &self.assignments {
            if let Some(missing) = roots.iter().find(|root| !resolved.contains_key(*root)) {
                return Err(RegistryError::UnknownJob {
                    reference: missing.clone(),
                    by:        format!("assignment {number}"),
                });
            }
        }

        Ok(resolved)
    }

    /// Builds a registry, instantiating only the jobs some assignment reaches.
    pub fn into_registry(self, context: &CheckContext) -> Result<StaticRegistry, RegistryError> {
        let resolved = self.resolve()?;
        let order = topological_order(&resolved)?;

        let mut reachable = BTreeSet::new();
        let mut pending: Vec<&String> = self.assignments.values().flatten().collect();
        while let Some(id) = pending.pop() {
            if reachable.insert(id.clone()) {
                pending.extend(&resolved[id].depends_on);
            }
        }

        let mut graph = JobGraph::new();
        let mut ids: HashMap<&str, JobId> = HashMap::new();
        for id in order.iter().filter(|id| reachable.contains(*id)) {
            let job = &resolved[id];
            let depends_on = job.depends_on.iter().map(|dep| ids[dep.as_str()]).collect();
            let spec = JobSpec::builder()
                .name(job.name.clone())
                .weight(job.weight)
                .max_run_score(job.max_run_score)
                .depends_on(depends_on)
                .build();
            let check = job.check.build(context).map_err(|source| RegistryError::Check {
                job: id.clone(),
                source,
            })?;
            ids.insert(id.as_str(), graph.add_shared(spec, check)?);
        }

        let assignments = self
            .assignments
            .iter()
            .map(|(number, roots)| (*number, roots.iter().map(|root| ids[root.as_str()]).collect()))
            .collect();

        Ok(StaticRegistry::from_parts(Arc::new(graph), assignments))
    }
}

/// Orders jobs so that every job comes after its prerequisites.
fn topological_order(jobs: &BTreeMap<String, ResolvedJob>) -> Result<Vec<String>, RegistryError> {
    /// Visit state of a job.
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        /// On the current path.
        Visiting,
        /// Emitted.
        Done,
    }

    /// Depth-first post-order visit.
    fn visit<'a>(
        id: &'a str,
        jobs: &'a BTreeMap<String, ResolvedJob>,
        marks: &mut HashMap<&'a str, Mark>,
        order: &mut Vec<String>,
    ) -> Result<(), RegistryError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(RegistryError::Cycle(id.to_string())),
            None => {}
        }

        marks.insert(id, Mark::Visiting);
        for dependency in &jobs[id].depends_on {
            visit(dependency, jobs, marks, order)?;
        }
        marks.insert(id, Mark::Done);
        order.push(id.to_string());
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut order = Vec::with_capacity(jobs.len());
    for id in jobs.keys() {
        visit(id, jobs, &mut marks, &mut order)?;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn implicit_build_is_added_for_tests() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "jobs.toml", r#"
            [jobs.tests]
            check = "make-test"

            [assignments]
            1 = ["tests"]
        "#);

        let resolved = JobDefinitionFile::load(&path).unwrap().resolve().unwrap();
        assert_eq!(resolved["tests"].depends_on, vec!["builtin-cmake-build".to_string()]);
        assert_eq!(resolved["builtin-cmake-build"].name, "CMake Build");
    }

    #[test]
    fn explicit_empty_dependencies_disable_the_implicit_build() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "jobs.toml", r#"
            [jobs.coverage]
            check = "code-coverage"
            min_coverage = 50
            depends_on = []

            [assignments]
            1 = ["coverage"]
        "#);

        let definitions = JobDefinitionFile::load(&path).unwrap();
        let resolved = definitions.resolve().unwrap();
        assert!(resolved["coverage"].depends_on.is_empty());
        assert_eq!(resolved["coverage"].check, CheckSpec::CodeCoverage { min_coverage: 50 });
        assert!(!resolved.contains_key("builtin-cmake-build-debug"));
    }

    #[test]
    fn topological_order_puts_prerequisites_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "jobs.toml", r#"
            [jobs.a]
            check = "oop"
            depends_on = ["b"]

            [jobs.b]
            check = "clean-repo"
            depends_on = ["c"]

            [jobs.c]
            check = "clang-format"

            [assignments]
            1 = ["a"]
        "#);

        let resolved = JobDefinitionFile::load(&path).unwrap().resolve().unwrap();
        assert_eq!(topological_order(&resolved).unwrap(), vec!["c", "b", "a"]);
    }
}
