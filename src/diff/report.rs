#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use super::DiffReport;

/// File listing checkouts without activity, written once per batch.
pub const INACTIVE_SUMMARY: &str = "inactive_student_repos.md";

/// Quotes a CSV field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Escapes text for HTML element content and attribute values.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// CSS class of one patch line.
fn line_class(line: &str) -> &'static str {
    if line.starts_with("+++") || line.starts_with("---") {
        "file"
    } else if line.starts_with("diff ")
        || line.starts_with("index ")
        || line.starts_with("new file")
        || line.starts_with("deleted file")
        || line.starts_with("similarity")
        || line.starts_with("rename ")
        || line.starts_with("old mode")
        || line.starts_with("new mode")
    {
        "header"
    } else if line.starts_with("@@") {
        "hunk"
    } else if line.starts_with('+') {
        "add"
    } else if line.starts_with('-') {
        "del"
    } else {
        "ctx"
    }
}

/// Stylesheet embedded in every HTML rendering.
const HTML_STYLE: &str = "body { background: #fcfcfc; margin: 0; }
pre { font-family: monospace; font-size: 13px; margin: 0; padding: 1em; }
.line { display: block; white-space: pre; }
.header { color: #000; font-weight: bold; }
.file { color: #800080; font-weight: bold; }
.hunk { color: #000080; background: #e6e6fa; }
.add { color: #00a000; background: #e6ffe6; }
.del { color: #a00000; background: #ffe6e6; }
.ctx { color: #333; }";

/// Renders a unified patch as a standalone HTML page.
pub fn render_html(patch: &str) -> String {
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n{HTML_STYLE}\n</style>\n</head>\n<body>\n<pre>"
    );
    for line in patch.lines() {
        let _ = writeln!(
            html,
            "<span class=\"line {}\">{}</span>",
            line_class(line),
            escape_html(line)
        );
    }
    html.push_str("</pre>\n</body>\n</html>\n");
    html
}

impl DiffReport {
    /// Overview table: row index, hash, author and message of every diff.
    pub fn overview_csv(&self) -> String {
        let mut csv = String::from(",hexsha,author,message\n");
        for (index, diff) in self.diffs.iter().enumerate() {
            let _ = writeln!(
                csv,
                "{index},{},{},{}",
                csv_field(&diff.hexsha),
                csv_field(&diff.author),
                csv_field(&diff.message)
            );
        }
        csv
    }

    /// Writes `{N}-{hash}.patch` and `{N}-{hash}.html` for every diff.
    pub fn write_patches(&self) -> Result<()> {
        for (index, diff) in self.diffs.iter().enumerate() {
            let base = self.repo_path.join(format!("{index}-{}", diff.hexsha));
            write_file(&base.with_extension("patch"), &diff.patch)?;
            write_file(&base.with_extension("html"), &render_html(&diff.patch))?;
        }
        Ok(())
    }

    /// Writes the overview and all patches.
    pub fn write(&self, base_name: &str) -> Result<()> {
        write_file(&self.repo_path.join(format!("{base_name}.csv")), &self.overview_csv())?;
        self.write_patches()
    }
}

/// Writes `contents` to `path`.
fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

/// Writes every report.
pub fn write_diff_reports(reports: &[DiffReport], base_name: &str) -> Result<()> {
    for report in reports {
        report.write(base_name)?;
        info!("Wrote {} diffs to {}", report.diffs.len(), report.repo_path.display());
    }
    Ok(())
}

/// Lists the checkouts without activity since `since` in
/// [`INACTIVE_SUMMARY`] inside `workspace` and returns the file written.
pub fn write_inactive_summary(
    reports: &[DiffReport],
    workspace: &Path,
    since: NaiveDate,
) -> Result<PathBuf> {
    let inactive: Vec<&DiffReport> = reports.iter().filter(|report| !report.has_diffs()).collect();

    let mut markdown = String::from("# Inactive Student Repos\n\n");
    if inactive.is_empty() {
        let _ = writeln!(markdown, "Every repository has commits since {since}.");
    } else {
        let _ = writeln!(markdown, "No commits since {since}:\n");
        for report in &inactive {
            let _ = writeln!(markdown, "- {}", report.repo_path.display());
        }
    }

    fs::create_dir_all(workspace)
        .with_context(|| format!("Failed to create {}", workspace.display()))?;
    let path = workspace.join(INACTIVE_SUMMARY);
    write_file(&path, &markdown)?;
    info!("{} of {} repositories inactive since {since}", inactive.len(), reports.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Diff;

    #[test]
    fn csv_quotes_only_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("fix, again"), "\"fix, again\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn html_escapes_and_classifies_lines() {
        let html = render_html("diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a<b\n+a&b\n c\n");
        assert!(html.contains("<span class=\"line header\">diff --git a/x b/x</span>"));
        assert!(html.contains("<span class=\"line file\">--- a/x</span>"));
        assert!(html.contains("<span class=\"line hunk\">@@ -1 +1 @@</span>"));
        assert!(html.contains("<span class=\"line del\">-a&lt;b</span>"));
        assert!(html.contains("<span class=\"line add\">+a&amp;b</span>"));
        assert!(html.contains("<span class=\"line ctx\"> c</span>"));
    }

    #[test]
    fn overview_has_an_index_column() {
        let report = DiffReport::new("repo", vec![Diff {
            hexsha:  "abc".into(),
            author:  "total".into(),
            message: "Initial, commit".into(),
            patch:   String::new(),
        }]);
        assert_eq!(report.overview_csv(), ",hexsha,author,message\n0,abc,total,\"Initial, commit\"\n");
    }
}
