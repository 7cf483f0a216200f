//! Human-readable output of command responses.

use loctree::{
    Diagnostic, Response,
    annotate::AnnotatePlan,
    build::{BuildPlan, BuildReport},
    commands::{DiffResponse, ExportResponse, ScanResponse},
    health::HealthReport,
    import::{FileOp, FileResult, ImportPlan, ImportReport, PlannedAction},
    validate::ValidationReport,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const MAX_CELL: usize = 48;

/// Truncates `value` to `max` display columns, marking the cut with `…`.
pub fn truncate(value: &str, max: usize) -> String {
    let flat = value.replace('\n', "\\n");
    if flat.width() <= max {
        return flat;
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in flat.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn pad(value: &str, width: usize) -> String {
    let fill = width.saturating_sub(value.width());
    format!("{value}{}", " ".repeat(fill))
}

/// Column-aligned table. Widths are measured in terminal columns, so CJK and
/// Cyrillic text lines up.
#[derive(Debug, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rows
            .push(cells.into_iter().map(|c| truncate(c.as_ref(), MAX_CELL)).collect());
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.width()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.width());
                }
            }
        }

        let line = |cells: &[String]| -> String {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| pad(c, *w))
                .collect();
            padded.join("  ").trim_end().to_string()
        };

        let mut out = line(&self.headers);
        out.push('\n');
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("  "));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&line(row));
            out.push('\n');
        }
        out
    }
}

fn location(path: Option<&str>, line: Option<usize>) -> String {
    match (path, line) {
        (Some(path), Some(line)) => format!("{path}:{line}"),
        (Some(path), None) => path.to_string(),
        _ => String::new(),
    }
}

pub fn diagnostics_table(diagnostics: &[Diagnostic]) -> Table {
    let mut table = Table::new(["severity", "kind", "location", "key", "message"]);
    for d in diagnostics {
        table.row([
            d.severity.to_string(),
            format!("{:?}", d.kind),
            location(d.path.as_deref(), d.line),
            d.key.clone().unwrap_or_default(),
            d.message.clone(),
        ]);
    }
    table
}

fn action_label(action: &PlannedAction) -> String {
    match action {
        PlannedAction::Create => "create".to_string(),
        PlannedAction::Update => "update".to_string(),
        PlannedAction::Skip { reason } => format!("skip ({reason:?})").to_lowercase(),
    }
}

fn plan_table(files: &[FileOp]) -> Table {
    let mut table = Table::new(["action", "keys", "path"]);
    for op in files {
        table.row([action_label(&op.action), op.keys.to_string(), op.path.clone()]);
    }
    table
}

fn results_table(files: &[FileResult]) -> Table {
    let mut table = Table::new(["status", "action", "path", "error"]);
    for f in files {
        table.row([
            format!("{:?}", f.status).to_lowercase(),
            action_label(&f.action),
            f.path.clone(),
            f.error.clone().unwrap_or_default(),
        ]);
    }
    table
}

fn scan(r: &ScanResponse) -> String {
    let mut table = Table::new(["key", "text", "location"]);
    for unit in &r.units {
        table.row([unit.key.clone(), unit.source_text.clone(), unit.reference()]);
    }
    let mut out = table.render();
    out.push_str(&format!(
        "\n{} unit(s): {} keyed, {} def-injected\n",
        r.counts.total, r.counts.keyed, r.counts.def_injected
    ));
    out.push_str(&format!("Resolver: {}\n", r.resolver.fingerprint()));
    if !r.diagnostics.is_empty() {
        out.push('\n');
        out.push_str(&diagnostics_table(&r.diagnostics).render());
    }
    out
}

fn export(r: &ExportResponse) -> String {
    let s = &r.stats;
    let mut out = if r.template {
        format!("Wrote template {}\n", r.output.display())
    } else {
        format!("Wrote {}\n", r.output.display())
    };
    out.push_str(&format!("  Resolver: {}\n", r.resolver.fingerprint()));
    out.push_str(&format!("  Total: {}\n", s.total));
    out.push_str(&format!("  Carried: {} ({} with changed source)\n", s.carried, s.source_changed));
    out.push_str(&format!("  From memory: {} ({:.2}%)\n", s.tm_filled, s.coverage_percent));
    out.push_str(&format!("  Untranslated: {}\n", s.untranslated));
    out.push_str(&format!("  Obsolete: {}\n", s.obsolete));
    if s.timed_out {
        out.push_str("  Translation memory timed out; some references were skipped\n");
    }
    if !r.diagnostics.is_empty() {
        out.push('\n');
        out.push_str(&diagnostics_table(&r.diagnostics).render());
    }
    out
}

fn validation(r: &ValidationReport) -> String {
    let mut out = String::new();
    if !r.diagnostics.is_empty() {
        out.push_str(&diagnostics_table(&r.diagnostics).render());
        out.push('\n');
    }
    out.push_str(&format!(
        "{} unit(s) checked: {} error(s), {} warning(s)\n",
        r.units, r.errors, r.warnings
    ));
    out
}

fn health(r: &HealthReport) -> String {
    let mut table = Table::new(["category", "location", "message"]);
    for issue in &r.issues {
        table.row([
            issue.category.to_string(),
            location(Some(&issue.path), issue.line),
            issue.message.clone(),
        ]);
    }
    let mut out = String::new();
    if !table.is_empty() {
        out.push_str(&table.render());
        out.push('\n');
    }
    out.push_str(&format!("{} file(s) checked, {} issue(s)\n", r.checked, r.issues.len()));
    out
}

fn diff(r: &DiffResponse) -> String {
    let d = &r.result;
    let mut out = String::new();
    let section = |out: &mut String, title: &str, keys: &[String]| {
        out.push_str(&format!("{title} ({}):\n", keys.len()));
        for key in keys {
            out.push_str(&format!("  {key}\n"));
        }
    };
    section(&mut out, "Untranslated", &d.only_in_a);
    section(&mut out, "Stale translations", &d.only_in_b);
    out.push_str(&format!("Changed source ({}):\n", d.changed.len()));
    for c in &d.changed {
        out.push_str(&format!(
            "  {}: {} -> {}\n",
            c.key,
            truncate(&c.old_text, MAX_CELL),
            truncate(&c.new_text, MAX_CELL)
        ));
    }
    out.push_str(&format!("Unchanged: {}\n", d.unchanged));
    if d.untranslated > 0 {
        out.push_str(&format!("Untranslated in baseline: {}\n", d.untranslated));
    }
    for report in &r.reports {
        out.push_str(&format!("Wrote {}\n", report.display()));
    }
    out
}

fn import_plan(p: &ImportPlan) -> String {
    let mut out = plan_table(&p.files).render();
    let e = &p.entries;
    out.push_str(&format!(
        "\nDry run for {}: {} file write(s); {} of {} entries routed ({} obsolete, {} empty, {} unchanged source, {} invalid key)\n",
        p.language,
        p.writes().count(),
        e.imported,
        e.total,
        e.obsolete,
        e.empty,
        e.unchanged_source,
        e.invalid
    ));
    if let Some(dir) = &p.backup_dir {
        out.push_str(&format!("Backup would go to {}\n", dir.display()));
    }
    if !p.diagnostics.is_empty() {
        out.push('\n');
        out.push_str(&diagnostics_table(&p.diagnostics).render());
    }
    out
}

fn annotate_plan(p: &AnnotatePlan) -> String {
    let mut out = plan_table(&p.files).render();
    out.push_str(&format!(
        "\nDry run for {}: {} file write(s); {} comment(s) added, {} removed\n",
        p.language,
        p.files.iter().filter(|op| op.action.is_write()).count(),
        p.added,
        p.stripped
    ));
    if let Some(dir) = &p.backup_dir {
        out.push_str(&format!("Backup would go to {}\n", dir.display()));
    }
    if !p.diagnostics.is_empty() {
        out.push('\n');
        out.push_str(&diagnostics_table(&p.diagnostics).render());
    }
    out
}

fn import_report(r: &ImportReport) -> String {
    let mut out = results_table(&r.files).render();
    out.push_str(&format!(
        "\n{} created, {} updated, {} skipped, {} failed\n",
        r.created, r.updated, r.skipped, r.failed
    ));
    if let Some(dir) = &r.backup_dir {
        out.push_str(&format!("Backup: {}\n", dir.display()));
    }
    if r.cancelled {
        out.push_str("Cancelled before all files were processed\n");
    }
    out
}

fn build_plan(p: &BuildPlan) -> String {
    let mut out = plan_table(&p.files).render();
    out.push_str(&format!(
        "\nDry run: {} file(s), {} entries into {}\n",
        p.files.len(),
        p.entries,
        p.output.display()
    ));
    if !p.diagnostics.is_empty() {
        out.push('\n');
        out.push_str(&diagnostics_table(&p.diagnostics).render());
    }
    out
}

fn build_report(r: &BuildReport) -> String {
    let mut out = results_table(&r.files).render();
    out.push_str(&format!(
        "\nPackage written to {}: {} file(s), {} failed\n",
        r.output.display(),
        r.written,
        r.failed
    ));
    if r.cancelled {
        out.push_str("Cancelled before all files were written\n");
    }
    out
}

pub fn text(response: &Response) -> String {
    match response {
        Response::Scan(r) => scan(r),
        Response::ExportCatalog(r) => export(r),
        Response::Validate(r) | Response::ValidateCatalog(r) => validation(r),
        Response::XmlHealth(r) => health(r),
        Response::Diff(r) => diff(r),
        Response::ImportDry(p) | Response::InitDry(p) => import_plan(p),
        Response::ImportApply(r) | Response::InitApply(r) | Response::AnnotateApply(r) => import_report(r),
        Response::AnnotateDry(p) => annotate_plan(p),
        Response::BuildDry(p) => build_plan(p),
        Response::BuildApply(r) => build_report(r),
    }
}

/// True when the response reports problems that `--fail-on-issues` turns
/// into a failing exit code.
pub fn has_issues(response: &Response) -> bool {
    match response {
        Response::Validate(r) | Response::ValidateCatalog(r) => !r.is_clean(),
        Response::XmlHealth(r) => !r.issues.is_empty(),
        Response::ImportApply(r) | Response::InitApply(r) | Response::AnnotateApply(r) => r.failed > 0,
        Response::BuildApply(r) => r.failed > 0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_by_display_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
        assert_eq!(truncate("日本語テキスト", 7), "日本語…");
        assert_eq!(truncate("a\nb", 10), "a\\nb");
    }

    #[test]
    fn test_table_alignment() {
        let mut table = Table::new(["key", "text"]);
        table.row(["Hello", "Привет"]);
        table.row(["Hi", "日本"]);
        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "key    text");
        assert_eq!(lines[1], "-----  ------");
        assert_eq!(lines[2], "Hello  Привет");
        assert_eq!(lines[3], "Hi     日本");
    }
}
