use std::{
    fmt, fs,
    io::{self, Write},
    path::{Component, Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use natord::compare_ignore_case;
use serde::Serialize;
use tracing::{debug, warn};

pub mod config;
pub mod pattern;

pub use config::AppConfig;
pub use pattern::{
    generate_name, parse_date, split_extension, NameContext, Pattern, RenameRequest, ReplaceMode,
    Replacement, Token,
};

const RULE_WIDTH: usize = 98;

/// A top-level item under the root folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Directory with at least one file; its files are renamed inside it.
    Folder { name: String, files: Vec<String> },
    /// File, or directory without files, renamed in place under the root.
    Loose { name: String },
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Folder { name, .. } | Entry::Loose { name } => name,
        }
    }

    pub fn file_count(&self) -> usize {
        match self {
            Entry::Folder { files, .. } => files.len(),
            Entry::Loose { .. } => 1,
        }
    }
}

/// One planned rename: `folder/old_name` -> `folder/new_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameResult {
    pub folder: PathBuf,
    pub old_name: String,
    pub new_name: String,
}

impl RenameResult {
    pub fn source(&self) -> PathBuf {
        self.folder.join(&self.old_name)
    }

    pub fn target(&self) -> PathBuf {
        self.folder.join(&self.new_name)
    }

    pub fn is_unchanged(&self) -> bool {
        self.old_name == self.new_name
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenameSettings {
    pub pattern: Pattern,
    pub replacement: Option<Replacement>,
    /// Extensions (without dot, any case) left out of the plan.
    pub exclude_exts: Vec<String>,
    pub start_index: u64,
}

impl RenameSettings {
    pub fn is_excluded(&self, name: &str) -> bool {
        let ext = split_extension(name).1.trim_start_matches('.');
        !ext.is_empty()
            && self
                .exclude_exts
                .iter()
                .any(|x| x.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    SourceMissing,
    TargetExists,
    /// New name is empty, `.`/`..`, absolute, or contains a separator.
    InvalidName,
    OsRenameDenied(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::SourceMissing => f.write_str("source file does not exist"),
            FailureKind::TargetExists => f.write_str("target already exists"),
            FailureKind::InvalidName => f.write_str("new name is not a plain file name"),
            FailureKind::OsRenameDenied(reason) => write!(f, "rename denied: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameFailure {
    pub rename: RenameResult,
    pub kind: FailureKind,
}

impl fmt::Display for RenameFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: {}",
            self.rename.source().display(),
            self.rename.new_name,
            self.kind
        )
    }
}

impl std::error::Error for RenameFailure {}

#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub renamed: usize,
    pub unchanged: usize,
    pub failures: Vec<RenameFailure>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "renamed {}, unchanged {}, failed {}",
            self.renamed,
            self.unchanged,
            self.failures.len()
        )
    }
}

pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn file_name_text(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let suffix = path.strip_prefix("~/").unwrap_or("");
            return home.join(suffix);
        }
    }
    PathBuf::from(path)
}

pub fn resolve_root(path: &str) -> Result<PathBuf> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        bail!("Folder path is empty.");
    }

    let resolved = expand_tilde(trimmed)
        .canonicalize()
        .with_context(|| format!("failed to resolve path: {trimmed}"))?;

    if !resolved.is_dir() {
        bail!("Not a valid folder: {}", resolved.display());
    }

    Ok(resolved)
}

fn list_names(dir: &Path, include_hidden: bool) -> Result<Vec<(String, bool)>> {
    let mut names = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !include_hidden && is_hidden(&name) {
            continue;
        }
        let is_dir = entry.path().is_dir();
        names.push((name, is_dir));
    }
    names.sort_by(|a, b| compare_ignore_case(&a.0, &b.0));
    Ok(names)
}

pub fn scan_root(root: &Path, include_hidden: bool) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for (name, is_dir) in list_names(root, include_hidden)? {
        if !is_dir {
            entries.push(Entry::Loose { name });
            continue;
        }

        let files: Vec<String> = list_names(&root.join(&name), include_hidden)?
            .into_iter()
            .filter(|(_, is_dir)| !is_dir)
            .map(|(name, _)| name)
            .collect();

        if files.is_empty() {
            entries.push(Entry::Loose { name });
        } else {
            entries.push(Entry::Folder { name, files });
        }
    }
    debug!(root = %root.display(), count = entries.len(), "scanned root");
    Ok(entries)
}

/// Keeps the entries named in `only`, in listing order. Empty `only` keeps all.
pub fn select_entries(entries: Vec<Entry>, only: &[String]) -> Result<Vec<Entry>> {
    if only.is_empty() {
        return Ok(entries);
    }
    for wanted in only {
        if !entries.iter().any(|e| e.name() == wanted) {
            bail!("No such entry in folder: {wanted}");
        }
    }
    Ok(entries
        .into_iter()
        .filter(|e| only.iter().any(|w| w == e.name()))
        .collect())
}

fn plan_one(
    settings: &RenameSettings,
    folder: &Path,
    original_name: &str,
    folder_name: &str,
    parent_folder_name: &str,
    index: usize,
    now: NaiveDate,
) -> RenameResult {
    let new_name = generate_name(&RenameRequest {
        original_name,
        pattern: &settings.pattern,
        replacement: settings.replacement.as_ref(),
        folder_name,
        parent_folder_name,
        index: (index as u64).saturating_add(settings.start_index),
        now,
    });
    RenameResult {
        folder: folder.to_path_buf(),
        old_name: original_name.to_string(),
        new_name,
    }
}

pub fn build_plan(
    root: &Path,
    entries: &[Entry],
    settings: &RenameSettings,
    now: NaiveDate,
) -> Vec<RenameResult> {
    let root_name = file_name_text(root);
    let root_parent_name = root.parent().map(file_name_text).unwrap_or_default();
    let mut plan = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        match entry {
            Entry::Folder { name, files } => {
                let folder = root.join(name);
                for (j, file) in files.iter().enumerate() {
                    if settings.is_excluded(file) {
                        continue;
                    }
                    plan.push(plan_one(settings, &folder, file, name, &root_name, j, now));
                }
            }
            Entry::Loose { name } => {
                if settings.is_excluded(name) {
                    continue;
                }
                plan.push(plan_one(
                    settings,
                    root,
                    name,
                    &root_name,
                    &root_parent_name,
                    i,
                    now,
                ));
            }
        }
    }

    plan
}

pub fn format_plan(root: &Path, plan: &[RenameResult]) -> String {
    let mut out = String::new();
    let changed = plan.iter().filter(|r| !r.is_unchanged()).count();

    out.push('\n');
    out.push_str(&"=".repeat(RULE_WIDTH));
    out.push('\n');
    out.push_str(&format!("[PLAN] Root folder: {}\n", root.display()));
    out.push_str(&format!("[PLAN] Files in plan: {}\n", plan.len()));
    out.push_str(&format!("[PLAN] Names changing: {changed}\n"));
    out.push_str(&"=".repeat(RULE_WIDTH));
    out.push('\n');

    let mut current: Option<&Path> = None;
    for (n, rename) in plan.iter().enumerate() {
        if current != Some(rename.folder.as_path()) {
            out.push('\n');
            out.push_str(&format!("  [DIR] {}\n", rename.folder.display()));
            current = Some(rename.folder.as_path());
        }
        if rename.is_unchanged() {
            out.push_str(&format!("  {:>4}. {}  (unchanged)\n", n + 1, rename.old_name));
        } else {
            out.push_str(&format!(
                "  {:>4}. {} -> {}\n",
                n + 1,
                rename.old_name,
                rename.new_name
            ));
        }
    }

    out.push('\n');
    out.push_str(&"=".repeat(RULE_WIDTH));
    out.push('\n');

    out
}

pub fn plan_to_json(plan: &[RenameResult]) -> Result<String> {
    serde_json::to_string_pretty(plan).context("failed to encode plan as JSON")
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}

/// True for case-only renames where the "existing" target is the source itself,
/// as on case-insensitive filesystems.
fn target_is_source(rename: &RenameResult) -> bool {
    if rename.old_name == rename.new_name
        || rename.old_name.to_lowercase() != rename.new_name.to_lowercase()
    {
        return false;
    }
    let Ok(dir) = fs::read_dir(&rename.folder) else {
        return false;
    };
    !dir.filter_map(|entry| entry.ok())
        .any(|entry| entry.file_name().to_string_lossy() == rename.new_name)
}

fn rename_file(rename: &RenameResult) -> std::result::Result<(), FailureKind> {
    if !is_plain_name(&rename.new_name) {
        return Err(FailureKind::InvalidName);
    }

    let src = rename.source();
    let dst = rename.target();

    if fs::symlink_metadata(&src).is_err() {
        return Err(FailureKind::SourceMissing);
    }
    if fs::symlink_metadata(&dst).is_ok() && !target_is_source(rename) {
        return Err(FailureKind::TargetExists);
    }

    fs::rename(&src, &dst).map_err(|err| FailureKind::OsRenameDenied(err.to_string()))
}

/// Applies every rename in order. A failed rename is recorded and the batch continues.
pub fn apply_plan(plan: &[RenameResult], log: &mut dyn FnMut(String)) -> ApplyReport {
    let mut report = ApplyReport::default();
    let total = plan.len();

    for (i, rename) in plan.iter().enumerate() {
        if rename.is_unchanged() {
            report.unchanged += 1;
            continue;
        }

        log(format!(
            "[RENAME] ({}/{}) {} -> {}",
            i + 1,
            total,
            rename.source().display(),
            rename.new_name
        ));

        match rename_file(rename) {
            Ok(()) => report.renamed += 1,
            Err(kind) => {
                let failure = RenameFailure {
                    rename: rename.clone(),
                    kind,
                };
                warn!(%failure, "rename failed");
                log(format!("[FAIL] {failure}"));
                report.failures.push(failure);
            }
        }
    }

    log(format!("[COMPLETE] {}", report.summary()));
    report
}

pub fn prompt_confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    io::stdout().flush().context("failed to flush stdout")?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("failed to read user input")?;

    let answer = input.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}
