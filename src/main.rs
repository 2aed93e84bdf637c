use std::process;

use anyhow::{bail, Result};
use batch_renamer::{
    apply_plan, build_plan, format_plan, parse_date, plan_to_json, prompt_confirm, resolve_root,
    scan_root, select_entries, AppConfig, Pattern, RenameSettings, ReplaceMode, Replacement,
};
use chrono::Local;
use clap::Parser;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "batch_renamer")]
#[command(about = "Preview and apply pattern-based renames to files and folders.")]
struct Args {
    #[arg(help = "Root folder (defaults to the last folder used)")]
    root: Option<String>,

    #[arg(
        short,
        long,
        default_value = "",
        help = "Name pattern: ### counter, ###=N counter from N, $p folder, $$p parent_folder, $YYYY $MM $DD date, * keep original name. With --replace, the text to search for."
    )]
    pattern: String,

    #[arg(long, help = "Replace PATTERN in each original name with this text instead of using it as a template.")]
    replace: Option<String>,

    #[arg(long, requires = "replace", conflicts_with = "ignore_case", help = "Treat the search text as a regular expression.")]
    regex: bool,

    #[arg(long, requires = "replace", help = "Match the search text case-insensitively.")]
    ignore_case: bool,

    #[arg(long = "only", value_name = "NAME", help = "Only process this top-level entry (repeatable).")]
    only: Vec<String>,

    #[arg(long = "exclude-ext", value_name = "EXT", help = "Skip files with this extension (repeatable).")]
    exclude_ext: Vec<String>,

    #[arg(long, default_value_t = 0, help = "Number added to every counter.")]
    start: u64,

    #[arg(long, value_name = "YYYY-MM-DD", help = "Date used for $YYYY/$MM/$DD (default: today).")]
    date: Option<String>,

    #[arg(long, help = "Include hidden entries.")]
    hidden: bool,

    #[arg(long, help = "Print the JSON plan instead of the table.")]
    json: bool,

    #[arg(short = 'y', long, help = "Apply the renames without confirmation.")]
    yes: bool,

    #[arg(long, help = "Print the plan and exit without changing files.")]
    dry_run: bool,
}

fn replacement_from(args: &Args) -> Result<Option<Replacement>> {
    let Some(replace) = args.replace.as_deref() else {
        return Ok(None);
    };
    let mode = if args.regex {
        ReplaceMode::Regex
    } else if args.ignore_case {
        ReplaceMode::IgnoreCase
    } else {
        ReplaceMode::Literal
    };
    Replacement::new(&args.pattern, replace, mode).map(Some)
}

fn run() -> Result<i32> {
    let args = Args::parse();
    let mut config = AppConfig::load();

    let root_arg = match (&args.root, &config.last_folder) {
        (Some(root), _) => root.clone(),
        (None, Some(last)) => last.display().to_string(),
        (None, None) => bail!("No folder given and no previous folder remembered."),
    };
    let root = resolve_root(&root_arg)?;

    if config.last_folder.as_deref() != Some(root.as_path()) {
        config.last_folder = Some(root.clone());
        config.save();
    }

    let now = match args.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => Local::now().date_naive(),
    };

    let exclude_exts = if args.exclude_ext.is_empty() {
        config.exclude_exts.clone()
    } else {
        args.exclude_ext.clone()
    };

    let settings = RenameSettings {
        pattern: Pattern::parse(&args.pattern),
        replacement: replacement_from(&args)?,
        exclude_exts,
        start_index: args.start,
    };
    debug!(?settings, "rename settings");

    let entries = select_entries(scan_root(&root, args.hidden)?, &args.only)?;
    let file_count: usize = entries.iter().map(|e| e.file_count()).sum();
    debug!(entries = entries.len(), files = file_count, "selection");

    let plan = build_plan(&root, &entries, &settings, now);
    if plan.is_empty() {
        println!("[SKIP] Nothing to rename.");
        return Ok(0);
    }

    if args.json {
        println!("{}", plan_to_json(&plan)?);
    } else {
        print!("{}", format_plan(&root, &plan));
    }

    if args.dry_run {
        println!("[DRY-RUN] Plan printed only. No changes were made.");
        return Ok(0);
    }

    if !args.yes && !prompt_confirm("\nApply these renames now? [y/N]: ")? {
        println!("[SKIP] Aborted by user.");
        return Ok(0);
    }

    let mut log = |line: String| println!("{line}");
    let report = apply_plan(&plan, &mut log);
    if report.is_clean() {
        Ok(0)
    } else {
        eprintln!(
            "[ERROR] {} of {} renames failed.",
            report.failures.len(),
            plan.len()
        );
        Ok(1)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("[ERROR] {err:#}");
            process::exit(2);
        }
    }
}
