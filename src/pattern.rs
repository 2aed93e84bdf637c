//! Pattern engine: turns a user template into a new file name.
//!
//! Supported tokens:
//!
//! - `###` counter, zero-padded to the run length
//! - `###=10` counter starting at 10
//! - `$p` folder name, `$$p` / `$$P` parent and folder joined with `_`
//! - `$YYYY`, `$MM`, `$DD` (or lowercase) date parts
//! - `*` keeps the whole original name instead of only its extension
//!
//! The template is parsed once into [`Token`]s and rendered in a single pass,
//! so substituted text is never scanned again.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(#+)(?:=(\d+))?|\$\$[pP]|\$p|\$(?:YYYY|yyyy)|\$(?:MM|mm)|\$(?:DD|dd)|\*")
        .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Counter { width: usize, start: u64 },
    Folder,
    ParentAndFolder,
    Year,
    Month,
    Day,
    KeepOriginal,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pattern {
    tokens: Vec<Token>,
}

/// Values a pattern is rendered against, one per file.
#[derive(Debug, Clone, Copy)]
pub struct NameContext<'a> {
    pub original_name: &'a str,
    pub folder_name: &'a str,
    pub parent_folder_name: &'a str,
    pub index: u64,
    pub now: NaiveDate,
}

impl Pattern {
    pub fn parse(template: &str) -> Self {
        let mut tokens = Vec::new();
        let mut last = 0;

        for caps in TOKEN_RE.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if whole.start() > last {
                push_literal(&mut tokens, &template[last..whole.start()]);
            }
            last = whole.end();

            let text = whole.as_str();
            let token = if let Some(hashes) = caps.get(1) {
                let start = match caps.get(2) {
                    Some(digits) => match digits.as_str().parse::<u64>() {
                        Ok(n) => n,
                        // Too large to count from; keep the text as typed.
                        Err(_) => {
                            push_literal(&mut tokens, text);
                            continue;
                        }
                    },
                    None => 0,
                };
                Token::Counter {
                    width: hashes.as_str().len(),
                    start,
                }
            } else {
                match text {
                    "$$p" | "$$P" => Token::ParentAndFolder,
                    "$p" => Token::Folder,
                    "$YYYY" | "$yyyy" => Token::Year,
                    "$MM" | "$mm" => Token::Month,
                    "$DD" | "$dd" => Token::Day,
                    "*" => Token::KeepOriginal,
                    other => Token::Literal(other.to_string()),
                }
            };
            tokens.push(token);
        }

        if last < template.len() {
            push_literal(&mut tokens, &template[last..]);
        }

        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn keeps_original(&self) -> bool {
        self.tokens.contains(&Token::KeepOriginal)
    }

    /// Renders the pattern. An empty pattern yields the original name.
    pub fn render(&self, ctx: &NameContext<'_>) -> String {
        if self.is_empty() {
            return ctx.original_name.to_string();
        }

        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Counter { width, start } => {
                    let value = ctx.index.saturating_add(*start);
                    out.push_str(&format!("{value:0width$}", width = *width));
                }
                Token::Folder => out.push_str(ctx.folder_name),
                Token::ParentAndFolder => {
                    out.push_str(ctx.parent_folder_name);
                    out.push('_');
                    out.push_str(ctx.folder_name);
                }
                Token::Year => out.push_str(&format!("{:04}", ctx.now.year())),
                Token::Month => out.push_str(&format!("{:02}", ctx.now.month())),
                Token::Day => out.push_str(&format!("{:02}", ctx.now.day())),
                Token::KeepOriginal => {}
            }
        }

        if self.keeps_original() {
            out.push_str(ctx.original_name);
        } else {
            out.push_str(split_extension(ctx.original_name).1);
        }
        out
    }
}

fn push_literal(tokens: &mut Vec<Token>, text: &str) {
    if let Some(Token::Literal(prev)) = tokens.last_mut() {
        prev.push_str(text);
    } else {
        tokens.push(Token::Literal(text.to_string()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceMode {
    #[default]
    Literal,
    IgnoreCase,
    Regex,
}

/// Find/replace applied to the original name instead of a template.
#[derive(Debug, Clone)]
pub struct Replacement {
    search: String,
    replace: String,
    mode: ReplaceMode,
    matcher: Option<Regex>,
}

impl Replacement {
    pub fn new(search: &str, replace: &str, mode: ReplaceMode) -> Result<Self> {
        let matcher = match mode {
            ReplaceMode::Literal => None,
            _ if search.is_empty() => None,
            ReplaceMode::IgnoreCase => Some(
                Regex::new(&format!("(?i){}", regex::escape(search)))
                    .context("failed to build case-insensitive matcher")?,
            ),
            ReplaceMode::Regex => Some(
                Regex::new(search).with_context(|| format!("invalid regex: {search}"))?,
            ),
        };

        Ok(Self {
            search: search.to_string(),
            replace: replace.to_string(),
            mode,
            matcher,
        })
    }

    pub fn literal(search: &str, replace: &str) -> Self {
        Self {
            search: search.to_string(),
            replace: replace.to_string(),
            mode: ReplaceMode::Literal,
            matcher: None,
        }
    }

    pub fn apply(&self, name: &str) -> String {
        if self.search.is_empty() {
            return name.to_string();
        }
        match (&self.matcher, self.mode) {
            (Some(re), ReplaceMode::Regex) => {
                re.replace_all(name, self.replace.as_str()).into_owned()
            }
            (Some(re), _) => re.replace_all(name, NoExpand(self.replace.as_str())).into_owned(),
            (None, _) => name.replace(&self.search, &self.replace),
        }
    }
}

/// Everything needed to name one file.
#[derive(Debug, Clone, Copy)]
pub struct RenameRequest<'a> {
    pub original_name: &'a str,
    pub pattern: &'a Pattern,
    pub replacement: Option<&'a Replacement>,
    pub folder_name: &'a str,
    pub parent_folder_name: &'a str,
    pub index: u64,
    pub now: NaiveDate,
}

pub fn generate_name(request: &RenameRequest<'_>) -> String {
    if let Some(replacement) = request.replacement {
        return replacement.apply(request.original_name);
    }

    request.pattern.render(&NameContext {
        original_name: request.original_name,
        folder_name: request.folder_name,
        parent_folder_name: request.parent_folder_name,
        index: request.index,
        now: request.now,
    })
}

/// Splits `name` into stem and extension the way `a.tar.gz` -> (`a.tar`, `.gz`).
/// Leading dots never start an extension, so `.bashrc` has none.
pub fn split_extension(name: &str) -> (&str, &str) {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name[leading..].rfind('.') {
        Some(pos) => name.split_at(leading + pos),
        None => (name, ""),
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("Date is empty.");
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .with_context(|| format!("invalid date (expected YYYY-MM-DD): {trimmed}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).expect("valid date")
    }

    fn name_for(original: &str, pattern: &str, parent: &str, folder: &str, index: u64) -> String {
        let pattern = Pattern::parse(pattern);
        generate_name(&RenameRequest {
            original_name: original,
            pattern: &pattern,
            replacement: None,
            folder_name: folder,
            parent_folder_name: parent,
            index,
            now: day(),
        })
    }

    #[test]
    fn empty_pattern_is_identity() {
        for (name, index) in [("a.jpg", 0), ("IMG 001.JPG", 7), (".hidden", 3), ("noext", 99)] {
            let once = name_for(name, "", "p", "f", index);
            assert_eq!(once, name);
            assert_eq!(name_for(&once, "", "p", "f", index), name);
        }
    }

    #[test]
    fn counter_pads_to_run_length() {
        assert_eq!(name_for("a.jpg", "###", "", "", 5), "005.jpg");
        assert_eq!(name_for("a.jpg", "img_#", "", "", 0), "img_0.jpg");
    }

    #[test]
    fn counter_overflows_padding_without_truncation() {
        assert_eq!(name_for("a.jpg", "##", "", "", 1234), "1234.jpg");
    }

    #[test]
    fn counter_with_start_number() {
        assert_eq!(name_for("a.png", "###=10", "", "", 2), "012.png");
        assert_eq!(name_for("a.png", "x_##=1_y", "", "", 0), "x_01_y.png");
    }

    #[test]
    fn equals_without_digits_stays_literal() {
        assert_eq!(name_for("a.png", "##=x", "", "", 3), "03=x.png");
    }

    #[test]
    fn each_hash_run_is_its_own_counter() {
        assert_eq!(name_for("a.txt", "#-###", "", "", 4), "4-004.txt");
    }

    #[test]
    fn folder_token_with_star_keeps_original() {
        assert_eq!(name_for("a.jpg", "$p_*", "", "Photos", 0), "Photos_a.jpg");
    }

    #[test]
    fn parent_and_folder_token() {
        assert_eq!(name_for("a.jpg", "$$p_img", "2024", "Jan", 0), "2024_Jan_img.jpg");
        assert_eq!(name_for("a.jpg", "$$P", "2024", "Jan", 0), "2024_Jan.jpg");
    }

    #[test]
    fn empty_folder_names_substitute_as_empty() {
        assert_eq!(name_for("a.jpg", "$$p-$p", "", "", 0), "_-.jpg");
    }

    #[test]
    fn date_tokens_use_now() {
        assert_eq!(name_for("a.jpg", "$YYYY$MM$DD_#", "", "", 1), "20240307_1.jpg");
        assert_eq!(name_for("a.jpg", "$yyyy-$mm-$dd", "", "", 0), "2024-03-07.jpg");
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        assert_eq!(name_for("a.jpg", "$p_##", "", "#$p", 3), "#$p_03.jpg");
    }

    #[test]
    fn unknown_dollar_sequences_pass_through() {
        assert_eq!(name_for("a.jpg", "$x$$q", "", "f", 0), "$x$$q.jpg");
    }

    #[test]
    fn extension_follows_splitext_rules() {
        assert_eq!(split_extension("a.tar.gz"), ("a.tar", ".gz"));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
        assert_eq!(split_extension("..x.y"), ("..x", ".y"));
        assert_eq!(split_extension("noext"), ("noext", ""));
        assert_eq!(name_for(".bashrc", "cfg", "", "", 0), "cfg");
    }

    #[test]
    fn replacement_overrides_pattern() {
        let pattern = Pattern::parse("###");
        let replacement = Replacement::literal("IMG", "PIC");
        let name = generate_name(&RenameRequest {
            original_name: "IMG001.jpg",
            pattern: &pattern,
            replacement: Some(&replacement),
            folder_name: "f",
            parent_folder_name: "p",
            index: 9,
            now: day(),
        });
        assert_eq!(name, "PIC001.jpg");
    }

    #[test]
    fn empty_search_leaves_name_alone() {
        let replacement = Replacement::literal("", "x");
        assert_eq!(replacement.apply("abc.jpg"), "abc.jpg");
    }

    #[test]
    fn ignore_case_replacement_is_literal() {
        let replacement =
            Replacement::new("img.", "pic$1-", ReplaceMode::IgnoreCase).expect("valid matcher");
        assert_eq!(replacement.apply("IMG.001.Img.jpg"), "pic$1-001.pic$1-jpg");
        assert_eq!(replacement.apply("imgX"), "imgX");
    }

    #[test]
    fn regex_replacement_expands_groups() {
        let replacement =
            Replacement::new(r"^(\d+)_(\w+)", "${2}_$1", ReplaceMode::Regex).expect("valid regex");
        assert_eq!(replacement.apply("001_cat.jpg"), "cat_001.jpg");
    }

    #[test]
    fn invalid_regex_is_rejected_up_front() {
        assert!(Replacement::new("(", "x", ReplaceMode::Regex).is_err());
    }

    #[test]
    fn parse_keeps_unknown_sequences_in_literal() {
        let pattern = Pattern::parse("a$xb#");
        assert_eq!(
            pattern.tokens(),
            &[
                Token::Literal("a$xb".to_string()),
                Token::Counter { width: 1, start: 0 }
            ]
        );
    }

    #[test]
    fn oversized_start_number_stays_literal() {
        let pattern = Pattern::parse("v#=99999999999999999999999");
        assert_eq!(
            pattern.tokens(),
            &[Token::Literal("v#=99999999999999999999999".to_string())]
        );
    }

    #[test]
    fn parse_date_accepts_iso_dates() {
        assert_eq!(parse_date("2024-03-07").expect("valid"), day());
        assert!(parse_date("07/03/2024").is_err());
        assert!(parse_date("  ").is_err());
    }
}
