//! Pattern correction: deterministic cleanup of consensus text.
//!
//! ## Why is correction necessary?
//!
//! Even after voting, recognition output carries *systematic* defects that
//! no individual engine call avoids: words fused across a missing space
//! ("ColoradoFacilitated"), section headers swallowed mid-sentence
//! ("tasks.EMPLOYMENTCreated"), date ranges torn across line breaks,
//! spaces injected around `@` in emails. These are textual, deterministic,
//! and cheap to fix — so they are fixed here, by rules, not by asking the
//! engine to try harder.
//!
//! ## The rule table
//!
//! Every fix is a [`CorrectionRule`]: a declarative record with an id, a
//! defect class, a priority, and a rewrite (regex + template, or a named
//! pure function for the fixes a single regex cannot express). One generic
//! engine walks the table in priority order; adding or removing a defect
//! fix touches the table, never control flow. Rules are pure `&str →
//! String`, share no state, and never delete document content — they only
//! re-flow whitespace and insert or relabel markers.
//!
//! ## Rule order
//!
//! Order matters: later rules assume the normal form established by
//! earlier ones. Whitespace is normalised first so structural rules see
//! clean line breaks; merged tokens are split before header extraction so
//! headers sit on their own tokens; date repair runs before broken-line
//! reconnection so a reconnected line cannot re-split a range.
//!
//! The full set is **idempotent**: applying it to its own output changes
//! nothing. A rule whose output reintroduces a pattern another rule fixes
//! is a defect in this table (caught by the idempotence tests), never a
//! runtime condition.

use crate::config::RestoreConfig;
use crate::pipeline::segment::{is_header_line, HEADER_KEYWORDS};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// The defect class a rule targets. Classes group rules for reporting;
/// ordering still comes from each rule's priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefectClass {
    Whitespace,
    MergedTokens,
    EmbeddedHeaders,
    Dates,
    Contact,
    BrokenLines,
    DuplicateSections,
}

enum Rewrite {
    /// Regex substitution with a capture template.
    Template(&'static Lazy<Regex>, &'static str),
    /// A named pure function, for fixes a single substitution can't express.
    Func(fn(&str) -> String),
}

/// One declarative rewrite targeting one known defect.
pub struct CorrectionRule {
    pub id: &'static str,
    pub class: DefectClass,
    /// Lower runs earlier. The table is kept sorted.
    pub priority: u8,
    rewrite: Rewrite,
}

impl CorrectionRule {
    fn apply(&self, text: &str) -> String {
        match &self.rewrite {
            Rewrite::Template(re, template) => re.replace_all(text, *template).into_owned(),
            Rewrite::Func(f) => f(text),
        }
    }
}

// ── Shared fragments ─────────────────────────────────────────────────────

/// Full month names before abbreviations so the capture takes the longest
/// spelling (the regex engine prefers earlier alternatives).
const MONTHS: &str = "January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec";

/// Uppercase header keywords, longest first, for embedded-header detection.
fn header_alternation() -> String {
    let mut keywords: Vec<&str> = HEADER_KEYWORDS.iter().map(|(k, _)| *k).collect();
    keywords.sort_by_key(|k| std::cmp::Reverse(k.len()));
    keywords.join("|")
}

// ── Rule regexes ─────────────────────────────────────────────────────────

static RE_CITY_STATE_MERGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z]+,\s?[A-Z]{2})([A-Z][a-z]+)").unwrap());

static RE_MERGED_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-z]{4,})([A-Z][a-z]{2,})").unwrap());

static RE_EMBEDDED_PRE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"([a-z0-9][.!?:;,]?|[.!?:;,])({})",
        header_alternation()
    ))
    .unwrap()
});

static RE_EMBEDDED_POST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"({})([A-Z][a-z]+)", header_alternation())).unwrap()
});

static RE_DATE_NOSPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\b({MONTHS})(\d{{4}})\b")).unwrap());

static RE_DATE_NEWLINE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({MONTHS})\s+(\d{{4}})\s*[-–—]\s*({MONTHS})[ \t]*\n[ \t]*(\d{{4}})"
    ))
    .unwrap()
});

static RE_DATE_SPLIT_NO_DASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({MONTHS})\s+(\d{{4}})[ \t]*\n[ \t]*({MONTHS})\s+(\d{{4}})"
    ))
    .unwrap()
});

static RE_YEAR_RANGE_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})\s*[-–—]\s*(\d{4}|Present|Current)").unwrap());

static RE_DASH_BEFORE_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(\d{{4}})[-–—]({MONTHS})")).unwrap());

static RE_PRESENT_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({MONTHS})\s+(\d{{4}})\s*[-–—]\s*(Present|Current)"
    ))
    .unwrap()
});

static RE_LEADING_DASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?m)^[-–—][ \t]*({MONTHS})")).unwrap());

static RE_EMAIL_SPACING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z0-9._%+-]+)[ \t]*@[ \t]*([A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)+)").unwrap()
});

static RE_DATE_LINE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?:{MONTHS})[a-z]*\s+\d{{4}}$")).unwrap());

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

// ── Function rules ───────────────────────────────────────────────────────

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a merged capitalised pair unless it looks like a compound surname
/// (McDonald, MacLeod, VanDyke, DeWitt, LaSalle).
fn split_merged_tokens(text: &str) -> String {
    RE_MERGED_TOKEN
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let whole = &caps[0];
            const COMPOUNDS: &[&str] = &["Mc", "Mac", "Van", "De", "La"];
            if COMPOUNDS.iter().any(|c| whole.starts_with(c)) {
                whole.to_string()
            } else {
                format!("{}\n{}", &caps[1], &caps[2])
            }
        })
        .into_owned()
}

/// Re-emit an embedded header keyword as its own paragraph.
///
/// The keyword must appear in uppercase in the text — matching
/// case-insensitively here would tear "unemployment" apart.
fn extract_embedded_headers(text: &str) -> String {
    let pre = RE_EMBEDDED_PRE.replace_all(text, "$1\n\n$2");
    RE_EMBEDDED_POST.replace_all(&pre, "$1\n\n$2").into_owned()
}

/// Join lines the scan broke mid-phrase.
///
/// A break is mendable when the upper line ends with a connector word or
/// the lower line begins with one, and the break does not coincide with
/// sentence punctuation, a bullet, a header line, or a date. A single
/// forward pass with an accumulator reaches the fixpoint: a joined line is
/// immediately reconsidered against the next one.
fn reconnect_broken_lines(text: &str) -> String {
    const CONNECTORS: &[&str] = &[
        "in", "by", "for", "and", "to", "with", "of", "the", "as", "at", "on", "or",
    ];

    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        let joinable = match out.last() {
            None => false,
            Some(prev) => {
                let p = prev.trim_end();
                let n = line.trim_start();
                if p.is_empty() || n.is_empty() {
                    false
                } else if n.starts_with('•') || n.starts_with('-') || n.starts_with('*') {
                    false
                } else if matches!(p.chars().last(), Some('.' | ':' | ';' | '!' | '?')) {
                    false
                } else if is_header_line(p) || is_header_line(n) {
                    false
                } else if RE_DATE_LINE_END.is_match(p) {
                    false
                } else {
                    let stem = p.trim_end_matches(['-', '~']).trim_end();
                    let last = stem.split_whitespace().last().unwrap_or("");
                    let first = n.split_whitespace().next().unwrap_or("");
                    CONNECTORS.contains(&last.to_lowercase().as_str())
                        || CONNECTORS.contains(&first.to_lowercase().as_str())
                }
            }
        };

        if joinable {
            let prev = out.last_mut().expect("joinable implies a previous line");
            // Drop the stray mark the recognition pass left at the break.
            let stem = prev.trim_end().trim_end_matches(['-', '~']).trim_end().to_string();
            *prev = format!("{} {}", stem, line.trim_start());
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

/// Demote repeated standalone headers to bulleted inline headers.
///
/// The first standalone occurrence of a keyword stays the primary section
/// header; each later one becomes `• KEYWORD:` so duplicate structural
/// markers cannot be mistaken for the section itself.
fn reformat_duplicate_sections(text: &str) -> String {
    let mut seen: HashSet<&'static str> = HashSet::new();
    let mut out: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        let bare = trimmed.strip_suffix(':').unwrap_or(trimmed);
        let keyword = HEADER_KEYWORDS
            .iter()
            .map(|(k, _)| *k)
            .find(|k| bare.eq_ignore_ascii_case(k));

        match keyword {
            Some(k) if !seen.insert(k) => out.push(format!("• {bare}:")),
            _ => out.push(line.to_string()),
        }
    }
    out.join("\n")
}

fn collapse_blank_lines(text: &str) -> String {
    RE_BLANK_LINES.replace_all(text, "\n\n").into_owned()
}

// ── The table ────────────────────────────────────────────────────────────

static RULES: Lazy<Vec<CorrectionRule>> = Lazy::new(|| {
    let mut rules = vec![
        CorrectionRule {
            id: "normalize-line-endings",
            class: DefectClass::Whitespace,
            priority: 0,
            rewrite: Rewrite::Func(normalize_line_endings),
        },
        CorrectionRule {
            id: "trim-trailing-space",
            class: DefectClass::Whitespace,
            priority: 1,
            rewrite: Rewrite::Func(trim_trailing_whitespace),
        },
        CorrectionRule {
            id: "city-state-merge-split",
            class: DefectClass::MergedTokens,
            priority: 10,
            rewrite: Rewrite::Template(&RE_CITY_STATE_MERGE, "$1\n$2"),
        },
        CorrectionRule {
            id: "merged-token-split",
            class: DefectClass::MergedTokens,
            priority: 11,
            rewrite: Rewrite::Func(split_merged_tokens),
        },
        CorrectionRule {
            id: "embedded-header-extract",
            class: DefectClass::EmbeddedHeaders,
            priority: 20,
            rewrite: Rewrite::Func(extract_embedded_headers),
        },
        CorrectionRule {
            id: "date-month-year-nospace",
            class: DefectClass::Dates,
            priority: 30,
            rewrite: Rewrite::Template(&RE_DATE_NOSPACE, "$1 $2"),
        },
        CorrectionRule {
            id: "date-newline-in-range",
            class: DefectClass::Dates,
            priority: 31,
            rewrite: Rewrite::Template(&RE_DATE_NEWLINE_RANGE, "$1 $2 - $3 $4"),
        },
        CorrectionRule {
            id: "date-split-no-dash",
            class: DefectClass::Dates,
            priority: 32,
            rewrite: Rewrite::Template(&RE_DATE_SPLIT_NO_DASH, "$1 $2 - $3 $4"),
        },
        CorrectionRule {
            id: "date-year-range-spacing",
            class: DefectClass::Dates,
            priority: 33,
            rewrite: Rewrite::Template(&RE_YEAR_RANGE_SPACING, "$1 - $2"),
        },
        CorrectionRule {
            id: "date-dash-before-month",
            class: DefectClass::Dates,
            priority: 34,
            rewrite: Rewrite::Template(&RE_DASH_BEFORE_MONTH, "$1 - $2"),
        },
        CorrectionRule {
            id: "date-present-range",
            class: DefectClass::Dates,
            priority: 35,
            rewrite: Rewrite::Template(&RE_PRESENT_RANGE, "$1 $2 - $3"),
        },
        CorrectionRule {
            id: "date-leading-dash",
            class: DefectClass::Dates,
            priority: 36,
            rewrite: Rewrite::Template(&RE_LEADING_DASH_DATE, " - $1"),
        },
        CorrectionRule {
            id: "email-spacing",
            class: DefectClass::Contact,
            priority: 40,
            rewrite: Rewrite::Template(&RE_EMAIL_SPACING, "$1@$2"),
        },
        CorrectionRule {
            id: "broken-line-reconnect",
            class: DefectClass::BrokenLines,
            priority: 50,
            rewrite: Rewrite::Func(reconnect_broken_lines),
        },
        CorrectionRule {
            id: "duplicate-section-reformat",
            class: DefectClass::DuplicateSections,
            priority: 60,
            rewrite: Rewrite::Func(reformat_duplicate_sections),
        },
        CorrectionRule {
            id: "collapse-blank-lines",
            class: DefectClass::Whitespace,
            priority: 90,
            rewrite: Rewrite::Func(collapse_blank_lines),
        },
    ];
    rules.sort_by_key(|r| r.priority);
    rules
});

/// The full rule table, sorted by priority.
pub fn rule_table() -> &'static [CorrectionRule] {
    &RULES
}

/// Apply the enabled subset of the rule table, in order.
pub fn correct(text: &str, config: &RestoreConfig) -> String {
    apply_rules(text, |id| config.rule_enabled(id))
}

/// Apply the entire rule table. Used for the document-level pass and the
/// idempotence property tests.
pub fn correct_all(text: &str) -> String {
    apply_rules(text, |_| true)
}

fn apply_rules(text: &str, enabled: impl Fn(&str) -> bool) -> String {
    let mut current = text.to_string();
    for rule in RULES.iter() {
        if enabled(rule.id) {
            current = rule.apply(&current);
        }
    }
    current
}
