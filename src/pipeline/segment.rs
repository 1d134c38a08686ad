//! Section segmentation: classify corrected text into labelled sections.
//!
//! The segmenter scans for a fixed header vocabulary (plus fuzzy variants
//! for keywords the scan garbled) and scores every line for how much it
//! looks like a section boundary: keyword strength, all-caps shape, line
//! isolation, a colon, bullets or date ranges underneath. Boundaries are
//! local maxima above a score floor.
//!
//! Two properties matter more than clever classification:
//!
//! * **Nothing is discarded.** Sections are contiguous, ordered, and
//!   together cover the whole text. A weak boundary is kept and flagged
//!   `low_confidence` — downstream editors decide whether to trust it.
//! * **Hierarchy stays put.** A job title inside an experience section
//!   (dates above, bullets below) is sub-content, not a section; the
//!   scoring penalises it so it never splits its parent.

use crate::config::RestoreConfig;
use crate::output::{Section, SectionKind};
use once_cell::sync::Lazy;
use regex::Regex;

/// The header vocabulary: recognised spelling → canonical kind.
/// Synonyms map to one kind (WORK HISTORY ≈ EMPLOYMENT ≈ EXPERIENCE).
pub(crate) const HEADER_KEYWORDS: &[(&str, SectionKind)] = &[
    ("PROFESSIONAL SUMMARY", SectionKind::Summary),
    ("ABOUT ME", SectionKind::Summary),
    ("SUMMARY", SectionKind::Summary),
    ("PROFILE", SectionKind::Summary),
    ("OBJECTIVE", SectionKind::Summary),
    ("PROFESSIONAL EXPERIENCE", SectionKind::Experience),
    ("WORK EXPERIENCE", SectionKind::Experience),
    ("WORK HISTORY", SectionKind::Experience),
    ("EXPERIENCE", SectionKind::Experience),
    ("EMPLOYMENT", SectionKind::Experience),
    ("CAREER", SectionKind::Experience),
    ("EDUCATIONAL BACKGROUND", SectionKind::Education),
    ("EDUCATION", SectionKind::Education),
    ("ACADEMIC", SectionKind::Education),
    ("QUALIFICATIONS", SectionKind::Education),
    ("TECHNICAL SKILLS", SectionKind::Skills),
    ("CORE SKILLS", SectionKind::Skills),
    ("SKILLS", SectionKind::Skills),
    ("COMPETENCIES", SectionKind::Skills),
    ("EXPERTISE", SectionKind::Skills),
    ("KEY PROJECTS", SectionKind::Projects),
    ("PROJECTS", SectionKind::Projects),
    ("ACCOMPLISHMENTS", SectionKind::Achievements),
    ("ACHIEVEMENTS", SectionKind::Achievements),
    ("AWARDS", SectionKind::Achievements),
    ("HONORS", SectionKind::Achievements),
    ("PUBLICATIONS", SectionKind::Achievements),
    ("LEADERSHIP", SectionKind::Achievements),
    ("CERTIFICATIONS", SectionKind::Certifications),
    ("CERTIFICATES", SectionKind::Certifications),
    ("LANGUAGES", SectionKind::Languages),
    ("INTERESTS", SectionKind::Interests),
    ("ACTIVITIES", SectionKind::Interests),
    ("VOLUNTEER", SectionKind::Volunteer),
    ("REFERENCES", SectionKind::References),
];

/// Words that look like headers but never bound a section.
pub(crate) const NON_SECTION_WORDS: &[&str] = &[
    "RESUME",
    "CV",
    "CURRICULUM VITAE",
    "NAME",
    "PAGE",
    "EMAIL",
    "PHONE",
    "ADDRESS",
    "STREET",
    "CITY",
    "STATE",
    "ZIP",
];

/// Job-title words that appear inside experience sections and must not be
/// promoted to boundaries.
const JOB_TITLE_INDICATORS: &[&str] = &[
    "MANAGER",
    "DIRECTOR",
    "ENGINEER",
    "SPECIALIST",
    "ANALYST",
    "DEVELOPER",
    "ASSISTANT",
    "COORDINATOR",
    "CONSULTANT",
    "REPRESENTATIVE",
    "SUPERVISOR",
    "LEAD",
    "OFFICER",
];

/// Fuzzy match floor (rapidfuzz ratio, 0–100) for garbled keywords.
/// 80 admits one substituted glyph in a six-letter keyword (SKJLLS → 83.3)
/// while rejecting genuinely different words.
const FUZZY_FLOOR: f64 = 80.0;

/// Score floor for a line to become a boundary on shape alone.
const BOUNDARY_SCORE: f32 = 3.0;

/// Local-maximum window when picking boundaries.
const PEAK_WINDOW: usize = 5;

static RE_DATE_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d{4}\s*(-|–|—|to)\s*(\d{4}|Present|Current)").unwrap());

static RE_CONTACT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@|http|www\.|\(\d{3}\)|\d{3}[-.]\d{3}[-.]\d{4}").unwrap());

static RE_NUMBERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\s*\.|^\(\d+\)").unwrap());

/// Whether a line is (only) a recognised section header, in any of its
/// rendered forms (`SKILLS`, `SKILLS:`, `• SKILLS:`).
pub(crate) fn is_header_line(line: &str) -> bool {
    bare_header(line).is_some()
}

/// Strip header dressing and return the matching keyword, exact only.
fn bare_header(line: &str) -> Option<&'static (&'static str, SectionKind)> {
    let t = line.trim();
    let t = t.strip_prefix("• ").unwrap_or(t);
    let t = t.strip_suffix(':').unwrap_or(t);
    HEADER_KEYWORDS.iter().find(|(k, _)| t.eq_ignore_ascii_case(k))
}

/// How strongly a line matches the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq)]
enum KeywordMatch {
    Exact(SectionKind, &'static str),
    WordBoundary(SectionKind, &'static str),
    Fuzzy(SectionKind, &'static str),
}

impl KeywordMatch {
    fn kind(&self) -> SectionKind {
        match self {
            KeywordMatch::Exact(k, _)
            | KeywordMatch::WordBoundary(k, _)
            | KeywordMatch::Fuzzy(k, _) => *k,
        }
    }

    fn score(&self) -> f32 {
        match self {
            KeywordMatch::Exact(..) => 5.0,
            KeywordMatch::WordBoundary(..) => 4.0,
            KeywordMatch::Fuzzy(..) => 2.5,
        }
    }
}

/// Match a line against the vocabulary: exact, whole-word, then fuzzy.
fn keyword_match(line: &str) -> Option<KeywordMatch> {
    let t = line.trim();
    let t = t.strip_suffix(':').unwrap_or(t).trim();
    if t.is_empty() || t.len() > 40 {
        return None;
    }
    let upper = t.to_uppercase();

    for (keyword, kind) in HEADER_KEYWORDS {
        if upper == *keyword {
            return Some(KeywordMatch::Exact(*kind, keyword));
        }
    }
    for (keyword, kind) in HEADER_KEYWORDS {
        if contains_whole_word(&upper, keyword) {
            return Some(KeywordMatch::WordBoundary(*kind, keyword));
        }
    }
    // Fuzzy only for short, header-shaped lines; tolerates one or two
    // garbled glyphs (EXPERJENCE, EDUCATlON).
    if t.len() <= 30 && t.split_whitespace().count() <= 3 {
        for (keyword, kind) in HEADER_KEYWORDS {
            let ratio = rapidfuzz::fuzz::ratio(upper.chars(), keyword.chars());
            if ratio >= FUZZY_FLOOR {
                return Some(KeywordMatch::Fuzzy(*kind, keyword));
            }
        }
    }
    None
}

fn contains_whole_word(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !haystack[..abs]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after = abs + needle.len();
        let after_ok = after == haystack.len()
            || !haystack[after..].chars().next().is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = abs + 1;
    }
    false
}

fn is_non_section(line: &str) -> bool {
    let upper = line.trim().to_uppercase();
    NON_SECTION_WORDS.iter().any(|w| upper == *w)
}

/// Score one line for boundary-ness. Higher = more header-like.
fn score_line(lines: &[&str], i: usize) -> f32 {
    let line = lines[i].trim();
    if line.is_empty() || is_non_section(line) {
        return 0.0;
    }
    // Bulleted lines are sub-content by construction (the correction pass
    // demotes duplicate headers to bullets).
    if line.starts_with('•') || line.starts_with('*') {
        return 0.0;
    }

    let mut score = 0.0f32;

    if let Some(m) = keyword_match(line) {
        score += m.score();
    }

    let word_count = line.split_whitespace().count();
    if line.len() > 3 && word_count <= 4 {
        if line == line.to_uppercase() && line.chars().any(|c| c.is_alphabetic()) {
            score += 3.0;
        } else if is_title_case(line) {
            score += 2.0;
        }
    }

    if line.ends_with(':') {
        score += 1.5;
    }

    if line.len() < 20 {
        score += 1.5;
    } else if line.len() < 30 {
        score += 0.75;
    }

    let prev_blank = i == 0 || lines[i - 1].trim().is_empty();
    let next_blank = i + 1 >= lines.len() || lines[i + 1].trim().is_empty();
    if prev_blank {
        score += 1.0;
    }
    if prev_blank && next_blank {
        score += 2.0;
    }

    if let Some(next) = lines.iter().skip(i + 1).find(|l| !l.trim().is_empty()) {
        let next = next.trim();
        if next.starts_with('•') || next.starts_with('-') || next.starts_with('*') {
            score += 1.5;
        }
        if RE_DATE_RANGE.is_match(next) {
            score += 1.5;
        }
    }

    if RE_CONTACT_LINE.is_match(line) {
        score -= 2.0;
    }
    if RE_NUMBERED_ITEM.is_match(line) {
        score -= 2.0;
    }

    // A job title flanked by the furniture of a job entry is hierarchical
    // content inside its section, not a boundary.
    let upper = line.to_uppercase();
    let is_job_title = JOB_TITLE_INDICATORS
        .iter()
        .any(|t| contains_whole_word(&upper, t));
    if is_job_title {
        let ctx_lo = i.saturating_sub(3);
        let ctx_hi = (i + 4).min(lines.len());
        let date_before = lines[ctx_lo..i].iter().any(|l| RE_DATE_RANGE.is_match(l));
        let bullet_after = lines[i + 1..ctx_hi]
            .iter()
            .any(|l| l.trim().starts_with('•') || l.trim().starts_with('-'));
        if date_before || bullet_after {
            score -= 3.0;
        }
    }

    score
}

/// Segment corrected text into contiguous, ordered sections.
///
/// The returned spans never overlap and their union is `0..text.len()`;
/// text before the first header becomes the Contact preamble.
pub fn segment(text: &str, config: &RestoreConfig) -> Vec<Section> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    // Line table with byte offsets into `text`.
    let mut offsets = Vec::new();
    let mut lines = Vec::new();
    let mut cursor = 0usize;
    for raw in text.split_inclusive('\n') {
        offsets.push(cursor);
        lines.push(raw.trim_end_matches('\n'));
        cursor += raw.len();
    }

    let scores: Vec<f32> = (0..lines.len()).map(|i| score_line(&lines, i)).collect();

    // Boundary selection: score peaks, plus keyword lines kept even when
    // weak (they get flagged, not dropped).
    let mut boundaries: Vec<usize> = Vec::new();
    for i in 0..lines.len() {
        let has_keyword = !lines[i].trim().starts_with('•')
            && !is_non_section(lines[i])
            && keyword_match(lines[i]).is_some();
        if scores[i] < BOUNDARY_SCORE && !has_keyword {
            continue;
        }
        if scores[i] >= BOUNDARY_SCORE {
            let lo = i.saturating_sub(PEAK_WINDOW);
            let hi = (i + PEAK_WINDOW + 1).min(scores.len());
            let local_max = scores[lo..hi].iter().cloned().fold(f32::MIN, f32::max);
            if scores[i] < local_max {
                continue;
            }
        }
        if boundaries.iter().any(|&b| i.saturating_sub(b) < 3 && b <= i) {
            continue;
        }
        boundaries.push(i);
    }

    // The document always opens a section: the preamble before the first
    // header is Contact.
    if boundaries.first() != Some(&0) {
        boundaries.insert(0, 0);
    }

    let mut sections = Vec::with_capacity(boundaries.len());
    for (bi, &line_idx) in boundaries.iter().enumerate() {
        let start = offsets[line_idx];
        let end = boundaries
            .get(bi + 1)
            .map(|&next| offsets[next])
            .unwrap_or(text.len());

        let header_line = lines[line_idx].trim();
        let matched = keyword_match(lines[line_idx]);

        let (kind, label, content) = if bi == 0 && matched.is_none() {
            (
                SectionKind::Contact,
                "Contact".to_string(),
                text[start..end].trim().to_string(),
            )
        } else {
            let kind = matched.map(|m| m.kind()).unwrap_or(SectionKind::Other);
            let label = if header_line.is_empty() {
                kind.display_label().to_string()
            } else {
                header_line.trim_end_matches(':').trim().to_string()
            };
            let body_start = (start + lines[line_idx].len() + 1).min(end);
            (kind, label, text[body_start..end].trim().to_string())
        };

        let confidence = if bi == 0 && matched.is_none() {
            0.9
        } else {
            (scores[line_idx] / 10.0).clamp(0.0, 1.0)
        };

        sections.push(Section {
            kind,
            label,
            start_offset: start,
            end_offset: end,
            confidence,
            low_confidence: confidence < config.segment_confidence_threshold,
            content,
        });
    }

    sections
}

fn is_title_case(line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    !words.is_empty()
        && words.iter().all(|w| {
            w.chars().next().is_some_and(|c| c.is_uppercase())
                && w.chars().skip(1).all(|c| c.is_lowercase())
        })
}
