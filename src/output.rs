//! Output types: the restored document and its per-page bookkeeping.
//!
//! [`Document`] is the only entity that outlives a pipeline run. Everything
//! else — variants, candidates, consensus tokens — is created and dropped
//! inside the run; what the caller receives is the corrected text, the
//! labelled sections over it, and enough per-page statistics to audit how
//! the text was produced.

use crate::error::VariantError;
use serde::{Deserialize, Serialize};

/// Canonical resume section categories.
///
/// The segmenter folds synonym headers (WORK HISTORY ≈ EMPLOYMENT ≈
/// EXPERIENCE) into one kind so downstream consumers match on category,
/// not on whichever spelling survived the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// The unlabelled preamble: name, address, phone, email.
    Contact,
    Summary,
    Experience,
    Education,
    Skills,
    Projects,
    Achievements,
    Certifications,
    Languages,
    Interests,
    Volunteer,
    References,
    /// A boundary we kept but could not classify.
    Other,
}

impl SectionKind {
    /// Human-readable label used when the scan did not preserve one.
    pub fn display_label(&self) -> &'static str {
        match self {
            SectionKind::Contact => "Contact",
            SectionKind::Summary => "Summary",
            SectionKind::Experience => "Experience",
            SectionKind::Education => "Education",
            SectionKind::Skills => "Skills",
            SectionKind::Projects => "Projects",
            SectionKind::Achievements => "Achievements",
            SectionKind::Certifications => "Certifications",
            SectionKind::Languages => "Languages",
            SectionKind::Interests => "Interests",
            SectionKind::Volunteer => "Volunteer",
            SectionKind::References => "References",
            SectionKind::Other => "Other",
        }
    }
}

/// One labelled, contiguous span of the corrected text.
///
/// Sections never overlap, are ordered by position, and together cover the
/// whole corrected text — segmentation relabels content, it never drops it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Canonical category of this section.
    pub kind: SectionKind,
    /// The header text as it appears in the document (or a synthesized
    /// label for the preamble).
    pub label: String,
    /// Byte offset of the section start in [`Document::text`].
    pub start_offset: usize,
    /// Byte offset one past the section end in [`Document::text`].
    pub end_offset: usize,
    /// Boundary confidence in `0.0..=1.0`.
    pub confidence: f32,
    /// True when the boundary scored below the configured threshold.
    /// Kept rather than discarded — downstream editors decide whether to
    /// trust it.
    pub low_confidence: bool,
    /// The section's raw content (text between this boundary and the next,
    /// excluding the header line itself).
    pub content: String,
}

/// Outcome of one page's trip through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Corrected text for this page. Empty when every variant failed.
    pub text: String,
    /// How many variants were attempted for this page.
    pub variants_attempted: usize,
    /// How many of those failed (timeout, empty, preprocessing).
    pub variants_failed: usize,
    /// Mean vote agreement across the page's consensus tokens, `0.0..=1.0`.
    pub agreement: f32,
    /// Mean engine confidence across the page's successful candidates.
    pub confidence: f32,
    /// Wall-clock time spent on this page, in milliseconds.
    pub duration_ms: u64,
    /// True when the page produced no usable text (all candidates failed)
    /// or agreement was too weak to trust.
    pub low_confidence: bool,
    /// The per-variant failures, for post-run reporting.
    pub errors: Vec<VariantError>,
}

impl PageResult {
    /// A page that yielded nothing because every recognition attempt failed.
    /// The run carries it forward (flagged) instead of aborting.
    pub fn empty_flagged(page_num: usize, attempted: usize, errors: Vec<VariantError>) -> Self {
        Self {
            page_num,
            text: String::new(),
            variants_attempted: attempted,
            variants_failed: errors.len(),
            agreement: 0.0,
            confidence: 0.0,
            duration_ms: 0,
            low_confidence: true,
            errors,
        }
    }

    /// Whether this page contributed text to the document.
    pub fn succeeded(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Aggregate statistics for one restoration run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreStats {
    /// Pages handed to the pipeline.
    pub total_pages: usize,
    /// Pages that produced usable text.
    pub processed_pages: usize,
    /// Pages where every variant failed.
    pub failed_pages: usize,
    /// Engine calls attempted across all pages.
    pub variants_attempted: usize,
    /// Engine calls that failed across all pages.
    pub variants_failed: usize,
    /// End-to-end wall-clock time in milliseconds.
    pub total_duration_ms: u64,
    /// Time spent inside engine calls (summed per page), in milliseconds.
    pub recognition_duration_ms: u64,
}

/// The restored document: corrected text plus ordered, labelled sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// The full corrected text, pages joined in page order.
    pub text: String,
    /// Ordered, non-overlapping sections covering `text`.
    pub sections: Vec<Section>,
    /// Per-page outcomes, sorted by page number.
    pub pages: Vec<PageResult>,
    /// Aggregate run statistics.
    pub stats: RestoreStats,
}

impl Document {
    /// The flattened plain-text artifact.
    pub fn plain_text(&self) -> &str {
        &self.text
    }

    /// A simplified rendering with bullets and other non-ASCII characters
    /// reduced to plain characters, for systems that cannot take anything
    /// richer. Bullets and dashes become `-`, curly quotes straighten, and
    /// remaining non-ASCII is dropped.
    pub fn ascii_text(&self) -> String {
        self.text
            .chars()
            .filter_map(|c| match c {
                '•' | '◦' | '▪' | '–' | '—' | '‒' => Some('-'),
                '\u{2018}' | '\u{2019}' => Some('\''),
                '\u{201C}' | '\u{201D}' => Some('"'),
                '\u{00A0}' => Some(' '),
                c if c.is_ascii() => Some(c),
                _ => None,
            })
            .collect()
    }

    /// First section of the given kind, if any.
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Sections flagged below the segmentation confidence threshold.
    pub fn low_confidence_sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.low_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_text(text: &str) -> Document {
        Document {
            text: text.to_string(),
            sections: Vec::new(),
            pages: Vec::new(),
            stats: RestoreStats::default(),
        }
    }

    #[test]
    fn ascii_text_flattens_bullets_and_quotes() {
        let doc = doc_with_text("• SKILLS: “testing” — Rust’s tooling");
        assert_eq!(doc.ascii_text(), "- SKILLS: \"testing\" - Rust's tooling");
    }

    #[test]
    fn ascii_text_drops_unmapped_non_ascii() {
        let doc = doc_with_text("résumé");
        assert_eq!(doc.ascii_text(), "rsum");
    }

    #[test]
    fn empty_flagged_page_is_low_confidence() {
        let page = PageResult::empty_flagged(2, 7, vec![]);
        assert!(page.low_confidence);
        assert!(!page.succeeded());
        assert_eq!(page.page_num, 2);
        assert_eq!(page.variants_attempted, 7);
    }

    #[test]
    fn document_serialises_and_round_trips() {
        let doc = Document {
            text: "SKILLS\n\nRust".into(),
            sections: vec![Section {
                kind: SectionKind::Skills,
                label: "SKILLS".into(),
                start_offset: 0,
                end_offset: 12,
                confidence: 0.9,
                low_confidence: false,
                content: "Rust".into(),
            }],
            pages: vec![],
            stats: RestoreStats::default(),
        };
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sections[0].kind, SectionKind::Skills);
        assert_eq!(back.text, doc.text);
    }
}
