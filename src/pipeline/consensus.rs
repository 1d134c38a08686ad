//! Consensus resolution: merge candidate texts by positional word voting.
//!
//! All variants derive from the same page and preserve reading order, so a
//! cheap positional alignment is enough: the word at position *i* of one
//! candidate is assumed to correspond to the word at position *i* of the
//! others. (True sequence alignment would tolerate inserted/dropped tokens
//! better; the external contract permits upgrading to it.)
//!
//! Voting is case-insensitive with two deterministic tie-breaks:
//! the winning spelling is the most frequent case-insensitive form (ties
//! broken by earliest recipe order), and its casing is a secondary vote
//! among that word's occurrences (ties again by recipe order). Recipe
//! order therefore totally orders every decision — same candidates in,
//! same text out.
//!
//! The override lexicon handles the failure mode voting cannot: when every
//! rendering misreads the same glyphs the same way, the wrong word wins by
//! honest majority. A lexicon hit may displace the winner, but only when
//! the dictionary's confidence in the correction exceeds the vote margin
//! and the context corroborates it (the correct form got votes too, or the
//! neighbourhood is location-shaped, where these misreads cluster).

use crate::config::{OverrideLexicon, RestoreConfig};
use crate::pipeline::recognize::Candidate;

/// One resolved word slot.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConsensusToken {
    /// Word position, strictly increasing across the sequence.
    pub position: usize,
    /// The chosen word, never empty.
    pub word: String,
    /// Votes the chosen word received.
    pub votes: usize,
    /// Candidates that supplied a word at this position.
    pub total: usize,
    /// True when the lexicon displaced the plurality winner.
    pub is_override: bool,
}

/// The voted, merged best-guess text for one page.
#[derive(Debug, Clone, Default)]
pub struct ConsensusText {
    pub tokens: Vec<ConsensusToken>,
    /// Tokens rendered with single spaces, line structure following the
    /// first successful candidate.
    pub text: String,
    /// Mean vote agreement across tokens, `0.0..=1.0`.
    pub agreement: f32,
    /// Mean engine confidence across the successful candidates.
    pub confidence: f32,
}

/// Resolve a page's candidates into one consensus text.
///
/// Failed candidates are excluded up front; with no successful candidate
/// the result is empty (the caller flags the page, it does not abort).
pub fn resolve(candidates: &[Candidate], config: &RestoreConfig) -> ConsensusText {
    let successful: Vec<(&str, f32)> = candidates
        .iter()
        .filter_map(|c| match c {
            Candidate::Recognized {
                text, confidence, ..
            } => Some((text.as_str(), *confidence)),
            Candidate::Failed { .. } => None,
        })
        .collect();

    if successful.is_empty() {
        return ConsensusText::default();
    }

    let token_lists: Vec<Vec<&str>> = successful
        .iter()
        .map(|(text, _)| text.split_whitespace().collect())
        .collect();
    let max_len = token_lists.iter().map(Vec::len).max().unwrap_or(0);

    let line_breaks = primary_line_breaks(successful[0].0);
    let lexicon = config.lexicon();

    let mut tokens = Vec::with_capacity(max_len);
    for position in 0..max_len {
        let present: Vec<(usize, &str)> = token_lists
            .iter()
            .enumerate()
            .filter_map(|(idx, list)| list.get(position).map(|w| (idx, *w)))
            .collect();
        if present.is_empty() {
            continue;
        }
        tokens.push(resolve_position(position, &present, &token_lists, lexicon));
    }

    let text = render(&tokens, &line_breaks);
    let agreement = if tokens.is_empty() {
        0.0
    } else {
        tokens
            .iter()
            .map(|t| t.votes as f32 / t.total.max(1) as f32)
            .sum::<f32>()
            / tokens.len() as f32
    };
    let confidence =
        successful.iter().map(|(_, c)| *c).sum::<f32>() / successful.len() as f32;

    ConsensusText {
        tokens,
        text,
        agreement,
        confidence,
    }
}

/// Vote one position. `present` holds `(candidate_index, word)` in recipe
/// order, which every tie-break leans on.
fn resolve_position(
    position: usize,
    present: &[(usize, &str)],
    token_lists: &[Vec<&str>],
    lexicon: &OverrideLexicon,
) -> ConsensusToken {
    // Case-insensitive tally, insertion order = recipe order.
    struct Group<'a> {
        lower: String,
        count: usize,
        forms: Vec<&'a str>,
    }
    let mut groups: Vec<Group> = Vec::new();
    for &(_, word) in present {
        let lower = word.to_lowercase();
        match groups.iter_mut().find(|g| g.lower == lower) {
            Some(g) => {
                g.count += 1;
                g.forms.push(word);
            }
            None => groups.push(Group {
                lower,
                count: 1,
                forms: vec![word],
            }),
        }
    }

    // Plurality winner; earlier insertion (recipe order) wins ties because
    // max_by_key keeps the first maximum on equal keys only with a stable
    // scan, so do it by hand.
    let mut winner = 0usize;
    for (i, g) in groups.iter().enumerate().skip(1) {
        if g.count > groups[winner].count {
            winner = i;
        }
    }

    // Secondary vote on casing among the winner's occurrences.
    let mut case_forms: Vec<(&str, usize)> = Vec::new();
    for &form in &groups[winner].forms {
        match case_forms.iter_mut().find(|(f, _)| *f == form) {
            Some((_, n)) => *n += 1,
            None => case_forms.push((form, 1)),
        }
    }
    let mut best_case = 0usize;
    for (i, &(_, n)) in case_forms.iter().enumerate().skip(1) {
        if n > case_forms[best_case].1 {
            best_case = i;
        }
    }

    let total = present.len();
    let winner_count = groups[winner].count;
    let winner_form = case_forms[best_case].0;

    // Override check: a deterministically-misread winner may be displaced.
    // The lookup ignores trailing punctuation (a misread city name keeps
    // its comma), which is re-attached to the replacement.
    let strip_punct = |s: &str| -> usize {
        s.trim_end_matches(|c: char| c.is_ascii_punctuation()).len()
    };
    let core = &groups[winner].lower[..strip_punct(&groups[winner].lower)];
    if !core.is_empty() {
        if let Some(entry) = lexicon.lookup(core) {
            let replacement_lower = entry.replacement.to_lowercase();
            let replacement_votes = groups
                .iter()
                .filter(|g| &g.lower[..strip_punct(&g.lower)] == replacement_lower.as_str())
                .map(|g| g.count)
                .sum::<usize>();
            let margin = (winner_count - replacement_votes) as f32 / total as f32;
            let corroborated =
                replacement_votes > 0 || location_shaped_context(token_lists, position);
            if entry.confidence > margin && corroborated {
                let (form_core, form_suffix) = winner_form.split_at(strip_punct(winner_form));
                return ConsensusToken {
                    position,
                    word: format!("{}{}", match_case(form_core, &entry.replacement), form_suffix),
                    votes: replacement_votes,
                    total,
                    is_override: true,
                };
            }
        }
    }

    ConsensusToken {
        position,
        word: winner_form.to_string(),
        votes: winner_count,
        total,
        is_override: false,
    }
}

/// Whether the neighbourhood of `position` looks like a postal location
/// (`City, ST` / state abbreviation / 5-digit ZIP) in any candidate.
/// Misread place names cluster in address lines, so this is the context
/// signal the override rule leans on.
fn location_shaped_context(token_lists: &[Vec<&str>], position: usize) -> bool {
    const STATE_ABBRS: &[&str] = &[
        "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
        "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
        "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
        "VA", "WA", "WV", "WI", "WY",
    ];

    let lo = position.saturating_sub(2);
    let hi = position + 2;
    for list in token_lists {
        if list.is_empty() {
            continue;
        }
        for i in lo..=hi.min(list.len() - 1) {
            let token = list[i].trim_matches(|c: char| c.is_ascii_punctuation());
            if STATE_ABBRS.contains(&token) {
                return true;
            }
            if token.len() == 5 && token.chars().all(|c| c.is_ascii_digit()) {
                return true;
            }
        }
    }
    false
}

/// Re-apply the displaced word's casing pattern to the replacement.
fn match_case(displaced: &str, replacement: &str) -> String {
    if displaced.chars().all(|c| !c.is_lowercase()) && displaced.chars().any(|c| c.is_uppercase())
    {
        replacement.to_uppercase()
    } else if displaced.chars().next().is_some_and(|c| c.is_uppercase()) {
        let mut chars = replacement.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        replacement.to_string()
    }
}

/// Where the primary candidate breaks lines, measured in token counts:
/// `(tokens_before_break, newline_count)`.
fn primary_line_breaks(primary: &str) -> Vec<(usize, usize)> {
    let mut breaks = Vec::new();
    let mut seen = 0usize;
    for line in primary.lines() {
        let count = line.split_whitespace().count();
        if count > 0 {
            seen += count;
            breaks.push((seen, 1));
        } else if let Some(last) = breaks.last_mut() {
            last.1 = 2;
        }
    }
    breaks
}

/// Join tokens with single spaces, restoring the primary candidate's line
/// structure. Tokens past the primary's length (a longer sibling) continue
/// on the final line, space-separated.
fn render(tokens: &[ConsensusToken], line_breaks: &[(usize, usize)]) -> String {
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        out.push_str(&token.word);
        if i + 1 == tokens.len() {
            break;
        }
        match line_breaks.iter().find(|(at, _)| *at == i + 1) {
            Some((_, 1)) => out.push('\n'),
            Some((_, _)) => out.push_str("\n\n"),
            None => out.push(' '),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RestoreConfig;
    use crate::pipeline::variants::RecipeKind;

    fn recognized(recipe: RecipeKind, text: &str) -> Candidate {
        Candidate::Recognized {
            recipe,
            text: text.into(),
            confidence: 0.8,
        }
    }

    fn three(texts: [&str; 3]) -> Vec<Candidate> {
        vec![
            recognized(RecipeKind::Traditional, texts[0]),
            recognized(RecipeKind::HighContrast, texts[1]),
            recognized(RecipeKind::AdaptiveThreshold, texts[2]),
        ]
    }

    fn config() -> RestoreConfig {
        RestoreConfig::builder().build().unwrap()
    }

    #[test]
    fn unanimous_candidates_pass_through() {
        let out = resolve(&three(["Salt Lake City", "Salt Lake City", "Salt Lake City"]), &config());
        assert_eq!(out.text, "Salt Lake City");
        assert!((out.agreement - 1.0).abs() < 1e-6);
    }

    #[test]
    fn majority_wins_per_position() {
        let out = resolve(
            &three(["Managed a team", "Managed a tearn", "Managed a team"]),
            &config(),
        );
        assert_eq!(out.text, "Managed a team");
        assert_eq!(out.tokens[2].votes, 2);
        assert_eq!(out.tokens[2].total, 3);
    }

    #[test]
    fn two_way_tie_breaks_by_recipe_order() {
        let out = resolve(
            &vec![
                recognized(RecipeKind::Traditional, "alpha"),
                recognized(RecipeKind::HighContrast, "omega"),
            ],
            &config(),
        );
        assert_eq!(out.text, "alpha");
    }

    #[test]
    fn casing_tie_breaks_by_recipe_order() {
        let out = resolve(&three(["Rust", "RUST", "rust"]), &config());
        // All casings tie 1-1-1; the first candidate's form wins.
        assert_eq!(out.text, "Rust");
    }

    #[test]
    fn casing_majority_wins_within_winning_word() {
        let out = resolve(&three(["rust", "Rust", "Rust"]), &config());
        assert_eq!(out.text, "Rust");
    }

    #[test]
    fn determinism_same_input_same_output() {
        let candidates = three([
            "Portland OR 97203 engineer",
            "Portland OR 97203 enginecr",
            "Porfland OR 97203 engineer",
        ]);
        let a = resolve(&candidates, &config());
        let b = resolve(&candidates, &config());
        assert_eq!(a.text, b.text);
        assert_eq!(a.tokens, b.tokens);
    }

    #[test]
    fn positions_strictly_increase() {
        let out = resolve(&three(["a b c d", "a b", "a b c"]), &config());
        let positions: Vec<usize> = out.tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn lone_candidate_tail_is_kept() {
        let out = resolve(&three(["a b extra", "a b", "a b"]), &config());
        assert_eq!(out.text, "a b extra");
        let tail = &out.tokens[2];
        assert_eq!(tail.votes, 1);
        assert_eq!(tail.total, 1);
    }

    #[test]
    fn known_problem_word_is_overridden_despite_majority() {
        // Two variants share the same misread; the third saw it right.
        // The location-shaped neighbourhood corroborates the lexicon.
        let out = resolve(
            &three([
                "villereek, UT 84106",
                "villereek, UT 84106",
                "millcreek, UT 84106",
            ]),
            &config(),
        );
        assert!(out.text.starts_with("millcreek,"), "got: {}", out.text);
        assert!(out.tokens[0].is_override);
        assert_eq!(out.tokens[0].votes, 1);
        assert_eq!(out.tokens[0].total, 3);
    }

    #[test]
    fn override_preserves_displaced_casing() {
        let out = resolve(
            &three(["Villereek, UT 84106", "Villereek, UT 84106", "Millcreek, UT 84106"]),
            &config(),
        );
        assert!(out.text.starts_with("Millcreek"), "got: {}", out.text);
    }

    #[test]
    fn unanimous_misread_is_not_overridden() {
        // With no dissenting candidate the vote margin is 1.0, which no
        // lexicon confidence exceeds; the majority stands.
        let out = resolve(
            &three(["villereek, UT 84106", "villereek, UT 84106", "villereek, UT 84106"]),
            &config(),
        );
        assert!(out.text.starts_with("villereek"), "got: {}", out.text);
        assert!(!out.tokens[0].is_override);
    }

    #[test]
    fn override_requires_corroboration() {
        // "cornpany" maps to "company" in the builtin lexicon, but with no
        // dissenting vote and no location context the majority stands.
        let out = resolve(&three(["cornpany", "cornpany", "company"]), &config());
        assert_eq!(out.text, "company");

        let out = resolve(&three(["cornpany", "cornpany", "cornpany"]), &config());
        assert_eq!(out.text, "cornpany");
    }

    #[test]
    fn line_structure_follows_primary_candidate() {
        let out = resolve(
            &three(["SKILLS\n\nRust Tokio", "SKILLS Rust Tokio", "SKILLS Rust Tokio"]),
            &config(),
        );
        assert_eq!(out.text, "SKILLS\n\nRust Tokio");
    }

    #[test]
    fn no_successful_candidates_yields_empty_consensus() {
        let candidates = vec![Candidate::Failed {
            recipe: RecipeKind::Traditional,
            error: crate::error::VariantError::Empty {
                recipe: "traditional".into(),
            },
        }];
        let out = resolve(&candidates, &config());
        assert!(out.text.is_empty());
        assert!(out.tokens.is_empty());
        assert_eq!(out.agreement, 0.0);
    }
}
