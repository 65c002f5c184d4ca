//! Completion types consumed by interactive front ends.

use serde::{Deserialize, Serialize};

/// One completion candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
    /// Text shown in the completion list.
    pub display_text: String,
    /// Text inserted into the manifest when the candidate is accepted.
    pub insertion_text: String,
}

/// A finite, restartable set of completion candidates for a span of text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSet {
    /// Start of the span being completed, in characters.
    pub start: usize,
    /// Length of the span being completed.
    pub length: usize,
    pub completions: Vec<CompletionItem>,
}

impl CompletionSet {
    /// Build a set from candidate names, keeping those that contain `term`
    /// and ranking by ascending index of the match, ties broken by name.
    pub fn ranked(term: &str, start: usize, length: usize, candidates: &[String]) -> Self {
        let term_lower = term.to_lowercase();
        let mut matched: Vec<(usize, &String)> = candidates
            .iter()
            .filter_map(|name| {
                name.to_lowercase()
                    .find(&term_lower)
                    .map(|idx| (idx, name))
            })
            .collect();
        matched.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        Self {
            start,
            length,
            completions: matched
                .into_iter()
                .map(|(_, name)| CompletionItem {
                    display_text: name.clone(),
                    insertion_text: name.clone(),
                })
                .collect(),
        }
    }
}
