use crate::git::Commit;
use crate::types::Evidence;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

/// Answer given when the selection cannot support one
pub const INSUFFICIENT_EVIDENCE: &str = "Insufficient evidence.";

const TOP_CONTRIBUTORS: usize = 3;
const MAJOR_CHANGES: usize = 5;
const CHANGE_MESSAGE_CHARS: usize = 100;
const EVIDENCE_ITEMS: usize = 3;
const EVIDENCE_DESCRIPTION_CHARS: usize = 80;

fn title_case(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Summary text for a selection with no commits
pub fn insufficient_evidence_summary(topic: &str) -> String {
    format!(
        "Insufficient evidence: no commits matching the topic '{}' were found in the analyzed history.",
        topic
    )
}

/// Summary derived from the commits alone, clearly marked as such
pub fn fallback_summary(topic: &str, commits: &[Commit]) -> String {
    let mut summary = format!("## Evolution Summary: {}\n\n", title_case(topic));
    let _ = write!(
        summary,
        "**Analysis Period**: {} commits analyzed\n\n",
        commits.len()
    );

    if let (Some(earliest), Some(latest)) = (
        commits.iter().map(|c| c.timestamp).min(),
        commits.iter().map(|c| c.timestamp).max(),
    ) {
        let _ = write!(
            summary,
            "**Timeline**: {} to {}\n\n",
            earliest.format("%Y-%m-%d"),
            latest.format("%Y-%m-%d")
        );

        let mut authors: HashMap<&str, usize> = HashMap::new();
        for commit in commits {
            *authors.entry(commit.author_name.as_str()).or_default() += 1;
        }
        let mut authors: Vec<(&str, usize)> = authors.into_iter().collect();
        authors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let contributors: Vec<String> = authors
            .iter()
            .take(TOP_CONTRIBUTORS)
            .map(|(author, count)| format!("{} ({} commits)", author, count))
            .collect();
        let _ = write!(
            summary,
            "**Key Contributors**: {}\n\n",
            contributors.join(", ")
        );

        summary.push_str("**Major Changes**:\n");
        for commit in commits.iter().take(MAJOR_CHANGES) {
            let _ = writeln!(
                summary,
                "- {}: {}",
                commit.timestamp.format("%Y-%m-%d"),
                ellipsize(commit.subject(), CHANGE_MESSAGE_CHARS)
            );
        }
    }

    summary.push_str("\n*Note: This is a fallback summary. Full AI analysis was unavailable.*");
    summary
}

/// Templated answer and evidence drawn directly from the commits
pub fn fallback_answer(question: &str, commits: &[Commit]) -> (String, Vec<Evidence>) {
    if commits.len() < 2 {
        return (INSUFFICIENT_EVIDENCE.to_string(), Vec::new());
    }

    let question = question.to_lowercase();
    let count = commits.len();
    let answer = if question.contains("why") || question.contains("introduced") {
        format!(
            "Based on {} commits, this feature appears to have evolved through incremental changes and refactoring.",
            count
        )
    } else if question.contains("how") && question.contains("evolv") {
        let authors: HashSet<(&str, &str)> = commits
            .iter()
            .map(|c| (c.author_name.as_str(), c.author_email.as_str()))
            .collect();
        match authors.len() {
            1 => format!(
                "The feature evolved across {} commits, all by {}.",
                count, commits[0].author_name
            ),
            n => format!(
                "The feature evolved across {} commits, with contributions from {} developers over time.",
                count, n
            ),
        }
    } else {
        format!(
            "Analysis of {} commits shows the development timeline of this feature.",
            count
        )
    };

    let evidence = commits
        .iter()
        .take(EVIDENCE_ITEMS)
        .map(|c| Evidence {
            hash: c.short_hash().to_string(),
            description: ellipsize(c.subject(), EVIDENCE_DESCRIPTION_CHARS),
        })
        .collect();

    (answer, evidence)
}
