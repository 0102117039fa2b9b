use crate::git::Commit;
use crate::types::Evidence;
use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

/// Commits included in a prompt
pub const PROMPT_COMMIT_LIMIT: usize = 15;

const SUMMARY_MESSAGE_CHARS: usize = 200;
const SUMMARY_FILES: usize = 5;
const SUMMARY_DIFF_CHARS: usize = 300;

const QA_MESSAGE_CHARS: usize = 150;
const QA_FILES: usize = 3;
const QA_DIFF_CHARS: usize = 200;

pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a senior software architect and version control expert. \
Your task is to analyze a list of git commits and explain how a specific feature evolved over time in the codebase.

Your output should be a clear, structured summary of how the feature changed, what decisions were made, \
and any architectural or business implications.

Focus only on the specified topic. Identify initial implementation, major changes, refactors, and architecture shifts. \
Infer motivation if possible. Highlight important contributors.

Use a narrative tone like a changelog for humans. Be concise but insightful.";

pub const QA_SYSTEM_PROMPT: &str = "You are a concise software historian. \
Given git commits and diffs, you will answer the user's question about code evolution.

Be evidence-based. When you infer motivation, cite the commit(s) that support it.
If evidence is weak, say \"Insufficient evidence\" and offer the most likely explanation clearly marked as a hypothesis.

Keep prose brief (executive summary style). Focus on the Topic if provided; otherwise answer broadly.

Output format:
Answer
Summary: <2-4 sentences answering the question>

Key Evidence
<hash> — \"<commit message or quoted fragment>\"
<hash> — \"<commit message or quoted fragment>\"

Do not invent commit hashes or authors; only use what's provided.";

/// `<hash> — "<description>"`, tolerating list markers, backticks and ASCII dashes
static EVIDENCE_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"^[\s\-*•]*`?(?P<hash>[0-9a-fA-F]{4,40})`?\s*(?:—|–|--|-|:)\s*(?P<desc>.+)$"#).ok()
});

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// User prompt for the evolution summary
pub fn build_summary_prompt(topic: &str, commits: &[Commit]) -> String {
    let mut prompt = format!("Topic: {}\n\nCommits:\n", topic);

    for commit in commits.iter().take(PROMPT_COMMIT_LIMIT) {
        let _ = writeln!(prompt, "- Commit: {}", commit.short_hash());
        let _ = writeln!(prompt, "  Author: {}", commit.author_name);
        let _ = writeln!(prompt, "  Date: {}", commit.timestamp.format("%Y-%m-%d"));
        let _ = writeln!(
            prompt,
            "  Message: {}",
            truncate_chars(commit.message.trim(), SUMMARY_MESSAGE_CHARS)
        );
        let files: Vec<&str> = display_files(commit, SUMMARY_FILES);
        let _ = writeln!(prompt, "  Files: {}", files.join(", "));
        if !commit.diff.is_empty() {
            let _ = writeln!(
                prompt,
                "  Diff: {}...",
                truncate_chars(&commit.diff, SUMMARY_DIFF_CHARS)
            );
        }
        prompt.push('\n');
    }

    prompt.push_str("\nProvide a structured summary of how this feature evolved:");
    prompt
}

/// User prompt for the follow-up question
pub fn build_qa_prompt(question: &str, topic: &str, commits: &[Commit]) -> String {
    let mut prompt = format!("Question: {}\n", question);
    if !topic.is_empty() {
        let _ = writeln!(prompt, "Topic: {}", topic);
    }
    prompt.push_str("\nCommits:\n");

    for commit in commits.iter().take(PROMPT_COMMIT_LIMIT) {
        let files: Vec<String> = display_files(commit, QA_FILES)
            .into_iter()
            .map(|f| format!("{:?}", f))
            .collect();
        let _ = writeln!(prompt, "- {{");
        let _ = writeln!(prompt, "  hash: {:?},", commit.short_hash());
        let _ = writeln!(prompt, "  author: {:?},", commit.author_name);
        let _ = writeln!(prompt, "  date: \"{}\",", commit.timestamp.format("%Y-%m-%d"));
        let _ = writeln!(
            prompt,
            "  message: {:?},",
            truncate_chars(commit.message.trim(), QA_MESSAGE_CHARS)
        );
        let _ = writeln!(prompt, "  files_changed: [{}],", files.join(", "));
        let _ = writeln!(
            prompt,
            "  diff_excerpt: {:?}",
            truncate_chars(&commit.diff, QA_DIFF_CHARS)
        );
        prompt.push_str("}\n");
    }

    prompt
}

/// Summarizer key files when present, otherwise the changed paths
fn display_files(commit: &Commit, limit: usize) -> Vec<&str> {
    let files = if commit.key_files.is_empty() {
        &commit.files_changed
    } else {
        &commit.key_files
    };
    files.iter().take(limit).map(String::as_str).collect()
}

/// Split a question-answering response into the answer and cited evidence
///
/// Lines under an "Answer" or "Summary:" heading form the answer; lines under
/// "Key Evidence" are parsed as `<hash> — "<description>"`. A response without
/// recognizable sections is taken whole as the answer.
pub fn parse_qa_response(content: &str) -> (String, Vec<Evidence>) {
    #[derive(PartialEq)]
    enum Section {
        None,
        Answer,
        Evidence,
    }

    let mut section = Section::None;
    let mut answer: Vec<&str> = Vec::new();
    let mut evidence = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        let bare = line.trim_start_matches(|c: char| c == '#' || c == '*' || c.is_whitespace());

        if let Some(rest) = bare.strip_prefix("Summary:") {
            section = Section::Answer;
            push_text(&mut answer, rest);
            continue;
        }
        if let Some(rest) = bare.strip_prefix("Answer") {
            section = Section::Answer;
            push_text(&mut answer, rest.trim_start_matches(['*', ':']));
            continue;
        }
        if bare.starts_with("Key Evidence") {
            section = Section::Evidence;
            continue;
        }

        if line.is_empty() {
            continue;
        }
        match section {
            Section::Answer => answer.push(line),
            Section::Evidence => {
                if let Some(item) = parse_evidence_line(line) {
                    evidence.push(item);
                }
            }
            Section::None => {}
        }
    }

    let mut answer = answer.join(" ");
    if answer.is_empty() {
        answer = content.trim().to_string();
    }
    (answer, evidence)
}

fn push_text<'a>(answer: &mut Vec<&'a str>, text: &'a str) {
    let text = text.trim_matches(|c: char| c == '*' || c.is_whitespace());
    if !text.is_empty() {
        answer.push(text);
    }
}

/// Parse one `<hash> — "<description>"` line
pub fn parse_evidence_line(line: &str) -> Option<Evidence> {
    let regex = EVIDENCE_LINE.as_ref()?;
    let caps = regex.captures(line.trim())?;
    let description = caps["desc"]
        .trim()
        .trim_matches(|c: char| c == '"' || c == '“' || c == '”')
        .trim()
        .to_string();
    if description.is_empty() {
        return None;
    }
    Some(Evidence {
        hash: caps["hash"].to_string(),
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_support::{commit_at, ts};

    fn sample(n: usize) -> Vec<Commit> {
        (0..n)
            .map(|i| {
                let mut c = commit_at(&format!("{:040x}", i + 1), ts(2024, 1, 1));
                c.message = format!("Change {i}");
                c.files_changed = (0..8).map(|f| format!("src/file{f}.rs")).collect();
                c.diff = "+x\n".repeat(200);
                c
            })
            .collect()
    }

    #[test]
    fn test_summary_prompt_limits() {
        let prompt = build_summary_prompt("auth", &sample(20));

        assert!(prompt.starts_with("Topic: auth\n\nCommits:\n"));
        assert_eq!(prompt.matches("- Commit:").count(), 15);
        assert!(prompt.contains("Files: src/file0.rs, src/file1.rs, src/file2.rs, src/file3.rs, src/file4.rs\n"));
        assert!(!prompt.contains("src/file5.rs"));
        assert!(prompt.ends_with("Provide a structured summary of how this feature evolved:"));
    }

    #[test]
    fn test_summary_prompt_truncates_diff() {
        let prompt = build_summary_prompt("auth", &sample(1));
        let diff_line = prompt.lines().find(|l| l.starts_with("  Diff: ")).unwrap();
        // Only the first line of the diff reaches this line, the rest follows
        assert!(diff_line.starts_with("  Diff: +x"));
        let diff_section: String = prompt
            .split("  Diff: ")
            .nth(1)
            .unwrap()
            .split("...")
            .next()
            .unwrap()
            .to_string();
        assert_eq!(diff_section.chars().count(), 300);
    }

    #[test]
    fn test_qa_prompt_shape() {
        let prompt = build_qa_prompt("Why JWT?", "auth", &sample(2));

        assert!(prompt.starts_with("Question: Why JWT?\nTopic: auth\n\nCommits:\n"));
        assert_eq!(prompt.matches("hash: \"").count(), 2);
        assert!(prompt.contains(r#"files_changed: ["src/file0.rs", "src/file1.rs", "src/file2.rs"],"#));
    }

    #[test]
    fn test_parse_qa_response() {
        let content = "Answer\nSummary: JWT replaced sessions to support the mobile app.\nIt landed in two steps.\n\nKey Evidence\n1945ab9c — \"Replace sessions with JWT\"\n- `aa00bb11` - \"Add refresh tokens\"\nnot evidence\n";
        let (answer, evidence) = parse_qa_response(content);

        assert_eq!(
            answer,
            "JWT replaced sessions to support the mobile app. It landed in two steps."
        );
        assert_eq!(
            evidence,
            vec![
                Evidence {
                    hash: "1945ab9c".to_string(),
                    description: "Replace sessions with JWT".to_string(),
                },
                Evidence {
                    hash: "aa00bb11".to_string(),
                    description: "Add refresh tokens".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_markdown_headings() {
        let content = "**Answer**\n**Summary:** Sessions were dropped.\n\n### Key Evidence\n* 1945ab9c — “Drop sessions”";
        let (answer, evidence) = parse_qa_response(content);

        assert_eq!(answer, "Sessions were dropped.");
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].description, "Drop sessions");
    }

    #[test]
    fn test_parse_unstructured_response() {
        let (answer, evidence) = parse_qa_response("  Insufficient evidence.  ");
        assert_eq!(answer, "Insufficient evidence.");
        assert!(evidence.is_empty());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }
}
