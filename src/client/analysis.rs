use super::AnalysisClient;
use crate::aggregate::{Aggregates, aggregate};
use crate::error::{AnalysisError, NarrativeError};
use crate::git::{Commit, GitWalker};
use crate::narrative::fallback::{
    INSUFFICIENT_EVIDENCE, fallback_answer, fallback_summary, insufficient_evidence_summary,
};
use crate::narrative::{NarrativeRequest, retain_known_evidence};
use crate::selector::{CommitSelector, Selection};
use crate::snapshot::SnapshotHandle;
use crate::summarizer::DiffSummarizer;
use crate::topic::TopicMatcher;
use crate::types::{
    AnalysisResult, AnalyzeRequest, NarrativeStatus, QaResult, SelectionInfo, TimelineEntry,
};
use std::time::Instant;

/// Output of the blocking history stage
struct HistoryStage {
    selection: Selection,
    commits: Vec<Commit>,
    aggregates: Aggregates,
}

/// Narrative text with its provenance
struct Narration {
    summary_text: String,
    status: NarrativeStatus,
    qa: Option<QaResult>,
}

/// Run the full pipeline for one request
pub(crate) async fn do_analyze(
    client: &AnalysisClient,
    request: AnalyzeRequest,
) -> Result<AnalysisResult, AnalysisError> {
    let start = Instant::now();
    request.validate()?;

    let topic = client.topics.resolve(&request.topic);
    let matcher = TopicMatcher::new(&topic, client.config.selection.max_paths_per_commit)?;

    tracing::info!(
        "Analyzing '{}' in {} ({} keywords, {} path patterns)",
        topic.name,
        request.repository_url,
        topic.keywords.len(),
        topic.paths.len()
    );

    let handle = client
        .provider
        .acquire(&request.repository_url, &topic)
        .await?;
    let repository_url = handle.url().to_string();

    let stage = read_history(client, handle, matcher).await?;

    tracing::info!(
        "Selected {} commits (scanned {}, window {} months{})",
        stage.selection.matched(),
        stage.selection.scanned,
        stage.selection.months_back_used,
        if stage.selection.widened { ", widened" } else { "" }
    );

    let selection = SelectionInfo {
        months_back_used: stage.selection.months_back_used,
        widened: stage.selection.widened,
        scanned: stage.selection.scanned,
        matched: stage.selection.matched(),
    };

    let narrative_request = NarrativeRequest {
        topic: topic.name.clone(),
        commits: stage.commits,
        aggregates: stage.aggregates,
        question: request.question().map(str::to_string),
    };
    let narration = narrate(client, &narrative_request).await;

    let NarrativeRequest {
        commits,
        aggregates,
        ..
    } = narrative_request;
    let hotspots = aggregates
        .top_hotspots(client.config.summary.hotspot_limit)
        .to_vec();
    let timeline = commits.iter().map(TimelineEntry::from).collect();

    let duration_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        "Analysis of '{}' finished in {} ms ({:?})",
        topic.name,
        duration_ms,
        narration.status
    );

    Ok(AnalysisResult {
        repository_url,
        topic: topic.name,
        summary_text: narration.summary_text,
        narrative: narration.status,
        commits,
        timeline,
        ownership: aggregates.ownership,
        hotspots,
        complexity_trend: aggregates.complexity,
        qa: narration.qa,
        selection,
        duration_ms,
    })
}

/// Select, summarize and aggregate on a blocking thread
///
/// The handle is moved into the task so the snapshot directory outlives the
/// history walk even if its cache entry is evicted meanwhile.
async fn read_history(
    client: &AnalysisClient,
    handle: SnapshotHandle,
    matcher: TopicMatcher,
) -> Result<HistoryStage, AnalysisError> {
    let window = client.config.selection.window();
    window.validate()?;

    let diff_scan_chars = client.config.selection.diff_scan_chars;
    let summarizer = DiffSummarizer::new(
        client.config.summary.max_diff_chars,
        client.config.summary.max_display_files,
    );
    let now = client.clock.now();

    tokio::task::spawn_blocking(move || -> Result<HistoryStage, AnalysisError> {
        let walker = GitWalker::open(handle.path())?.with_diff_scan_chars(diff_scan_chars);
        let selection = CommitSelector::select(&walker, &matcher, &window, now)?;
        let commits = summarizer.summarize_all(&selection.commits, &matcher);
        let aggregates = aggregate(&commits);
        drop(handle);

        Ok(HistoryStage {
            selection,
            commits,
            aggregates,
        })
    })
    .await
    .map_err(|e| AnalysisError::other(format!("History stage panicked: {}", e)))?
}

/// Ask the narrative service, degrading to local fallbacks on any failure
async fn narrate(client: &AnalysisClient, request: &NarrativeRequest) -> Narration {
    if request.commits.is_empty() {
        tracing::info!(
            "No commits selected for '{}', skipping narrative service",
            request.topic
        );
        return Narration {
            summary_text: insufficient_evidence_summary(&request.topic),
            status: NarrativeStatus::InsufficientEvidence,
            qa: request.question.as_ref().map(|question| QaResult {
                question: question.clone(),
                answer: INSUFFICIENT_EVIDENCE.to_string(),
                evidence: Vec::new(),
            }),
        };
    }

    let timeout = client.config.narrative.timeout();
    let outcome = match tokio::time::timeout(timeout, client.narrator.narrate(request)).await {
        Ok(Ok(response)) if response.summary_text.trim().is_empty() => {
            Err(NarrativeError::EmptyResponse)
        }
        Ok(outcome) => outcome,
        Err(_) => Err(NarrativeError::Timeout(timeout.as_secs())),
    };

    match outcome {
        Ok(response) => {
            let answer = response
                .qa_answer
                .filter(|answer| !answer.trim().is_empty());
            let qa = request.question.as_ref().map(|question| match answer {
                Some(answer) => QaResult {
                    question: question.clone(),
                    answer,
                    evidence: retain_known_evidence(response.evidence, &request.commits),
                },
                None => local_answer(question, &request.commits),
            });
            Narration {
                summary_text: response.summary_text,
                status: NarrativeStatus::Generated,
                qa,
            }
        }
        Err(e) => {
            tracing::warn!("Narrative service failed, using fallback summary: {}", e);
            Narration {
                summary_text: fallback_summary(&request.topic, &request.commits),
                status: NarrativeStatus::Fallback {
                    reason: e.to_string(),
                },
                qa: request
                    .question
                    .as_ref()
                    .map(|question| local_answer(question, &request.commits)),
            }
        }
    }
}

fn local_answer(question: &str, commits: &[Commit]) -> QaResult {
    let (answer, evidence) = fallback_answer(question, commits);
    QaResult {
        question: question.to_string(),
        answer,
        evidence,
    }
}
