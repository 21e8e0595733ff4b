//! Report synthesizer
//!
//! Pure function from (brief, findings, completion reason) to [`Report`].
//! Findings are traversed in sub-topic order (round, then index), citations
//! are numbered on first sight and deduplicated by `source_id`. The same
//! inputs always produce the same report.

use std::collections::HashMap;

use super::state::{
    CompletionReason, EvidenceSection, Finding, ResearchBrief, Report, ReportCitation,
};
use crate::error::EmptyResearchError;

/// Notice placed on any report built from forced or incomplete research
pub const PARTIAL_NOTICE: &str = "partial — research budget reached";

/// Longest sentence quoted in the direct answer
const MAX_ANSWER_CHARS: usize = 300;

/// Build the final report.
///
/// With no findings a minimal report is still produced and returned inside
/// [`EmptyResearchError`].
pub fn synthesize(
    brief: &ResearchBrief,
    findings: &[Finding],
    completion: Option<&CompletionReason>,
) -> Result<Report, EmptyResearchError> {
    let mut ordered: Vec<&Finding> = findings.iter().collect();
    ordered.sort_by_key(|f| f.subtopic_id);

    let mut citations: Vec<ReportCitation> = Vec::new();
    let mut numbers: HashMap<&str, usize> = HashMap::new();
    let mut evidence = Vec::with_capacity(ordered.len());

    for finding in &ordered {
        let mut section_numbers = Vec::new();
        for citation in &finding.citations {
            let number = *numbers.entry(citation.source_id.as_str()).or_insert_with(|| {
                citations.push(ReportCitation {
                    number: citations.len() + 1,
                    source_id: citation.source_id.clone(),
                    title: citation.title.clone(),
                    locator: citation.locator.clone(),
                });
                citations.len()
            });
            if !section_numbers.contains(&number) {
                section_numbers.push(number);
            }
        }

        evidence.push(EvidenceSection {
            subtopic_id: finding.subtopic_id,
            topic: finding.topic.clone(),
            summary: finding.summary.clone(),
            citation_numbers: section_numbers,
            incomplete: finding.incomplete_cause().map(|c| c.to_string()),
        });
    }

    let partial_notice = partial_notice(&ordered, completion);

    if ordered.is_empty() {
        let report = Report {
            question: brief.original_request.clone(),
            direct_answer: "No findings were produced for this request, so no answer could be established."
                .to_string(),
            evidence,
            citations,
            partial_notice,
            usage: None,
        };
        return Err(EmptyResearchError {
            report: Box::new(report),
        });
    }

    Ok(Report {
        question: brief.original_request.clone(),
        direct_answer: direct_answer(brief, &evidence),
        evidence,
        citations,
        partial_notice,
        usage: None,
    })
}

fn partial_notice(findings: &[&Finding], completion: Option<&CompletionReason>) -> Option<String> {
    let mut notes = Vec::new();

    let incomplete = findings.iter().filter(|f| f.is_partial()).count();
    if incomplete > 0 {
        notes.push(format!(
            "{} of {} sub-topics incomplete",
            incomplete,
            findings.len()
        ));
    }
    if let Some(reason) = completion.filter(|r| r.is_forced()) {
        notes.push(reason.to_string());
    }

    if notes.is_empty() {
        None
    } else {
        Some(format!("{} ({})", PARTIAL_NOTICE, notes.join("; ")))
    }
}

fn direct_answer(brief: &ResearchBrief, evidence: &[EvidenceSection]) -> String {
    let mut out = match brief.clarified_questions.as_slice() {
        [only] if only == &brief.original_request => {
            format!("Findings for \"{}\":\n", brief.original_request)
        }
        questions => format!(
            "Findings for \"{}\" ({} questions researched):\n",
            brief.original_request,
            questions.len()
        ),
    };

    for section in evidence {
        let lead = match &section.incomplete {
            Some(cause) if section.citation_numbers.is_empty() => {
                format!("not established ({})", cause)
            }
            _ => first_sentence(&section.summary),
        };
        let refs: String = section
            .citation_numbers
            .iter()
            .map(|n| format!("[{}]", n))
            .collect();
        if refs.is_empty() {
            out.push_str(&format!("\n- **{}**: {}", section.topic, lead));
        } else {
            out.push_str(&format!("\n- **{}**: {} {}", section.topic, lead, refs));
        }
    }
    out
}

/// First sentence of a summary, capped in length.
fn first_sentence(text: &str) -> String {
    let text = text.trim();
    let line = text.lines().next().unwrap_or_default();
    let sentence = match line.find(". ") {
        Some(end) => &line[..=end],
        None => line,
    };

    if sentence.chars().count() <= MAX_ANSWER_CHARS {
        sentence.to_string()
    } else {
        let cut: String = sentence.chars().take(MAX_ANSWER_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolErrorKind;
    use crate::research::state::{Citation, FindingStatus, IncompleteCause, SubTopicId};

    fn citation(id: &str) -> Citation {
        Citation {
            source_id: id.to_string(),
            locator: None,
            title: id.to_uppercase(),
        }
    }

    fn finding(round: u32, index: u32, topic: &str, sources: &[&str]) -> Finding {
        Finding {
            subtopic_id: SubTopicId::new(round, index),
            topic: topic.to_string(),
            summary: format!("{} grew. More detail follows.", topic),
            citations: sources.iter().map(|s| citation(s)).collect(),
            status: FindingStatus::Complete,
        }
    }

    fn brief() -> ResearchBrief {
        ResearchBrief::new(
            "Compare GDP growth in France and Germany",
            vec!["France".into(), "Germany".into()],
            "Both covered",
        )
    }

    #[test]
    fn test_citations_numbered_first_seen_and_deduped() {
        let findings = vec![
            finding(1, 2, "Germany", &["destatis", "imf"]),
            finding(1, 1, "France", &["insee", "imf"]),
        ];
        let report = synthesize(&brief(), &findings, None).unwrap();

        let ids: Vec<&str> = report.citations.iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(ids, vec!["insee", "imf", "destatis"]);
        assert_eq!(report.evidence[0].topic, "France");
        assert_eq!(report.evidence[0].citation_numbers, vec![1, 2]);
        assert_eq!(report.evidence[1].citation_numbers, vec![3, 2]);
        assert!(report.partial_notice.is_none());
    }

    #[test]
    fn test_direct_answer_quotes_first_sentence() {
        let findings = vec![finding(1, 1, "France", &["insee"])];
        let report = synthesize(&brief(), &findings, None).unwrap();

        assert!(report.direct_answer.contains("- **France**: France grew. [1]"));
        assert!(!report.direct_answer.contains("More detail"));
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let findings = vec![
            finding(2, 1, "Follow-up", &["b"]),
            finding(1, 1, "France", &["a", "b"]),
        ];
        let first = synthesize(&brief(), &findings, None).unwrap();
        let second = synthesize(&brief(), &findings, None).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.to_markdown(), second.to_markdown());
    }

    #[test]
    fn test_partial_finding_flags_report() {
        let mut failed = finding(1, 2, "Germany", &[]);
        failed.status = FindingStatus::Partial {
            cause: IncompleteCause::ToolFailure {
                kind: ToolErrorKind::RateLimited,
            },
        };
        let findings = vec![finding(1, 1, "France", &["insee"]), failed];

        let report = synthesize(&brief(), &findings, None).unwrap();

        let notice = report.partial_notice.as_deref().unwrap();
        assert!(notice.starts_with(PARTIAL_NOTICE));
        assert!(notice.contains("1 of 2 sub-topics incomplete"));
        assert_eq!(report.evidence[1].incomplete.as_deref(), Some("RateLimited"));
        assert!(report.direct_answer.contains("**Germany**: not established (RateLimited)"));
    }

    #[test]
    fn test_forced_completion_flags_report() {
        let findings = vec![finding(1, 1, "France", &["insee"])];
        let reason = CompletionReason::RoundCeiling { rounds: 3 };

        let report = synthesize(&brief(), &findings, Some(&reason)).unwrap();
        assert!(report
            .partial_notice
            .unwrap()
            .contains("round ceiling reached after 3 rounds"));

        let satisfied = CompletionReason::Satisfied {
            rationale: "ok".into(),
        };
        assert!(synthesize(&brief(), &findings, Some(&satisfied))
            .unwrap()
            .partial_notice
            .is_none());
    }

    #[test]
    fn test_empty_findings_still_produce_minimal_report() {
        let err = synthesize(&brief(), &[], Some(&CompletionReason::SessionTimeout)).unwrap_err();

        assert_eq!(err.report.question, "Compare GDP growth in France and Germany");
        assert!(err.report.direct_answer.starts_with("No findings"));
        assert!(err.report.citations.is_empty());
        assert!(err.report.is_partial());
    }

    #[test]
    fn test_first_sentence_caps_length() {
        let long = "x".repeat(400);
        let sentence = first_sentence(&long);
        assert!(sentence.ends_with("..."));
        assert_eq!(sentence.chars().count(), MAX_ANSWER_CHARS + 3);
    }
}
