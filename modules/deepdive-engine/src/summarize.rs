use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use completion_client::strict_schema;
use deepdive_common::{
    truncate_text, Dossier, LeadRecord, LeadSummary, ProviderError, SearchResult,
};

use crate::candidates::CandidateMap;
use crate::identity::normalize_confidence;
use crate::traits::StructuredCompletion;

const MAX_EVIDENCE_LINES: usize = 10;
const ABOUT_EXCERPT_CHARS: usize = 260;
const FALLBACK_CONFIDENCE: f64 = 0.35;

/// Research summary for outreach.
#[derive(Deserialize, JsonSchema)]
struct SummaryResponse {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    outreach_angle: String,
    #[serde(default)]
    next_step: String,
    /// 0 to 1.
    #[serde(default)]
    #[schemars(with = "f64")]
    confidence: Value,
    /// One to six concrete findings from the evidence.
    #[serde(default)]
    #[schemars(length(min = 1, max = 6))]
    highlights: Vec<String>,
}

/// Numbered evidence lines from dossiers, or from search results when nothing was scraped.
pub fn evidence_lines(dossiers: &[Dossier], search_results: &[SearchResult]) -> Vec<String> {
    if !dossiers.is_empty() {
        return dossiers
            .iter()
            .take(MAX_EVIDENCE_LINES)
            .enumerate()
            .map(|(i, d)| {
                let mut line = format!("{}. [{}] {}", i + 1, d.profile_type, d.url);
                if !d.title.is_empty() {
                    line.push_str(&format!(" | {}", d.title));
                }
                if !d.description.is_empty() {
                    line.push_str(&format!(" | {}", d.description));
                }
                if !d.recent_posts.is_empty() {
                    let posts: Vec<&str> =
                        d.recent_posts.iter().take(2).map(String::as_str).collect();
                    line.push_str(&format!(" | Recent posts: {}", posts.join(" || ")));
                }
                if !d.about_text.is_empty() {
                    line.push_str(&format!(
                        " | About: {}",
                        truncate_text(&d.about_text, ABOUT_EXCERPT_CHARS)
                    ));
                }
                line
            })
            .collect();
    }

    search_results
        .iter()
        .take(MAX_EVIDENCE_LINES)
        .enumerate()
        .map(|(i, r)| format!("{}. {} | {} | {}", i + 1, r.title, r.url, r.snippet))
        .collect()
}

/// Deterministic summary built from which profile types were found.
pub fn fallback_summary(map: &CandidateMap, max_highlights: usize) -> LeadSummary {
    let found = map.found_types();
    let summary = if found.is_empty() {
        "No reliable profiles found.".to_string()
    } else {
        let names: Vec<&str> = found.iter().map(|t| t.as_str()).collect();
        format!("Found profile signals across: {}.", names.join(", "))
    };

    LeadSummary {
        summary,
        outreach_angle: "Reference one concrete piece of their recent public work.".to_string(),
        next_step: "Send one short message with a single CTA.".to_string(),
        confidence: FALLBACK_CONFIDENCE,
        highlights: found
            .iter()
            .take(max_highlights)
            .map(|t| format!("Found {t} profile."))
            .collect(),
    }
}

pub async fn summarize(
    completion: &dyn StructuredCompletion,
    record: &LeadRecord,
    search_results: &[SearchResult],
    dossiers: &[Dossier],
    map: &CandidateMap,
    max_highlights: usize,
) -> LeadSummary {
    let fallback = fallback_summary(map, max_highlights);
    let evidence = evidence_lines(dossiers, search_results);
    if evidence.is_empty() {
        return fallback;
    }

    match ask_for_summary(completion, record, &evidence).await {
        Ok(response) => merge_with_fallback(response, fallback, max_highlights),
        Err(e) => {
            warn!(error = %e, "Summary failed, using fallback");
            fallback
        }
    }
}

async fn ask_for_summary(
    completion: &dyn StructuredCompletion,
    record: &LeadRecord,
    evidence: &[String],
) -> Result<SummaryResponse, ProviderError> {
    let schema = strict_schema::<SummaryResponse>();
    let raw = completion
        .complete(SUMMARY_SYSTEM_PROMPT, &summary_user_prompt(record, evidence), &schema)
        .await?;
    serde_json::from_value(raw).map_err(|e| ProviderError::Malformed(format!("summary: {e}")))
}

fn merge_with_fallback(response: SummaryResponse, fallback: LeadSummary, max_highlights: usize) -> LeadSummary {
    let or_fallback = |value: String, fallback: String| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            fallback
        } else {
            trimmed.to_string()
        }
    };
    let highlights: Vec<String> = response
        .highlights
        .iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .take(max_highlights)
        .collect();

    LeadSummary {
        summary: or_fallback(response.summary, fallback.summary),
        outreach_angle: or_fallback(response.outreach_angle, fallback.outreach_angle),
        next_step: or_fallback(response.next_step, fallback.next_step),
        confidence: normalize_confidence(&response.confidence),
        highlights: if highlights.is_empty() {
            fallback.highlights
        } else {
            highlights
        },
    }
}

const SUMMARY_SYSTEM_PROMPT: &str = "\
You analyze research evidence about a sales lead.
Rules:
- Use only the evidence provided. Do not invent facts.
- Prefer concrete findings from profiles, websites and recent posts.
- Keep it practical and short.
Return JSON only.";

fn summary_user_prompt(record: &LeadRecord, evidence: &[String]) -> String {
    let lead = &record.lead;
    format!(
        "Lead:\n\
         - Name: {name}\n\
         - Platform: {platform}\n\
         - Handle: {handle}\n\
         - Website: {website}\n\
         - Role: {role}\n\
         - Notes: {notes}\n\
         - Category: {category}\n\n\
         Evidence:\n{evidence}\n\n\
         Task:\n\
         1) Summarize who this lead appears to be, factually.\n\
         2) Suggest an outreach angle.\n\
         3) Suggest the smallest next step to contact them.\n\
         4) List 3-6 concrete highlights from the evidence.\n\
         5) Confidence is 0 to 1.",
        name = lead.name,
        platform = lead.platform.as_deref().unwrap_or(""),
        handle = lead.handle.as_deref().unwrap_or(""),
        website = lead.website.as_deref().unwrap_or(""),
        role = lead.role.as_deref().unwrap_or(""),
        notes = lead.notes.as_deref().unwrap_or(""),
        category = lead.category.as_deref().unwrap_or(""),
        evidence = evidence.join("\n"),
    )
}
