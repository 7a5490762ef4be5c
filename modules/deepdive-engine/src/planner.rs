use std::collections::HashSet;

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use completion_client::strict_schema;
use deepdive_common::{presence, squish, truncate_text, LeadRecord, ProviderError};

use crate::traits::StructuredCompletion;

const PROMPT_SIGNALS: usize = 8;
const PROMPT_COMMUNICATIONS: usize = 6;
const PROMPT_PROFILES: usize = 12;

/// Search queries that target the lead's other profiles and official website.
#[derive(Deserialize, JsonSchema)]
struct QueryPlan {
    queries: Vec<String>,
}

/// Trim, squish, drop blanks and duplicates, keep at most `max`.
pub fn normalize_queries<I, S>(raw: I, max: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|q| squish(q.as_ref()))
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.clone()))
        .take(max)
        .collect()
}

/// Completion-planned queries, or the deterministic list when planning fails
/// or comes back empty.
pub async fn plan_queries(
    completion: &dyn StructuredCompletion,
    record: &LeadRecord,
    max: usize,
) -> Vec<String> {
    match planned_queries(completion, record, max).await {
        Ok(queries) if !queries.is_empty() => {
            info!(count = queries.len(), "Queries planned");
            queries
        }
        Ok(_) => {
            warn!("Query planner returned nothing, using fallback queries");
            fallback_queries(record, max)
        }
        Err(e) => {
            warn!(error = %e, "Query planning failed, using fallback queries");
            fallback_queries(record, max)
        }
    }
}

async fn planned_queries(
    completion: &dyn StructuredCompletion,
    record: &LeadRecord,
    max: usize,
) -> Result<Vec<String>, ProviderError> {
    let schema = strict_schema::<QueryPlan>();
    let raw = completion
        .complete(PLANNER_SYSTEM_PROMPT, &planner_user_prompt(record), &schema)
        .await?;
    let plan: QueryPlan = serde_json::from_value(raw)
        .map_err(|e| ProviderError::Malformed(format!("query plan: {e}")))?;
    Ok(normalize_queries(plan.queries, max))
}

pub fn fallback_queries(record: &LeadRecord, max: usize) -> Vec<String> {
    let lead = &record.lead;
    let name = lead.name.trim();
    let handle = presence(&lead.handle).map(|h| h.trim_start_matches('@')).filter(|h| !h.is_empty());
    let role = presence(&lead.role);

    let base = [
        (!name.is_empty()).then(|| format!("\"{name}\"")),
        handle.map(str::to_string),
        role.map(str::to_string),
        presence(&lead.country).map(str::to_string),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");

    let mut queries = vec![
        base,
        format!("{name} official website"),
        format!("{name} profile"),
    ];
    if let Some(platform) = presence(&lead.platform) {
        queries.push(format!("{name} {platform} profile"));
    }
    if let Some(handle) = handle {
        for site in ["linkedin.com", "x.com", "instagram.com", "youtube.com"] {
            queries.push(format!("{name} {handle} site:{site}"));
        }
        queries.push(format!("{name} {handle} linktree OR beacons OR carrd OR bio.site"));
    }
    queries.push(format!("{name} portfolio"));
    queries.push(format!("{name} contact"));
    queries.push(format!("{name} interviews"));
    if let Some(role) = role {
        queries.push(format!("{name} {role}"));
    }

    normalize_queries(queries, max)
}

const PLANNER_SYSTEM_PROMPT: &str = "\
You plan web searches that find more public profiles of one specific person.
Goal: their other social profiles, official website, public contact details and portfolio links.

Approach:
1. Start from what is known: exact name, username, role, location, employer, known website.
2. Write platform-targeted queries for LinkedIn, X, Instagram, YouTube and a personal site.
3. Add link-in-bio discovery (linktree, beacons, carrd, bio.site) when it fits.

Rules:
- Vary full name, full name + role, full name + company, full name + location and the username.
- Do not add niche labels the evidence does not support.
- Precision over recall. No keyword stuffing.
Return JSON only.";

fn planner_user_prompt(record: &LeadRecord) -> String {
    let lead = &record.lead;

    let signals: Vec<String> = record
        .recent_signals()
        .into_iter()
        .take(PROMPT_SIGNALS)
        .map(|s| {
            let content = s.content.as_deref().map(|c| truncate_text(c, 180));
            [
                Some(s.source.clone()),
                s.author_name.clone(),
                s.author_handle.clone(),
                s.title.clone(),
                content,
            ]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" | ")
        })
        .collect();

    let communications: Vec<String> = record
        .recent_communications()
        .into_iter()
        .take(PROMPT_COMMUNICATIONS)
        .map(|c| {
            let notes = c.notes.as_deref().map(|n| truncate_text(n, 160));
            [Some(c.channel.clone()), c.summary.clone(), notes]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect();

    let profiles: Vec<String> = record
        .social_profiles
        .iter()
        .take(PROMPT_PROFILES)
        .map(|p| {
            [Some(p.profile_type.clone()), p.handle.clone(), Some(p.url.clone())]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect();

    let or_none = |lines: &[String]| {
        if lines.is_empty() {
            "none".to_string()
        } else {
            lines.join("\n")
        }
    };

    format!(
        "Lead:\n\
         - Name: {name}\n\
         - Platform: {platform}\n\
         - Handle: {handle}\n\
         - Role: {role}\n\
         - Country: {country}\n\
         - Notes: {notes}\n\
         - Category: {category}\n\n\
         Recent signals:\n{signals}\n\n\
         Existing profile hints:\n{profiles}\n\n\
         Communication hints:\n{communications}\n\n\
         Produce 6-10 high-signal search queries that find this exact person's other profiles and official website.",
        name = lead.name,
        platform = lead.platform.as_deref().unwrap_or(""),
        handle = lead.handle.as_deref().unwrap_or(""),
        role = lead.role.as_deref().unwrap_or(""),
        country = lead.country.as_deref().unwrap_or(""),
        notes = truncate_text(lead.notes.as_deref().unwrap_or(""), 500),
        category = lead.category.as_deref().unwrap_or(""),
        signals = or_none(&signals),
        profiles = or_none(&profiles),
        communications = or_none(&communications),
    )
}

#[cfg(test)]
mod tests {
    use deepdive_common::Lead;

    use super::*;

    #[test]
    fn normalize_dedups_and_caps() {
        let raw = ["  avery   lin ", "avery lin", "", "a", "b", "c"];
        assert_eq!(normalize_queries(raw, 3), vec!["avery lin", "a", "b"]);
    }

    #[test]
    fn fallback_with_handle_and_role() {
        let lead = Lead {
            role: Some("Director".into()),
            country: Some("NZ".into()),
            ..Lead::new("Avery Lin").with_platform("YouTube", "@avlinfilms")
        };
        let queries = fallback_queries(&LeadRecord::new(lead), 10);
        assert_eq!(queries.len(), 10);
        assert_eq!(queries[0], "\"Avery Lin\" avlinfilms Director NZ");
        assert_eq!(queries[1], "Avery Lin official website");
        assert_eq!(queries[3], "Avery Lin YouTube profile");
        assert_eq!(queries[4], "Avery Lin avlinfilms site:linkedin.com");
        assert_eq!(queries[8], "Avery Lin avlinfilms linktree OR beacons OR carrd OR bio.site");
        assert_eq!(queries[9], "Avery Lin portfolio");
    }

    #[test]
    fn fallback_without_handle() {
        let queries = fallback_queries(&LeadRecord::new(Lead::new("Avery Lin")), 10);
        assert_eq!(
            queries,
            vec![
                "\"Avery Lin\"",
                "Avery Lin official website",
                "Avery Lin profile",
                "Avery Lin portfolio",
                "Avery Lin contact",
                "Avery Lin interviews",
            ]
        );
    }
}
