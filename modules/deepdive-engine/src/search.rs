use std::collections::HashSet;

use tracing::{info, warn};

use deepdive_common::{squish, DeepDiveConfig, SearchResult};

use crate::canonical::normalize_url;
use crate::context::RunContext;
use crate::traits::SearchProvider;

/// Run `queries` in order and keep the first result for each normalized URL,
/// stopping once `max_search_results` are collected. Provider failures count
/// as an empty page plus a warning.
pub async fn collect_results(
    provider: &dyn SearchProvider,
    ctx: &mut RunContext,
    queries: &[String],
    config: &DeepDiveConfig,
) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for query in queries {
        if results.len() >= config.max_search_results {
            break;
        }
        let outcome = match provider.search(query, config.search_results_per_query).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(query = query.as_str(), error = %e, "Search failed");
                ctx.record_warning(&format!("Search failed: {e}"), query);
                continue;
            }
        };

        if let Some(warning) = outcome.warning.as_deref().map(squish).filter(|w| !w.is_empty()) {
            ctx.record_warning(&warning, query);
        }
        if let Some(source) = outcome.source.as_deref().map(squish).filter(|s| !s.is_empty()) {
            ctx.record_source(&source);
        }

        for result in outcome.results {
            let Some(normalized) = normalize_url(&result.url) else {
                continue;
            };
            if !seen.insert(normalized) {
                continue;
            }
            results.push(SearchResult {
                query: if result.query.is_empty() { query.clone() } else { result.query },
                ..result
            });
            if results.len() >= config.max_search_results {
                break;
            }
        }
    }

    info!(queries = queries.len(), results = results.len(), "Search complete");
    results
}

#[cfg(test)]
mod tests {
    use deepdive_common::{ProviderError, SearchOutcome};
    use uuid::Uuid;

    use super::*;
    use crate::clues::LeadIdentity;
    use crate::testing::MockSearch;

    fn hit(url: &str) -> SearchResult {
        SearchResult {
            title: "t".into(),
            url: url.into(),
            snippet: "s".into(),
            query: String::new(),
        }
    }

    #[tokio::test]
    async fn dedups_across_queries_and_records_diagnostics() {
        let search = MockSearch::new()
            .on_query("q1", vec![hit("https://avery.film/#top"), hit("https://x.com/avlin")])
            .on_query("q2", vec![hit("https://avery.film/"), hit("https://duckduckgo.com/?q=a")])
            .on_outcome(
                "q3",
                SearchOutcome {
                    results: vec![],
                    warning: Some("Search quota exceeded".into()),
                    source: Some("serper".into()),
                },
            );
        let mut ctx = RunContext::new(Uuid::nil(), LeadIdentity::default());
        let queries = vec!["q1".to_string(), "q2".to_string(), "q3".to_string()];

        let results = collect_results(&search, &mut ctx, &queries, &DeepDiveConfig::default()).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].query, "q1");
        assert_eq!(ctx.warnings(4), vec!["Search quota exceeded (query: q3)".to_string()]);
        assert_eq!(ctx.sources(), vec!["serper".to_string()]);
    }

    #[tokio::test]
    async fn stops_at_global_cap() {
        let many: Vec<SearchResult> = (0..10).map(|i| hit(&format!("https://site{i}.example/"))).collect();
        let more: Vec<SearchResult> = (10..20).map(|i| hit(&format!("https://site{i}.example/"))).collect();
        let search = MockSearch::new().on_query("a", many).on_query("b", more);
        let config = DeepDiveConfig {
            max_search_results: 12,
            ..Default::default()
        };
        let mut ctx = RunContext::new(Uuid::nil(), LeadIdentity::default());
        let queries = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let results = collect_results(&search, &mut ctx, &queries, &config).await;
        assert_eq!(results.len(), 12);
        assert_eq!(search.calls(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn provider_errors_become_warnings() {
        let search = MockSearch::new().failing(ProviderError::Unavailable("down".into()));
        let mut ctx = RunContext::new(Uuid::nil(), LeadIdentity::default());
        let results =
            collect_results(&search, &mut ctx, &["q".to_string()], &DeepDiveConfig::default()).await;
        assert!(results.is_empty());
        assert_eq!(ctx.warnings(4).len(), 1);
    }
}
