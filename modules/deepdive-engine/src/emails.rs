use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use deepdive_common::{DiscoveredEmail, Dossier};

static ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").unwrap());

/// Distinct, valid addresses seen on scraped pages, tagged with the page they came from.
pub fn harvest_emails(dossiers: &[Dossier], max: usize) -> Vec<DiscoveredEmail> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for dossier in dossiers {
        let source = Some(dossier.url.trim().to_string()).filter(|u| !u.is_empty());
        for candidate in &dossier.emails {
            let email = candidate.trim().to_lowercase();
            if email.is_empty() || !ADDRESS.is_match(&email) || !seen.insert(email.clone()) {
                continue;
            }
            found.push(DiscoveredEmail {
                email,
                source: source.clone(),
            });
            if found.len() >= max {
                return found;
            }
        }
    }
    found
}
