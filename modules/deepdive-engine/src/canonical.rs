//! URL normalization, platform classification and canonical profile forms.
//!
//! Every candidate URL passes through here before it reaches the identity
//! validator. A `None` anywhere in this module means "drop the candidate".

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use deepdive_common::{normalize_token, Lead, ProfileType};

/// Path segments that name a platform feature rather than a person.
pub const GENERIC_PROFILE_HANDLES: &[&str] = &[
    "watch", "feed", "feeds", "home", "explore", "reels", "shorts", "videos", "channel",
    "channels", "user", "users", "about", "search", "results",
];

/// Hosts that never identify a lead's own website.
pub const WEBSITE_HOST_BLOCKLIST: &[&str] =
    &["facebook.com", "m.facebook.com", "fb.com", "soundersfc.com"];

/// "Link in bio" hubs. Canonical form keeps the first path segment as a slug.
pub const LINK_AGGREGATOR_HOSTS: &[&str] = &[
    "linktr.ee",
    "linktree.com",
    "beacons.ai",
    "beacons.page",
    "bio.site",
    "carrd.co",
    "allmylinks.com",
    "solo.to",
];

pub const SHORTENER_HOSTS: &[&str] = &["t.co", "bit.ly", "tinyurl.com", "ow.ly", "buff.ly", "lnkd.in"];

const LINKEDIN_MARKERS: &[&str] = &["in", "company", "school", "showcase"];
const YOUTUBE_ID_PREFIXES: &[&str] = &["channel", "c", "user"];

static BARE_DOMAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9.-]+\.[a-z]{2,}(?:/.*)?$").unwrap());

/// Validate and lightly normalize a raw URL: http(s) only, host required,
/// fragment removed, search-engine result pages rejected.
pub fn normalize_url(raw: &str) -> Option<String> {
    let value = raw.trim();
    let lower = value.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return None;
    }
    let mut url = Url::parse(value).ok()?;
    let host = url.host_str().filter(|h| !h.is_empty())?.to_ascii_lowercase();
    if is_search_engine_page(&host, url.path()) {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

fn is_search_engine_page(host: &str, path: &str) -> bool {
    if host.contains("duckduckgo") {
        return true;
    }
    let bare = host.trim_start_matches("www.");
    let engine = bare.starts_with("google.") || bare == "bing.com";
    engine && (path.starts_with("/search") || path.starts_with("/url"))
}

/// Lowercased host without a leading `www.`.
pub fn bare_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }
    Some(host.trim_start_matches("www.").to_string())
}

fn on_domain(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Platform a URL belongs to. `None` for unparseable URLs, search pages and
/// known non-identity platforms.
pub fn classify(url: &str) -> Option<ProfileType> {
    let host = bare_host(url)?;
    if host.contains("duckduckgo") {
        return None;
    }

    if on_domain(&host, "x.com") || on_domain(&host, "twitter.com") {
        Some(ProfileType::X)
    } else if on_domain(&host, "linkedin.com") {
        Some(ProfileType::Linkedin)
    } else if on_domain(&host, "youtube.com") || host == "youtu.be" {
        Some(ProfileType::Youtube)
    } else if on_domain(&host, "instagram.com") {
        Some(ProfileType::Instagram)
    } else if on_domain(&host, "tiktok.com") {
        Some(ProfileType::Tiktok)
    } else if on_domain(&host, "reddit.com") {
        Some(ProfileType::Reddit)
    } else if on_domain(&host, "facebook.com") || host == "fb.com" {
        None
    } else {
        Some(ProfileType::Website)
    }
}

fn segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|parts| {
            parts
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// True when a handle normalizes to nothing or to a platform feature name.
pub fn is_generic_handle(handle: &str) -> bool {
    let normalized = normalize_token(handle);
    normalized.is_empty() || GENERIC_PROFILE_HANDLES.contains(&normalized.as_str())
}

fn person_handle(segment: Option<&String>) -> Option<String> {
    let handle = segment?.trim_start_matches('@').to_string();
    if is_generic_handle(&handle) {
        return None;
    }
    Some(handle)
}

/// Reduce `url` to the single canonical form for `profile_type`.
///
/// Canonicalizing a canonical URL returns it unchanged.
pub fn canonical_url(url: &str, profile_type: ProfileType) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segs = segments(&parsed);

    match profile_type {
        ProfileType::X => Some(format!("https://x.com/{}", person_handle(segs.first())?)),
        ProfileType::Instagram => Some(format!(
            "https://www.instagram.com/{}",
            person_handle(segs.first())?
        )),
        ProfileType::Tiktok => Some(format!(
            "https://www.tiktok.com/@{}",
            person_handle(segs.first())?
        )),
        ProfileType::Reddit => {
            let first = segs.first()?.to_ascii_lowercase();
            let name = match first.as_str() {
                "user" | "u" => person_handle(segs.get(1))?,
                "r" => return None,
                _ => person_handle(segs.first())?,
            };
            Some(format!("https://www.reddit.com/user/{name}"))
        }
        ProfileType::Linkedin => {
            let marker = segs
                .iter()
                .position(|s| LINKEDIN_MARKERS.contains(&s.to_ascii_lowercase().as_str()))?;
            let id = person_handle(segs.get(marker + 1))?;
            Some(format!(
                "https://www.linkedin.com/{}/{}",
                segs[marker].to_ascii_lowercase(),
                id
            ))
        }
        ProfileType::Youtube => {
            if parsed.host_str() == Some("youtu.be") {
                return None;
            }
            let first = segs.first()?;
            let prefix = first.to_ascii_lowercase();
            if YOUTUBE_ID_PREFIXES.contains(&prefix.as_str()) {
                let id = person_handle(segs.get(1))?;
                return Some(format!("https://www.youtube.com/{prefix}/{id}"));
            }
            Some(format!("https://www.youtube.com/@{}", person_handle(Some(first))?))
        }
        ProfileType::Website => {
            let host = parsed.host_str()?.to_ascii_lowercase();
            if WEBSITE_HOST_BLOCKLIST.contains(&host.trim_start_matches("www.")) {
                return None;
            }
            if is_link_aggregator(url) {
                let slug = segs.first()?.trim_start_matches('@').to_string();
                if slug.is_empty() {
                    return None;
                }
                return Some(format!("{}://{}/{}", parsed.scheme(), host, slug));
            }
            Some(format!("{}://{}/", parsed.scheme(), host))
        }
    }
}

/// The account identifier embedded in a profile URL. Websites have none.
pub fn extract_handle(url: &str, profile_type: ProfileType) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segs = segments(&parsed);
    let first = segs.first()?;

    let handle = match profile_type {
        ProfileType::X | ProfileType::Instagram => first.clone(),
        ProfileType::Tiktok => first.trim_start_matches('@').to_string(),
        ProfileType::Reddit => match first.to_ascii_lowercase().as_str() {
            "user" | "u" if segs.len() > 1 => segs[1].clone(),
            _ => first.clone(),
        },
        ProfileType::Linkedin => segs
            .iter()
            .position(|s| LINKEDIN_MARKERS.contains(&s.to_ascii_lowercase().as_str()))
            .and_then(|i| segs.get(i + 1))
            .unwrap_or(first)
            .clone(),
        ProfileType::Youtube => {
            if let Some(handle) = first.strip_prefix('@') {
                handle.to_string()
            } else if YOUTUBE_ID_PREFIXES.contains(&first.to_ascii_lowercase().as_str())
                && segs.len() > 1
            {
                segs[1].clone()
            } else {
                first.clone()
            }
        }
        ProfileType::Website => return None,
    };
    Some(handle)
}

pub fn is_link_aggregator(url: &str) -> bool {
    let Some(host) = bare_host(url) else {
        return false;
    };
    LINK_AGGREGATOR_HOSTS.iter().any(|agg| on_domain(&host, agg))
}

pub fn is_shortener(url: &str) -> bool {
    bare_host(url)
        .map(|host| SHORTENER_HOSTS.contains(&host.as_str()))
        .unwrap_or(false)
}

pub fn same_host(first: &str, second: &str) -> bool {
    let host = |u: &str| {
        Url::parse(u)
            .ok()
            .and_then(|p| p.host_str().map(str::to_ascii_lowercase))
    };
    match (host(first), host(second)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Map a free-form platform label ("LinkedIn", "X / Twitter") to a profile type.
pub fn platform_profile_type(platform: &str) -> Option<ProfileType> {
    let value = platform.to_lowercase();
    let words: Vec<&str> = value
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if words.contains(&"x") || value.contains("twitter") {
        Some(ProfileType::X)
    } else if value.contains("linkedin") {
        Some(ProfileType::Linkedin)
    } else if value.contains("youtube") {
        Some(ProfileType::Youtube)
    } else if value.contains("instagram") {
        Some(ProfileType::Instagram)
    } else if value.contains("tiktok") {
        Some(ProfileType::Tiktok)
    } else if value.contains("reddit") {
        Some(ProfileType::Reddit)
    } else {
        None
    }
}

/// Profile URL implied by the lead's declared platform and handle.
pub fn lead_handle_url(lead: &Lead) -> Option<String> {
    let handle = lead.handle.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
    let lower = handle.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(handle.to_string());
    }

    let cleaned = handle.trim_start_matches('@');
    if cleaned.is_empty() {
        return None;
    }
    let platform = lead.platform.as_deref().and_then(platform_profile_type);
    let url = match platform {
        Some(ProfileType::X) => format!("https://x.com/{cleaned}"),
        Some(ProfileType::Linkedin) => format!("https://www.linkedin.com/in/{cleaned}"),
        Some(ProfileType::Youtube) => format!("https://www.youtube.com/@{cleaned}"),
        Some(ProfileType::Instagram) => format!("https://www.instagram.com/{cleaned}"),
        Some(ProfileType::Tiktok) => format!("https://www.tiktok.com/@{cleaned}"),
        Some(ProfileType::Reddit) => format!("https://www.reddit.com/user/{cleaned}"),
        Some(ProfileType::Website) | None if cleaned.contains('.') => format!("https://{cleaned}"),
        Some(ProfileType::Website) | None => return None,
    };
    Some(url)
}

/// The lead's stored website as a URL. Bare domains gain `https://`.
pub fn seed_website(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    let lower = value.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(value.to_string());
    }
    if BARE_DOMAIN.is_match(value) {
        return Some(format!("https://{value}"));
    }
    Some(value.to_string())
}
