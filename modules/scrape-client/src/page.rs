//! HTML to profile-snapshot fields.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

const MAX_TEXT_CHARS: usize = 4000;
const MAX_LINKS: usize = 30;
const MAX_EMAILS: usize = 20;

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static META: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta[content]").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap()
});

const SKIPPED_TEXT_PARENTS: &[&str] = &["script", "style", "noscript", "template", "svg"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub title: String,
    pub description: String,
    pub text: String,
    pub links: Vec<String>,
    pub emails: Vec<String>,
    pub about_url: Option<String>,
}

/// Extract title, description, visible text, outbound links, emails and an "about"
/// link from rendered HTML. Relative links resolve against `base_url`.
pub fn parse_page(html: &str, base_url: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| collapse(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(&document, "og:title"))
        .unwrap_or_default();

    let description = meta_content(&document, "description")
        .or_else(|| meta_content(&document, "og:description"))
        .unwrap_or_default();

    let text = visible_text(&document);

    let mut links = Vec::new();
    let mut seen_links = HashSet::new();
    let mut emails = Vec::new();
    let mut seen_emails = HashSet::new();

    for anchor in document.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if let Some(address) = href.strip_prefix("mailto:") {
            let address = address.split('?').next().unwrap_or("").to_lowercase();
            if EMAIL.is_match(&address) && seen_emails.insert(address.clone()) {
                emails.push(address);
            }
            continue;
        }
        let Some(resolved) = resolve(base.as_ref(), href) else {
            continue;
        };
        if seen_links.insert(resolved.clone()) {
            links.push(resolved);
        }
    }

    for found in EMAIL.find_iter(&text) {
        let address = found.as_str().trim_end_matches('.').to_lowercase();
        if seen_emails.insert(address.clone()) {
            emails.push(address);
        }
    }

    let about_url = base.as_ref().and_then(|base| {
        links
            .iter()
            .find(|link| {
                Url::parse(link)
                    .map(|u| u.host_str() == base.host_str() && u.path().to_lowercase().contains("about"))
                    .unwrap_or(false)
            })
            .cloned()
    });

    links.truncate(MAX_LINKS);
    emails.truncate(MAX_EMAILS);

    ParsedPage {
        title,
        description,
        text,
        links,
        emails,
        about_url,
    }
}

fn meta_content(document: &Html, key: &str) -> Option<String> {
    document
        .select(&META)
        .find(|m| {
            let el = m.value();
            el.attr("name").or_else(|| el.attr("property")) == Some(key)
        })
        .and_then(|m| m.value().attr("content"))
        .map(collapse)
        .filter(|c| !c.is_empty())
}

fn visible_text(document: &Html) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| SKIPPED_TEXT_PARENTS.contains(&e.name()) || e.name() == "head")
                .unwrap_or(false)
        });
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    let joined = collapse(&parts.join(" "));
    joined.chars().take(MAX_TEXT_CHARS).collect()
}

fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    let mut url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html>
<head>
  <title> Avery Lin | Films </title>
  <meta name="description" content="AI short films by Avery Lin">
  <script>var tracking = "ignored@example.com";</script>
</head>
<body>
  <h1>Avery Lin</h1>
  <p>Booking: hello@avery.film</p>
  <a href="/about">About</a>
  <a href="https://www.youtube.com/@avlinfilms">YouTube</a>
  <a href="https://www.youtube.com/@avlinfilms#top">YouTube again</a>
  <a href="mailto:Studio@Avery.Film?subject=hi">Mail</a>
  <a href="javascript:void(0)">noop</a>
</body>
</html>"#;

    #[test]
    fn extracts_core_fields() {
        let page = parse_page(PAGE, "https://avery.film/");
        assert_eq!(page.title, "Avery Lin | Films");
        assert_eq!(page.description, "AI short films by Avery Lin");
        assert!(page.text.contains("Booking: hello@avery.film"));
        assert!(!page.text.contains("tracking"));
    }

    #[test]
    fn resolves_and_dedups_links() {
        let page = parse_page(PAGE, "https://avery.film/");
        assert_eq!(
            page.links,
            vec![
                "https://avery.film/about".to_string(),
                "https://www.youtube.com/@avlinfilms".to_string(),
            ]
        );
        assert_eq!(page.about_url.as_deref(), Some("https://avery.film/about"));
    }

    #[test]
    fn collects_emails_from_mailto_and_text() {
        let page = parse_page(PAGE, "https://avery.film/");
        assert_eq!(page.emails, vec!["studio@avery.film", "hello@avery.film"]);
    }
}
