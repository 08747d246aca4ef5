use crate::message::Message;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// A URL token found in message text, with its normalized host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedUrl {
    /// The token as it appeared in the message.
    pub raw: String,
    /// Host component, lowercased, port stripped.
    pub domain: String,
}

/// A distinct domain seen across the message, with the first URL that
/// referenced it (None when the domain came from the sender address).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainOccurrence {
    pub domain: String,
    pub first_url: Option<String>,
}

/// Purely lexical URL scanner. Recognizes http://, https:// and bare
/// www.-prefixed tokens in plain text, and href attributes in HTML.
/// Tokens without a resolvable host are dropped silently.
pub struct UrlExtractor {
    token_regex: Regex,
    href_regex: Regex,
}

impl Default for UrlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlExtractor {
    pub fn new() -> Self {
        Self {
            token_regex: Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"']+"#).unwrap(),
            href_regex: Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).unwrap(),
        }
    }

    /// All URLs in the message, in first-occurrence order. The plain text
    /// (subject + content) is scanned first, then the HTML href attributes.
    /// Duplicates are preserved.
    pub fn extract(&self, message: &Message) -> Vec<ExtractedUrl> {
        let mut urls = Vec::new();

        let text = message.combined_text();
        for m in self.token_regex.find_iter(&text) {
            let token = trim_trailing_punctuation(m.as_str());
            match host_of(token) {
                Some(domain) => urls.push(ExtractedUrl {
                    raw: token.to_string(),
                    domain,
                }),
                None => log::debug!("Dropping malformed URL token: {token}"),
            }
        }

        if let Some(html) = &message.html {
            for cap in self.href_regex.captures_iter(html) {
                if let Some(href) = cap.get(1) {
                    let token = trim_trailing_punctuation(href.as_str());
                    match host_of(token) {
                        Some(domain) => urls.push(ExtractedUrl {
                            raw: token.to_string(),
                            domain,
                        }),
                        None => log::debug!("Dropping malformed href target: {token}"),
                    }
                }
            }
        }

        urls
    }

    /// Domains deduplicated in first-occurrence order, each keeping the
    /// first URL that referenced it.
    pub fn distinct_domains(urls: &[ExtractedUrl]) -> Vec<DomainOccurrence> {
        let mut seen = Vec::new();
        let mut out: Vec<DomainOccurrence> = Vec::new();
        for url in urls {
            if seen.contains(&url.domain) {
                continue;
            }
            seen.push(url.domain.clone());
            out.push(DomainOccurrence {
                domain: url.domain.clone(),
                first_url: Some(url.raw.clone()),
            });
        }
        out
    }
}

/// Host of a URL token, lowercased and without the port. None when the
/// token does not parse or has no host.
fn host_of(token: &str) -> Option<String> {
    let normalized = if token.to_lowercase().starts_with("www.") {
        format!("http://{token}")
    } else {
        token.to_string()
    };
    let parsed = Url::parse(&normalized).ok()?;
    parsed.host_str().map(|h| h.to_lowercase())
}

/// Sentence punctuation clinging to the end of a token is not part of it.
fn trim_trailing_punctuation(token: &str) -> &str {
    token.trim_end_matches(|c: char| {
        matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')' | ']' | '}' | '\'' | '"')
    })
}
