use crate::knowledge::KnowledgeBase;
use crate::url_extractor::DomainOccurrence;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Risk added per indicator. Typosquat is a floor, not an increment.
pub const TYPOSQUAT_RISK_FLOOR: f64 = 0.7;
pub const SUSPICIOUS_TLD_RISK: f64 = 0.2;
pub const IP_HOST_RISK: f64 = 0.1;
pub const SUBDOMAIN_DEPTH_RISK: f64 = 0.1;
pub const SHORTENER_RISK: f64 = 0.2;
pub const BRAND_EMBED_RISK: f64 = 0.3;
pub const HOMOGLYPH_RISK: f64 = 0.1;

/// Labels beyond this count as excessive subdomain nesting.
pub const MAX_SUBDOMAIN_LABELS: usize = 3;

/// Per-domain verdict. `url` is the first URL that referenced the domain,
/// absent when the domain came from the sender address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainVerdict {
    pub domain: String,
    pub blocked: bool,
    pub risk_score: f64,
    pub indicators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Scores each distinct domain against the blocklist, known-brand edit
/// distance, suspicious TLDs, and host-shape heuristics. Purely lexical.
pub struct DomainRiskScorer {
    kb: Arc<KnowledgeBase>,
    max_typosquat_distance: usize,
    min_typosquat_len: usize,
}

impl DomainRiskScorer {
    pub fn new(kb: Arc<KnowledgeBase>, max_typosquat_distance: usize, min_typosquat_len: usize) -> Self {
        Self {
            kb,
            max_typosquat_distance,
            min_typosquat_len,
        }
    }

    /// Verdicts for every domain that gathered any risk. Domains with a
    /// zero score and no indicators are omitted.
    pub fn score(&self, occurrences: &[DomainOccurrence]) -> Vec<DomainVerdict> {
        occurrences
            .iter()
            .filter_map(|occ| {
                let verdict = self.score_domain(&occ.domain, occ.first_url.clone());
                if verdict.risk_score > 0.0 || !verdict.indicators.is_empty() {
                    Some(verdict)
                } else {
                    None
                }
            })
            .collect()
    }

    fn score_domain(&self, domain: &str, url: Option<String>) -> DomainVerdict {
        // Blocklist membership is ground truth; nothing else matters.
        if self.kb.is_blocked(domain) {
            log::debug!("Domain {domain} found in blocklist");
            return DomainVerdict {
                domain: domain.to_string(),
                blocked: true,
                risk_score: 1.0,
                indicators: vec!["found in blocklist".to_string()],
                url,
            };
        }

        let mut risk: f64 = 0.0;
        let mut indicators = Vec::new();

        // A domain a known brand legitimately owns is never scored against
        // that brand's peers.
        if self.kb.brand_for_domain(domain).is_some() {
            return DomainVerdict {
                domain: domain.to_string(),
                blocked: false,
                risk_score: 0.0,
                indicators,
                url,
            };
        }

        if let Some(brand_domain) = self.closest_typosquat(domain) {
            indicators.push(format!("typosquat of {brand_domain}"));
            risk = risk.max(TYPOSQUAT_RISK_FLOOR);
        }

        let normalized = normalize_homoglyphs(domain);
        for brand in &self.kb.brands {
            let token = brand.name.to_lowercase().replace(' ', "");
            if normalized.contains(&token) && !self.kb.brand_owns_domain(brand, domain) {
                indicators.push(format!("embeds brand name \"{}\"", brand.name));
                risk += BRAND_EMBED_RISK;
                if normalized != domain {
                    indicators.push("character substitution".to_string());
                    risk += HOMOGLYPH_RISK;
                }
                break;
            }
        }

        if self.kb.has_suspicious_tld(domain) {
            indicators.push("suspicious TLD".to_string());
            risk += SUSPICIOUS_TLD_RISK;
        }

        let is_ip = is_ip_host(domain);
        if is_ip {
            indicators.push("IP address host".to_string());
            risk += IP_HOST_RISK;
        }

        if !is_ip && domain.split('.').count() > MAX_SUBDOMAIN_LABELS {
            indicators.push("excessive subdomains".to_string());
            risk += SUBDOMAIN_DEPTH_RISK;
        }

        if self.kb.is_shortener(domain) {
            indicators.push("URL shortener".to_string());
            risk += SHORTENER_RISK;
        }

        let risk_score = risk.clamp(0.0, 1.0);
        if !indicators.is_empty() {
            log::debug!("Domain {domain} risk {risk_score:.2}: {}", indicators.join(", "));
        }

        DomainVerdict {
            domain: domain.to_string(),
            blocked: false,
            risk_score,
            indicators,
            url,
        }
    }

    /// Closest known-brand domain within the edit-distance cutoff, if any.
    /// Exact matches are the brand itself and never count.
    fn closest_typosquat(&self, domain: &str) -> Option<String> {
        if domain.len() < self.min_typosquat_len {
            return None;
        }
        let mut best: Option<(usize, &str)> = None;
        for brand in &self.kb.brands {
            for brand_domain in &brand.domains {
                let distance = levenshtein(domain, brand_domain);
                if distance == 0 || distance > self.max_typosquat_distance {
                    continue;
                }
                if best.map_or(true, |(d, _)| distance < d) {
                    best = Some((distance, brand_domain));
                }
            }
        }
        best.map(|(_, d)| d.to_string())
    }
}

/// Map digits commonly used as letter stand-ins back to letters.
fn normalize_homoglyphs(domain: &str) -> String {
    domain
        .chars()
        .map(|c| match c {
            '0' => 'o',
            '1' => 'l',
            '3' => 'e',
            '4' => 'a',
            '5' => 's',
            '7' => 't',
            '8' => 'b',
            '9' => 'g',
            other => other,
        })
        .collect()
}

fn is_ip_host(domain: &str) -> bool {
    let trimmed = domain.trim_start_matches('[').trim_end_matches(']');
    trimmed.parse::<std::net::IpAddr>().is_ok()
}

/// Classic two-row Levenshtein distance.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
