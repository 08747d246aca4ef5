use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A trusted brand that phishing campaigns commonly imitate, together with
/// the domains it legitimately sends from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandProfile {
    pub name: String,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExemplarLabel {
    Phishing,
    Legitimate,
}

/// A labelled reference message used for retrieval-augmented prompting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exemplar {
    pub label: ExemplarLabel,
    #[serde(default)]
    pub brand: Option<String>,
    pub text: String,
}

/// Read-only reference data consumed by the domain scorer, the brand
/// impersonation detector and the model analyzer: known brands, a domain
/// blocklist, suspicious TLDs, URL shorteners and retrieval exemplars.
///
/// Loadable from YAML; ships with a compiled-in default table. A failed
/// load falls back to the defaults so the analysis path stays available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub brands: Vec<BrandProfile>,
    #[serde(default)]
    pub blocklist: Vec<String>,
    #[serde(default)]
    pub suspicious_tlds: Vec<String>,
    #[serde(default)]
    pub url_shorteners: Vec<String>,
    #[serde(default)]
    pub exemplars: Vec<Exemplar>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KnowledgeBase {
    /// The compiled-in reference table.
    pub fn builtin() -> Self {
        let brands = vec![
            brand(
                "Microsoft",
                &[
                    "microsoft.com",
                    "office.com",
                    "live.com",
                    "outlook.com",
                    "microsoftonline.com",
                ],
            ),
            brand("PayPal", &["paypal.com", "paypal.me"]),
            brand("Amazon", &["amazon.com", "amazon.co.uk", "aws.amazon.com"]),
            brand("Apple", &["apple.com", "icloud.com", "me.com"]),
            brand("Google", &["google.com", "gmail.com", "googlemail.com"]),
            brand("Bank of America", &["bankofamerica.com", "bofa.com"]),
            brand("Chase", &["chase.com", "jpmorganchase.com"]),
            brand("Wells Fargo", &["wellsfargo.com", "wf.com"]),
        ];

        let blocklist = to_strings(&[
            "paypa1-secure.com",
            "appleid-verify.net",
            "secure-bankofamerica-login.com",
        ]);

        let suspicious_tlds = to_strings(&[
            "xyz", "top", "club", "online", "site", "fun", "space", "icu", "tk", "ml", "ga",
            "cf", "gq", "pw", "buzz", "rest",
        ]);

        let url_shorteners = to_strings(&[
            "bit.ly",
            "tinyurl.com",
            "goo.gl",
            "t.co",
            "is.gd",
            "buff.ly",
            "ow.ly",
            "rebrand.ly",
            "cutt.ly",
            "rb.gy",
        ]);

        let exemplars = vec![
            phishing_exemplar(
                "Microsoft",
                "Your Microsoft account password expires today. Click here to update your \
                 password immediately or lose access to your mailbox.",
            ),
            phishing_exemplar(
                "Microsoft",
                "Unusual sign-in activity detected on your Microsoft account. Verify your \
                 identity now to avoid account suspension.",
            ),
            phishing_exemplar(
                "PayPal",
                "Your PayPal account has been limited. You have 24 hours to verify your \
                 information or your account will be permanently suspended.",
            ),
            phishing_exemplar(
                "Amazon",
                "Your Amazon order could not be shipped. Update your payment information \
                 within 48 hours to avoid cancellation.",
            ),
            phishing_exemplar(
                "Apple",
                "Your Apple ID was used to sign in on a new device. If this wasn't you, \
                 verify your identity immediately to secure your account.",
            ),
            phishing_exemplar(
                "Google",
                "Critical security alert for your Google account. Someone has your password. \
                 Review activity now.",
            ),
            phishing_exemplar(
                "Bank of America",
                "We detected unusual activity on your Bank of America account. Account \
                 access has been limited until you confirm your details.",
            ),
            phishing_exemplar(
                "Chase",
                "Your Chase account has been locked after too many failed login attempts. \
                 Verify your identity to restore access.",
            ),
            phishing_exemplar(
                "Wells Fargo",
                "Wells Fargo: your account has been temporarily suspended. Immediate action \
                 required to avoid closure.",
            ),
            legitimate_exemplar(
                "Hi team, please find attached the quarterly report for review before \
                 Friday's meeting.",
            ),
            legitimate_exemplar(
                "Your order has shipped. You can track the package from the order history \
                 page of your account.",
            ),
            legitimate_exemplar(
                "Meeting reminder: project sync at 3pm tomorrow in the main conference room.",
            ),
        ];

        KnowledgeBase {
            brands,
            blocklist,
            suspicious_tlds,
            url_shorteners,
            exemplars,
        }
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read knowledge base file: {path}"))?;
        let kb: KnowledgeBase = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse knowledge base file: {path}"))?;
        Ok(kb)
    }

    /// Load from a file when a path is given, falling back to the builtin
    /// table on any failure. Lookup data is advisory; a broken file must
    /// not take the analysis path down.
    pub fn load_or_default(path: Option<&str>) -> Self {
        match path {
            Some(p) => match Self::load_from_file(p) {
                Ok(kb) => {
                    log::info!(
                        "Loaded knowledge base from {p}: {} brands, {} blocklist entries",
                        kb.brands.len(),
                        kb.blocklist.len()
                    );
                    kb
                }
                Err(e) => {
                    log::warn!("Knowledge base load failed ({e:#}), using builtin defaults");
                    Self::builtin()
                }
            },
            None => Self::builtin(),
        }
    }

    pub fn is_blocked(&self, domain: &str) -> bool {
        self.blocklist.iter().any(|d| d == domain)
    }

    /// Checks the final label of `domain` against the suspicious-TLD set.
    pub fn has_suspicious_tld(&self, domain: &str) -> bool {
        match domain.rsplit('.').next() {
            Some(tld) => self.suspicious_tlds.iter().any(|t| t == tld),
            None => false,
        }
    }

    pub fn is_shortener(&self, domain: &str) -> bool {
        self.url_shorteners.iter().any(|s| s == domain)
    }

    /// True when `domain` is one of the brand's legitimate domains or a
    /// subdomain of one.
    pub fn brand_owns_domain(&self, brand: &BrandProfile, domain: &str) -> bool {
        brand
            .domains
            .iter()
            .any(|d| domain == d || domain.ends_with(&format!(".{d}")))
    }

    /// Brand owning `domain`, if any.
    pub fn brand_for_domain(&self, domain: &str) -> Option<&BrandProfile> {
        self.brands.iter().find(|b| self.brand_owns_domain(b, domain))
    }

    /// Top `k` exemplars by token overlap with `text`. Exemplars sharing no
    /// tokens with the message are not returned; ties keep table order.
    pub fn retrieve_exemplars(&self, text: &str, k: usize) -> Vec<&Exemplar> {
        let message_tokens = tokenize(text);
        if message_tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(f64, usize, &Exemplar)> = self
            .exemplars
            .iter()
            .enumerate()
            .filter_map(|(idx, ex)| {
                let score = token_overlap(&message_tokens, &tokenize(&ex.text));
                if score > 0.0 {
                    Some((score, idx, ex))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.into_iter().take(k).map(|(_, _, ex)| ex).collect()
    }
}

fn brand(name: &str, domains: &[&str]) -> BrandProfile {
    BrandProfile {
        name: name.to_string(),
        domains: to_strings(domains),
    }
}

fn phishing_exemplar(brand: &str, text: &str) -> Exemplar {
    Exemplar {
        label: ExemplarLabel::Phishing,
        brand: Some(brand.to_string()),
        text: text.to_string(),
    }
}

fn legitimate_exemplar(text: &str) -> Exemplar {
    Exemplar {
        label: ExemplarLabel::Legitimate,
        brand: None,
        text: text.to_string(),
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}

/// Jaccard overlap of two token sets.
fn token_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    if intersection == 0 {
        return 0.0;
    }
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_populated() {
        let kb = KnowledgeBase::builtin();
        assert!(kb.brands.iter().any(|b| b.name == "Microsoft"));
        assert!(kb.brands.iter().any(|b| b.name == "PayPal"));
        assert!(!kb.suspicious_tlds.is_empty());
        assert!(!kb.exemplars.is_empty());
    }

    #[test]
    fn test_blocklist_is_exact_match() {
        let kb = KnowledgeBase::builtin();
        assert!(kb.is_blocked("paypa1-secure.com"));
        assert!(!kb.is_blocked("sub.paypa1-secure.com"));
        assert!(!kb.is_blocked("paypal.com"));
    }

    #[test]
    fn test_suspicious_tld_checks_final_label() {
        let kb = KnowledgeBase::builtin();
        assert!(kb.has_suspicious_tld("login-update.xyz"));
        assert!(kb.has_suspicious_tld("a.b.c.tk"));
        assert!(!kb.has_suspicious_tld("example.com"));
    }

    #[test]
    fn test_brand_owns_subdomains() {
        let kb = KnowledgeBase::builtin();
        let microsoft = kb.brands.iter().find(|b| b.name == "Microsoft").unwrap();
        assert!(kb.brand_owns_domain(microsoft, "microsoft.com"));
        assert!(kb.brand_owns_domain(microsoft, "login.microsoft.com"));
        assert!(!kb.brand_owns_domain(microsoft, "microsoft.com.evil.net"));
        assert!(!kb.brand_owns_domain(microsoft, "micros0ft-support.net"));
    }

    #[test]
    fn test_retrieval_ranks_by_overlap() {
        let kb = KnowledgeBase::builtin();
        let hits = kb.retrieve_exemplars(
            "Your PayPal account has been limited, verify your information",
            3,
        );
        assert!(!hits.is_empty());
        assert_eq!(hits[0].brand.as_deref(), Some("PayPal"));
        assert!(hits.len() <= 3);
    }

    #[test]
    fn test_retrieval_skips_unrelated_exemplars() {
        let kb = KnowledgeBase::builtin();
        let hits = kb.retrieve_exemplars("zzz qqq xxyyzz", 3);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_yaml_round_trip() {
        let kb = KnowledgeBase::builtin();
        let yaml = serde_yaml::to_string(&kb).unwrap();
        let parsed: KnowledgeBase = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.brands.len(), kb.brands.len());
        assert_eq!(parsed.blocklist, kb.blocklist);
    }

    #[test]
    fn test_load_or_default_falls_back_on_missing_file() {
        let kb = KnowledgeBase::load_or_default(Some("/nonexistent/kb.yaml"));
        assert!(!kb.brands.is_empty());
    }
}
