use crate::knowledge::KnowledgeBase;
use crate::message::Message;
use crate::url_extractor::DomainOccurrence;
use regex::Regex;
use std::sync::Arc;

/// Flags a message that name-drops a known brand while none of its domains
/// (sender or links) belong to that brand. The mismatch between claimed
/// identity and actual origin is the strongest single impersonation signal.
pub struct BrandImpersonationDetector {
    kb: Arc<KnowledgeBase>,
    /// One compiled mention pattern per brand, in brand-table order.
    name_patterns: Vec<Regex>,
}

impl BrandImpersonationDetector {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        let name_patterns = kb
            .brands
            .iter()
            .map(|b| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&b.name))).unwrap())
            .collect();
        Self { kb, name_patterns }
    }

    /// The first brand (table order) mentioned in content/subject/sender
    /// whose legitimate domain set contains none of the message's domains.
    pub fn detect(&self, message: &Message, domains: &[DomainOccurrence]) -> Option<String> {
        let text = message.combined_text();
        for (brand, pattern) in self.kb.brands.iter().zip(&self.name_patterns) {
            let mentioned = pattern.is_match(&text) || pattern.is_match(&message.sender);
            if !mentioned {
                continue;
            }
            let any_owned = domains
                .iter()
                .any(|occ| self.kb.brand_owns_domain(brand, &occ.domain));
            if !any_owned {
                log::debug!("Brand mention without matching domain: {}", brand.name);
                return Some(brand.name.clone());
            }
        }
        None
    }

    /// Lexical detection wins on conflict; the model's brand fills in only
    /// when the lexical scan found none.
    pub fn merge(lexical: Option<String>, model: Option<String>) -> Option<String> {
        lexical.or(model)
    }
}
