use crate::brand_impersonation::BrandImpersonationDetector;
use crate::config::Config;
use crate::domain_risk::{DomainRiskScorer, DomainVerdict};
use crate::knowledge::KnowledgeBase;
use crate::llm::{LanguageModel, LlmAnalyzer, ModelVerdict, UNAVAILABLE_REASON};
use crate::message::Message;
use crate::statistics::StatsTracker;
use crate::tactics::{TacticDetector, TacticSignal};
use crate::url_extractor::{DomainOccurrence, UrlExtractor};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const NO_INDICATORS_REASON: &str = "No suspicious indicators detected";

/// One verdict per analyzed message. Immutable once constructed; the
/// request collaborator serializes it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub is_suspicious: bool,
    pub confidence: f64,
    /// Component indicator strings in discovery order, exact duplicates
    /// removed.
    pub reasons: Vec<String>,
    pub tactics_used: Vec<String>,
    /// Domains that gathered any risk, in first-occurrence order.
    pub suspicious_domains: Vec<DomainVerdict>,
    /// Raw URL tokens as found, duplicates preserved.
    pub extracted_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonated_brand: Option<String>,
    pub recommendation: String,
    /// Wall-clock seconds for the whole pipeline, model call included.
    pub analysis_time: f64,
}

/// Runs the full pipeline for one message and fuses the signals into a
/// verdict. The fusion is deterministic and explainable: a fixed-weight
/// blend with a blocklist override, never a black-box combination.
///
/// Holds no per-request state; a single engine serves any number of
/// concurrent analyses. The stats tracker is the one shared-mutation
/// point and is updated only after a verdict is fully constructed.
pub struct AnalysisEngine {
    config: Config,
    url_extractor: UrlExtractor,
    domain_scorer: DomainRiskScorer,
    tactic_detector: TacticDetector,
    brand_detector: BrandImpersonationDetector,
    llm: LlmAnalyzer,
    stats: Arc<StatsTracker>,
}

impl AnalysisEngine {
    pub fn new(
        config: Config,
        kb: Arc<KnowledgeBase>,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        let domain_scorer = DomainRiskScorer::new(
            Arc::clone(&kb),
            config.typosquat_max_distance,
            config.typosquat_min_len,
        );
        let brand_detector = BrandImpersonationDetector::new(Arc::clone(&kb));
        let llm = LlmAnalyzer::new(
            model,
            Arc::clone(&kb),
            Duration::from_secs(config.llm.timeout_secs),
        );
        Self {
            config,
            url_extractor: UrlExtractor::new(),
            domain_scorer,
            tactic_detector: TacticDetector::new(),
            brand_detector,
            llm,
            stats: Arc::new(StatsTracker::new()),
        }
    }

    pub fn stats(&self) -> Arc<StatsTracker> {
        Arc::clone(&self.stats)
    }

    /// Analyze one message. Fails only on the contract violation of an
    /// empty message; every sub-signal failure is absorbed en route.
    pub async fn analyze(&self, message: &Message) -> Result<AnalysisResult> {
        if message.is_empty() {
            anyhow::bail!("message has no content, subject or html to analyze");
        }

        let started = Instant::now();

        let urls = self.url_extractor.extract(message);
        let mut domains = UrlExtractor::distinct_domains(&urls);
        // The sender's domain joins the pool; blocklisted senders must
        // trip the override even without a link in the body.
        if let Some(sender_domain) = message.sender_domain() {
            if !domains.iter().any(|d| d.domain == sender_domain) {
                domains.push(DomainOccurrence {
                    domain: sender_domain,
                    first_url: None,
                });
            }
        }

        let domain_verdicts = self.domain_scorer.score(&domains);
        let tactic_signals = self.tactic_detector.detect(&message.combined_text());
        let model_verdict = self.llm.analyze(message).await;

        let lexical_brand = self.brand_detector.detect(message, &domains);
        let impersonated_brand =
            BrandImpersonationDetector::merge(lexical_brand, model_verdict.brand.clone());

        let blocked = domain_verdicts.iter().any(|v| v.blocked);
        let blended = self.blend_confidence(&domain_verdicts, &tactic_signals, &model_verdict);

        // Blocklist hits are ground truth and override the blend.
        let (is_suspicious, confidence) = if blocked {
            (
                true,
                blended.max(crate::config::BLOCKLIST_CONFIDENCE_FLOOR),
            )
        } else {
            (blended >= self.config.suspicion_threshold, blended)
        };

        let reasons = collect_reasons(
            &domain_verdicts,
            &tactic_signals,
            impersonated_brand.as_deref(),
            &model_verdict,
        );
        let tactics_used = collect_tactics(&tactic_signals, &model_verdict);
        let recommendation = recommendation(is_suspicious, impersonated_brand.as_deref());

        let result = AnalysisResult {
            is_suspicious,
            confidence,
            reasons,
            tactics_used,
            suspicious_domains: domain_verdicts,
            extracted_urls: urls.into_iter().map(|u| u.raw).collect(),
            impersonated_brand,
            recommendation,
            analysis_time: started.elapsed().as_secs_f64(),
        };

        log::info!(
            "Analysis complete: suspicious={} confidence={:.2} in {:.3}s",
            result.is_suspicious,
            result.confidence,
            result.analysis_time
        );

        self.stats.record(&result);
        Ok(result)
    }

    /// Fixed-weight blend of the three sub-scores. The model signal is
    /// its confidence folded into a suspicion direction: a confident
    /// clean verdict pulls the blend down. When the model is unavailable
    /// its weight is renormalized over the two live signals rather than
    /// dropped, so confidence reflects only what actually ran.
    fn blend_confidence(
        &self,
        domains: &[DomainVerdict],
        tactics: &[TacticSignal],
        model: &ModelVerdict,
    ) -> f64 {
        let weights = &self.config.weights;
        let domain_score = domains
            .iter()
            .map(|v| v.risk_score)
            .fold(0.0_f64, f64::max);
        let tactic_score = TacticDetector::sub_score(tactics);

        let blended = if model.available {
            let model_score = if model.is_suspicious {
                model.confidence
            } else {
                1.0 - model.confidence
            };
            weights.domain * domain_score
                + weights.tactic * tactic_score
                + weights.model * model_score
        } else {
            let live = weights.domain + weights.tactic;
            if live > 0.0 {
                (weights.domain * domain_score + weights.tactic * tactic_score) / live
            } else {
                0.0
            }
        };
        blended.clamp(0.0, 1.0)
    }
}

/// Reasons in discovery order: domain indicators, tactic phrases, the
/// impersonated brand, then model reasons. Exact duplicates dropped.
fn collect_reasons(
    domains: &[DomainVerdict],
    tactics: &[TacticSignal],
    brand: Option<&str>,
    model: &ModelVerdict,
) -> Vec<String> {
    let mut reasons: Vec<String> = Vec::new();

    for verdict in domains {
        for indicator in &verdict.indicators {
            push_unique(&mut reasons, format!("{}: {}", verdict.domain, indicator));
        }
    }
    for signal in tactics {
        push_unique(&mut reasons, signal.tactic.reason().to_string());
    }
    if let Some(brand) = brand {
        push_unique(&mut reasons, format!("Impersonates {brand}"));
    }
    for reason in &model.reasons {
        push_unique(&mut reasons, reason.clone());
    }

    if reasons.is_empty() {
        reasons.push(NO_INDICATORS_REASON.to_string());
    }
    if !model.available {
        push_unique(&mut reasons, UNAVAILABLE_REASON.to_string());
    }
    reasons
}

/// Detector tactics first, then any extra tactic names the model reported.
fn collect_tactics(signals: &[TacticSignal], model: &ModelVerdict) -> Vec<String> {
    let mut tactics: Vec<String> = Vec::new();
    for signal in signals {
        push_unique(&mut tactics, signal.tactic.as_str().to_string());
    }
    for tactic in &model.tactics {
        push_unique(&mut tactics, tactic.clone());
    }
    tactics
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Fixed recommendation templates keyed by verdict and brand presence.
fn recommendation(is_suspicious: bool, brand: Option<&str>) -> String {
    match (is_suspicious, brand) {
        (true, Some(brand)) => format!(
            "This message appears to be impersonating {brand}. Do not interact with it or \
             click any links. If you need to verify information, visit the official {brand} \
             website directly by typing the address in your browser."
        ),
        (true, None) => "This message shows signs of being a phishing attempt. Exercise \
                         caution and verify through official channels before taking any action."
            .to_string(),
        (false, _) => "This message appears legitimate, but always verify sensitive requests \
                       through official channels."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DOMAIN_WEIGHT, TACTIC_WEIGHT};
    use crate::tactics::Tactic;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;

    struct ScriptedModel {
        reply: String,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, _prompt: &str, _timeout: Duration) -> AnyResult<String> {
            Ok(self.reply.clone())
        }
    }

    fn engine() -> AnalysisEngine {
        AnalysisEngine::new(Config::default(), Arc::new(KnowledgeBase::builtin()), None)
    }

    fn engine_with_reply(reply: &str) -> AnalysisEngine {
        AnalysisEngine::new(
            Config::default(),
            Arc::new(KnowledgeBase::builtin()),
            Some(Arc::new(ScriptedModel {
                reply: reply.to_string(),
            })),
        )
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_before_the_pipeline() {
        let engine = engine();
        let err = engine.analyze(&Message::default()).await;
        assert!(err.is_err());
        assert_eq!(engine.stats().snapshot().total_analyses, 0);
    }

    #[tokio::test]
    async fn test_blocklisted_sender_overrides_everything() {
        let engine = engine();
        let msg = Message::new(
            "support@paypa1-secure.com",
            Some("Account notice"),
            "Verify your account",
        );
        let result = engine.analyze(&msg).await.unwrap();

        assert!(result.is_suspicious);
        assert!(result.confidence >= 0.9);
        let blocked = result
            .suspicious_domains
            .iter()
            .find(|v| v.domain == "paypa1-secure.com")
            .unwrap();
        assert!(blocked.blocked);
        assert!(result
            .reasons
            .iter()
            .any(|r| r == "paypa1-secure.com: found in blocklist"));
    }

    #[tokio::test]
    async fn test_urgency_and_fear_without_model_land_midrange() {
        let engine = engine();
        let msg = Message::new(
            "alerts@example.com",
            None,
            "URGENT: Your account will be suspended in 24 hours unless you act now!",
        );
        let result = engine.analyze(&msg).await.unwrap();

        assert!(result.tactics_used.contains(&"urgency".to_string()));
        assert!(result.tactics_used.contains(&"fear".to_string()));
        assert!(result.confidence > 0.4 && result.confidence < 0.8);

        // urgency 0.4 + fear 0.4, renormalized over domain+tactic
        let expected = (TACTIC_WEIGHT * 0.8) / (DOMAIN_WEIGHT + TACTIC_WEIGHT);
        assert!((result.confidence - expected).abs() < 1e-9);
        assert!(result.reasons.iter().any(|r| r == UNAVAILABLE_REASON));
    }

    #[tokio::test]
    async fn test_clean_message_is_quiet() {
        let engine = engine();
        let msg = Message::new(
            "colleague@company.com",
            None,
            "Hi team, attached is this week's report, thanks!",
        );
        let result = engine.analyze(&msg).await.unwrap();

        assert!(!result.is_suspicious);
        assert!(result.confidence < 0.2);
        assert!(result.tactics_used.is_empty());
        assert!(result.suspicious_domains.is_empty());
        assert!(result
            .reasons
            .iter()
            .any(|r| r == NO_INDICATORS_REASON));
        assert!(result.recommendation.contains("appears legitimate"));
    }

    #[tokio::test]
    async fn test_brand_mention_with_foreign_domain_is_impersonation() {
        let engine = engine();
        let msg = Message::new(
            "helpdesk@micros0ft-support.net",
            Some("Microsoft account alert"),
            "Microsoft has detected unusual sign-in activity on your account.",
        );
        let result = engine.analyze(&msg).await.unwrap();

        assert_eq!(result.impersonated_brand.as_deref(), Some("Microsoft"));
        assert!(result
            .reasons
            .iter()
            .any(|r| r == "Impersonates Microsoft"));
    }

    #[tokio::test]
    async fn test_available_model_joins_the_blend() {
        let engine = engine_with_reply(
            r#"{"is_suspicious": true, "confidence": 1.0,
                "reasons": ["credential harvesting language"], "tactics": ["pretexting"]}"#,
        );
        let msg = Message::new("x@neutral-domain.org", None, "please act now");
        let result = engine.analyze(&msg).await.unwrap();

        // urgency 0.4 * tactic weight + 1.0 * model weight, no renormalization
        let expected = TACTIC_WEIGHT * 0.4 + crate::config::MODEL_WEIGHT * 1.0;
        assert!((result.confidence - expected).abs() < 1e-9);
        assert!(result
            .reasons
            .iter()
            .any(|r| r == "credential harvesting language"));
        assert!(result.tactics_used.contains(&"pretexting".to_string()));
        assert!(!result.reasons.iter().any(|r| r == UNAVAILABLE_REASON));
    }

    #[tokio::test]
    async fn test_confident_clean_model_verdict_pulls_blend_down() {
        let engine = engine_with_reply(r#"{"is_suspicious": false, "confidence": 1.0}"#);
        let msg = Message::new("x@neutral-domain.org", None, "please act now");
        let result = engine.analyze(&msg).await.unwrap();

        let expected = TACTIC_WEIGHT * Tactic::Urgency.base_weight();
        assert!((result.confidence - expected).abs() < 1e-9);
        assert!(!result.is_suspicious);
    }

    #[tokio::test]
    async fn test_reasons_have_no_duplicates() {
        // The model repeats a reason the tactic detector already produced.
        let engine = engine_with_reply(
            r#"{"is_suspicious": true, "confidence": 0.9,
                "reasons": ["Creates a false sense of urgency",
                            "Creates a false sense of urgency"]}"#,
        );
        let msg = Message::new("x@neutral-domain.org", None, "urgent: act now");
        let result = engine.analyze(&msg).await.unwrap();

        let mut seen = std::collections::HashSet::new();
        for reason in &result.reasons {
            assert!(seen.insert(reason.clone()), "duplicate reason: {reason}");
        }
    }

    #[tokio::test]
    async fn test_model_brand_fills_in_when_lexical_scan_finds_none() {
        let engine = engine_with_reply(
            r#"{"is_suspicious": true, "confidence": 0.8, "brand": "Chase"}"#,
        );
        let msg = Message::new(
            "x@neutral-domain.org",
            None,
            "your bank account needs urgent verification",
        );
        let result = engine.analyze(&msg).await.unwrap();
        assert_eq!(result.impersonated_brand.as_deref(), Some("Chase"));
    }

    #[tokio::test]
    async fn test_analysis_is_idempotent_without_the_model() {
        let engine = engine();
        let msg = Message::new(
            "support@paypa1.com",
            Some("Verify"),
            "URGENT: verify at https://paypa1.com/login today",
        );
        let first = engine.analyze(&msg).await.unwrap();
        let second = engine.analyze(&msg).await.unwrap();

        assert_eq!(first.is_suspicious, second.is_suspicious);
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(first.reasons, second.reasons);
        assert_eq!(first.tactics_used, second.tactics_used);
        assert_eq!(first.suspicious_domains, second.suspicious_domains);
        assert_eq!(first.extracted_urls, second.extracted_urls);
        assert_eq!(first.impersonated_brand, second.impersonated_brand);
        assert_eq!(first.recommendation, second.recommendation);
    }

    #[tokio::test]
    async fn test_zero_live_weights_blend_to_zero_not_nan() {
        // A config built in code can bypass validate(); the blend must
        // still never divide by a zero live-weight sum.
        let mut config = Config::default();
        config.weights = crate::config::EnsembleWeights {
            domain: 0.0,
            tactic: 0.0,
            model: 1.0,
        };
        let engine =
            AnalysisEngine::new(config, Arc::new(KnowledgeBase::builtin()), None);
        let msg = Message::new("alerts@example.com", None, "URGENT: act now!");
        let result = engine.analyze(&msg).await.unwrap();

        assert!(result.confidence.is_finite());
        assert_eq!(result.confidence, 0.0);
        assert!(!result.is_suspicious);
        assert!(engine.stats().snapshot().average_confidence.is_finite());
    }

    #[tokio::test]
    async fn test_extracted_urls_keep_duplicates() {
        let engine = engine();
        let msg = Message::new(
            "x@example.com",
            None,
            "see https://example.com/a and https://example.com/a",
        );
        let result = engine.analyze(&msg).await.unwrap();
        assert_eq!(result.extracted_urls.len(), 2);
    }

    #[tokio::test]
    async fn test_brand_specific_recommendation() {
        let engine = engine();
        let msg = Message::new(
            "security@paypal-alerts.xyz",
            Some("PayPal security alert"),
            "URGENT: your PayPal account has been suspended, verify immediately at \
             https://paypal-alerts.xyz/verify or face permanent closure!!!",
        );
        let result = engine.analyze(&msg).await.unwrap();

        assert!(result.is_suspicious);
        assert_eq!(result.impersonated_brand.as_deref(), Some("PayPal"));
        assert!(result.recommendation.contains("impersonating PayPal"));
    }

    #[tokio::test]
    async fn test_serialized_result_reads_back_without_optional_fields() {
        // No brand, and the blocked domain came from the sender so its
        // url is absent; both fields are skipped in the JSON.
        let engine = engine();
        let msg = Message::new(
            "billing@paypa1-secure.com",
            Some("Invoice"),
            "Your invoice is attached.",
        );
        let result = engine.analyze(&msg).await.unwrap();
        assert!(result.impersonated_brand.is_none());
        assert!(result.suspicious_domains[0].url.is_none());

        let json = serde_json::to_string(&result).unwrap();
        let parsed: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }

    #[tokio::test]
    async fn test_each_analysis_is_recorded_once() {
        let engine = engine();
        let msg = Message::new("a@b.com", None, "lunch tomorrow?");
        engine.analyze(&msg).await.unwrap();
        engine.analyze(&msg).await.unwrap();

        let snap = engine.stats().snapshot();
        assert_eq!(snap.total_analyses, 2);
        assert_eq!(snap.phishing_detected + snap.clean_messages, 2);
    }
}
