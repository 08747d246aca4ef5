use regex::Regex;
use serde::{Deserialize, Serialize};

const URGENCY_WEIGHT: f64 = 0.4;
const FEAR_WEIGHT: f64 = 0.4;
const AUTHORITY_WEIGHT: f64 = 0.3;
const REWARD_WEIGHT: f64 = 0.25;
const SCARCITY_WEIGHT: f64 = 0.25;
const SOCIAL_PROOF_WEIGHT: f64 = 0.2;
const GENERIC_GREETING_WEIGHT: f64 = 0.15;
const POOR_GRAMMAR_WEIGHT: f64 = 0.15;

/// The fixed set of manipulation tactics the detector recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tactic {
    Urgency,
    Fear,
    Authority,
    Reward,
    Scarcity,
    SocialProof,
    GenericGreeting,
    PoorGrammar,
}

impl Tactic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tactic::Urgency => "urgency",
            Tactic::Fear => "fear",
            Tactic::Authority => "authority",
            Tactic::Reward => "reward",
            Tactic::Scarcity => "scarcity",
            Tactic::SocialProof => "social_proof",
            Tactic::GenericGreeting => "generic_greeting",
            Tactic::PoorGrammar => "poor_grammar",
        }
    }

    /// Contribution of a firing tactic to the behavioral sub-score.
    /// Urgency and fear dominate; greeting and grammar tells are weak.
    pub fn base_weight(&self) -> f64 {
        match self {
            Tactic::Urgency => URGENCY_WEIGHT,
            Tactic::Fear => FEAR_WEIGHT,
            Tactic::Authority => AUTHORITY_WEIGHT,
            Tactic::Reward => REWARD_WEIGHT,
            Tactic::Scarcity => SCARCITY_WEIGHT,
            Tactic::SocialProof => SOCIAL_PROOF_WEIGHT,
            Tactic::GenericGreeting => GENERIC_GREETING_WEIGHT,
            Tactic::PoorGrammar => POOR_GRAMMAR_WEIGHT,
        }
    }

    /// Human-readable reason rendered into the final verdict.
    pub fn reason(&self) -> &'static str {
        match self {
            Tactic::Urgency => "Creates a false sense of urgency",
            Tactic::Fear => "Uses fear tactics to manipulate",
            Tactic::Authority => "Impersonates authority figures to increase compliance",
            Tactic::Reward => "Exploits desire for rewards or financial gain",
            Tactic::Scarcity => "Manufactures scarcity to rush a decision",
            Tactic::SocialProof => "Uses social proof to appear legitimate",
            Tactic::GenericGreeting => "Uses a generic greeting instead of your name",
            Tactic::PoorGrammar => "Contains spelling or grammar errors typical of phishing",
        }
    }
}

/// One detected tactic with the phrase that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticSignal {
    pub tactic: Tactic,
    pub weight: f64,
    pub evidence: String,
}

struct TacticRule {
    tactic: Tactic,
    patterns: Vec<Regex>,
}

/// Scans message text for manipulation-tactic phrases. Deterministic:
/// no state, no external calls, identical text gives identical signals.
pub struct TacticDetector {
    rules: Vec<TacticRule>,
}

impl Default for TacticDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl TacticDetector {
    pub fn new() -> Self {
        let rules = vec![
            rule(
                Tactic::Urgency,
                &[
                    r"(?i)\burgent(ly)?\b",
                    r"(?i)\bimmediate(ly)?\b",
                    r"(?i)\bact now\b",
                    r"(?i)\bright away\b",
                    r"(?i)\bas soon as possible\b",
                    r"(?i)\b(within|in)\s+\d+\s*(hours?|minutes?|days?)\b",
                    r"(?i)\bexpires? (today|soon|shortly)\b",
                    r"(?i)\btime.sensitive\b",
                ],
            ),
            rule(
                Tactic::Fear,
                &[
                    r"(?i)\b(account|access).{0,24}(suspend|disabl|lock|clos|terminat|restrict)",
                    r"(?i)\bsuspicious activity\b",
                    r"(?i)\bunauthorized (access|transaction|login|sign.?in)\b",
                    r"(?i)\bsecurity (alert|breach|warning)\b",
                    r"(?i)\blegal action\b",
                    r"(?i)\b(avoid|prevent) (suspension|closure|termination)\b",
                    r"(?i)\bpermanently (deleted|closed|disabled)\b",
                ],
            ),
            rule(
                Tactic::Authority,
                &[
                    r"(?i)\b(security|fraud|billing|support|it) (team|department)\b",
                    r"(?i)\badministrator\b",
                    r"(?i)\bofficial notice\b",
                    r"(?i)\b(irs|fbi|interpol|government agency)\b",
                    r"(?i)\bcompliance (review|notice)\b",
                ],
            ),
            rule(
                Tactic::Reward,
                &[
                    r"(?i)\byou (have )?won\b",
                    r"(?i)\bcongratulations\b",
                    r"(?i)\b(prize|lottery|jackpot)\b",
                    r"(?i)\bgift ?card\b",
                    r"(?i)\bclaim your\b",
                    r"(?i)\b(refund|reimbursement) (of|waiting|pending)\b",
                    r"(?i)\bfree (money|gift|reward)\b",
                ],
            ),
            rule(
                Tactic::Scarcity,
                &[
                    r"(?i)\blimited time\b",
                    r"(?i)\bonly \d+ (left|remaining|spots?)\b",
                    r"(?i)\blast chance\b",
                    r"(?i)\bfinal (notice|warning|reminder)\b",
                    r"(?i)\boffer (ends|expires)\b",
                    r"(?i)\bwhile supplies last\b",
                ],
            ),
            rule(
                Tactic::SocialProof,
                &[
                    r"(?i)\b(thousands|millions) of (users|customers|people)\b",
                    r"(?i)\bother (users|customers|members) have (already )?\b",
                    r"(?i)\bjoin \d+[,\d]* (users|customers|members)\b",
                    r"(?i)\btrusted by\b",
                    r"(?i)\beveryone is (upgrading|switching|claiming)\b",
                ],
            ),
            rule(
                Tactic::GenericGreeting,
                &[
                    r"(?i)\bdear (customer|user|member|client|account holder|valued customer)\b",
                    r"(?i)\bdear sir(/| or )?madam\b",
                    r"(?i)\battention (customer|user|member)\b",
                ],
            ),
            rule(
                Tactic::PoorGrammar,
                &[
                    r"(?i)\bkindly\b",
                    r"(?i)\bdo the needful\b",
                    r"(?i)\brevert back\b",
                    r"(?i)\binformations\b",
                    r"(?i)\bfor security purpose\b",
                    r"!{3,}",
                ],
            ),
        ];
        Self { rules }
    }

    /// All firing tactics for `text`, at most one signal per tactic (same-
    /// tactic matches are merged keeping the maximum weight and the first
    /// matched phrase). Output order follows the fixed tactic order.
    pub fn detect(&self, text: &str) -> Vec<TacticSignal> {
        let mut raw = Vec::new();
        for rule in &self.rules {
            for pattern in &rule.patterns {
                if let Some(m) = pattern.find(text) {
                    raw.push(TacticSignal {
                        tactic: rule.tactic,
                        weight: rule.tactic.base_weight(),
                        evidence: m.as_str().to_string(),
                    });
                }
            }
        }
        merge_signals(raw)
    }

    /// Weighted sum of firing tactics, clamped to [0, 1].
    pub fn sub_score(signals: &[TacticSignal]) -> f64 {
        signals
            .iter()
            .map(|s| s.weight)
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }
}

/// Collapse duplicate tactics: keep the maximum weight and the earliest
/// evidence, preserving first-seen order.
fn merge_signals(raw: Vec<TacticSignal>) -> Vec<TacticSignal> {
    let mut merged: Vec<TacticSignal> = Vec::new();
    for signal in raw {
        match merged.iter_mut().find(|s| s.tactic == signal.tactic) {
            Some(existing) => {
                if signal.weight > existing.weight {
                    existing.weight = signal.weight;
                }
            }
            None => merged.push(signal),
        }
    }
    merged
}

fn rule(tactic: Tactic, patterns: &[&str]) -> TacticRule {
    TacticRule {
        tactic,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(p).unwrap())
            .collect(),
    }
}
