pub mod analyzer;
pub mod brand_impersonation;
pub mod config;
pub mod domain_risk;
pub mod knowledge;
pub mod llm;
pub mod message;
pub mod statistics;
pub mod tactics;
pub mod url_extractor;

pub use analyzer::{AnalysisEngine, AnalysisResult};
pub use config::Config;
pub use domain_risk::{DomainRiskScorer, DomainVerdict};
pub use knowledge::KnowledgeBase;
pub use llm::{HttpLanguageModel, LanguageModel, LlmAnalyzer, ModelVerdict};
pub use message::Message;
pub use statistics::{StatsSnapshot, StatsTracker};
pub use tactics::{Tactic, TacticDetector, TacticSignal};
pub use url_extractor::{ExtractedUrl, UrlExtractor};
