use crate::analyzer::AnalysisResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// How many tactics/brands a snapshot lists.
pub const TOP_N: usize = 5;

/// Status string the stats collaborator exposes verbatim. The tracker is
/// in-memory and has no degraded state; a snapshot always means the
/// process is serving.
pub const SYSTEM_STATUS: &str = "operational";

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    /// Insertion sequence, used to break count ties by first-seen order.
    first_seen: u64,
}

#[derive(Debug, Default)]
struct Aggregate {
    total_analyses: u64,
    phishing_detected: u64,
    clean_messages: u64,
    confidence_sum: f64,
    time_sum: f64,
    tactic_counts: HashMap<String, Counter>,
    brand_counts: HashMap<String, Counter>,
    next_seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

/// Read-only copy of the running aggregates plus derived figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_analyses: u64,
    pub phishing_detected: u64,
    pub clean_messages: u64,
    pub phishing_percentage: f64,
    pub average_confidence: f64,
    pub average_analysis_time: f64,
    pub top_tactics: Vec<NamedCount>,
    pub top_impersonated_brands: Vec<NamedCount>,
    pub system_status: String,
    pub started_at: DateTime<Utc>,
}

/// Process-wide analysis counters. `record` is the single shared-mutation
/// point of the whole pipeline and runs under a mutex; `snapshot` copies
/// the aggregate under the same lock and derives its figures outside it.
///
/// Invariant: phishing_detected + clean_messages == total_analyses after
/// every record call.
pub struct StatsTracker {
    started_at: DateTime<Utc>,
    inner: Mutex<Aggregate>,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            inner: Mutex::new(Aggregate::default()),
        }
    }

    /// Fold one completed analysis into the aggregate. Called exactly once
    /// per verdict, after the verdict is fully constructed.
    pub fn record(&self, result: &AnalysisResult) {
        let mut guard = self.inner.lock().unwrap();
        let agg = &mut *guard;

        agg.total_analyses += 1;
        if result.is_suspicious {
            agg.phishing_detected += 1;
        } else {
            agg.clean_messages += 1;
        }
        agg.confidence_sum += result.confidence;
        agg.time_sum += result.analysis_time;

        let Aggregate {
            tactic_counts,
            brand_counts,
            next_seq,
            ..
        } = agg;
        for tactic in &result.tactics_used {
            bump(tactic_counts, tactic, next_seq);
        }
        if let Some(brand) = &result.impersonated_brand {
            bump(brand_counts, brand, next_seq);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        // Copy under the lock, derive outside it.
        let (total, phishing, clean, confidence_sum, time_sum, tactics, brands) = {
            let agg = self.inner.lock().unwrap();
            (
                agg.total_analyses,
                agg.phishing_detected,
                agg.clean_messages,
                agg.confidence_sum,
                agg.time_sum,
                agg.tactic_counts.clone(),
                agg.brand_counts.clone(),
            )
        };

        let (phishing_percentage, average_confidence, average_analysis_time) = if total > 0 {
            (
                phishing as f64 / total as f64 * 100.0,
                confidence_sum / total as f64,
                time_sum / total as f64,
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        StatsSnapshot {
            total_analyses: total,
            phishing_detected: phishing,
            clean_messages: clean,
            phishing_percentage,
            average_confidence,
            average_analysis_time,
            top_tactics: top_n(&tactics),
            top_impersonated_brands: top_n(&brands),
            system_status: SYSTEM_STATUS.to_string(),
            started_at: self.started_at,
        }
    }
}

fn bump(map: &mut HashMap<String, Counter>, key: &str, next_seq: &mut u64) {
    match map.get_mut(key) {
        Some(counter) => counter.count += 1,
        None => {
            map.insert(
                key.to_string(),
                Counter {
                    count: 1,
                    first_seen: *next_seq,
                },
            );
            *next_seq += 1;
        }
    }
}

fn top_n(map: &HashMap<String, Counter>) -> Vec<NamedCount> {
    let mut entries: Vec<(&String, &Counter)> = map.iter().collect();
    entries.sort_by(|a, b| {
        b.1.count
            .cmp(&a.1.count)
            .then(a.1.first_seen.cmp(&b.1.first_seen))
    });
    entries
        .into_iter()
        .take(TOP_N)
        .map(|(name, counter)| NamedCount {
            name: name.clone(),
            count: counter.count,
        })
        .collect()
}
