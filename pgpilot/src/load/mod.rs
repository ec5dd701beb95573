//! Load samples: extraction from runner output and weighted ranking
//!
//! The load check playbook prints one debug block per host:
//!
//! ```text
//! ok: [Debian] => {
//!     "msg": [
//!         "0.10",
//!         "0.20"
//!     ]
//! }
//! ```
//!
//! Every `d+.d+` literal inside `msg` is a sample, in order of appearance.

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

/// Pulls per-host load samples out of runner output
pub trait LoadExtractor: Send + Sync {
    /// Samples for `host`, empty when no block matches. Never fails.
    fn extract(&self, output: &str, host: &str) -> Vec<f64>;
}

/// Grammar v1: the `ok: [host] => { "msg": [...] }` debug report
#[derive(Debug, Clone)]
pub struct DebugMsgExtractor {
    number: Regex,
}

impl DebugMsgExtractor {
    pub const GRAMMAR_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            number: Regex::new(r"\d+\.\d+").expect("static sample pattern"),
        }
    }

    fn block_pattern(host: &str) -> Option<Regex> {
        let pattern = format!(
            r#"(?s)ok: \[{}\] => \{{\s+"msg": \[(.*?)\]\s+\}}"#,
            regex::escape(host)
        );
        Regex::new(&pattern).ok()
    }
}

impl Default for DebugMsgExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadExtractor for DebugMsgExtractor {
    fn extract(&self, output: &str, host: &str) -> Vec<f64> {
        info!("Extracting load for host: {}", host);

        let payload = Self::block_pattern(host)
            .and_then(|block| block.captures(output))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str());

        let values: Vec<f64> = match payload {
            Some(payload) => self
                .number
                .find_iter(payload)
                .filter_map(|m| m.as_str().parse().ok())
                .collect(),
            None => {
                debug!("No load block found for host {}", host);
                Vec::new()
            }
        };

        info!("Load values for {}: {:?}", host, values);
        values
    }
}

/// Which of the two candidates won the comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Candidate {
    First,
    Second,
}

/// Scores of both candidates and the resulting pick
#[derive(Debug, Clone, Serialize)]
pub struct LoadComparison {
    pub first_score: f64,
    pub second_score: f64,
    pub winner: Candidate,
}

/// Σ samples[i] * weights[i] over the shorter of the two sequences
pub fn weighted_score(samples: &[f64], weights: &[f64]) -> f64 {
    samples
        .iter()
        .zip(weights)
        .fold(0.0, |acc, (s, w)| acc + s * w)
}

/// The first candidate wins only with a strictly lower score; a tie goes to
/// the second. A host that reported nothing scores 0.0 and so beats any
/// positive load.
pub fn compare_loads(first: &[f64], second: &[f64], weights: &[f64]) -> LoadComparison {
    let first_score = weighted_score(first, weights);
    let second_score = weighted_score(second, weights);
    info!(
        "Weighted load scores: first={}, second={}",
        first_score, second_score
    );

    let winner = if first_score < second_score {
        Candidate::First
    } else {
        Candidate::Second
    };

    LoadComparison {
        first_score,
        second_score,
        winner,
    }
}
