use std::time::{Duration, Instant};

use serde::Deserialize;
use sv_core::url::extract_host;
use sv_core::{is_third_party, Decision, FilterEngine, RequestContext};

use crate::error::CliError;

/// One record of a request dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayRequest {
    pub url: String,
    #[serde(rename = "frameUrl", default)]
    pub frame_url: String,
    #[serde(default = "default_type")]
    pub cpt: String,
}

fn default_type() -> String {
    "other".to_string()
}

#[derive(Debug, Default)]
pub struct ReplayResult {
    pub requests: usize,
    pub blocked: usize,
    pub allowed: usize,
    pub no_match: usize,
    /// Time spent inside the engine
    pub total: Duration,
    pub p50: Duration,
    pub p99: Duration,
}

/// Read a JSONL dataset. Malformed lines are skipped.
pub fn load_requests_jsonl(path: &str, limit: usize) -> Result<Vec<ReplayRequest>, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::read(path, e))?;
    let mut out = Vec::new();
    let mut skipped = 0usize;
    for line in text.lines() {
        if out.len() >= limit {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ReplayRequest>(trimmed) {
            Ok(request) if !request.url.is_empty() => out.push(request),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        log::warn!("Skipped {} malformed request records in '{}'", skipped, path);
    }
    Ok(out)
}

pub fn replay(engine: &FilterEngine, requests: &[ReplayRequest]) -> ReplayResult {
    let mut result = ReplayResult::default();
    let mut latencies = Vec::with_capacity(requests.len());

    for request in requests {
        let hostname = extract_host(&request.url);
        let doc_hostname = if request.frame_url.is_empty() {
            hostname
        } else {
            extract_host(&request.frame_url)
        };
        let ctx = RequestContext {
            url: &request.url,
            doc_hostname,
            hostname,
            request_type: &request.cpt,
            is_third_party: is_third_party(doc_hostname, hostname),
        };

        let start = Instant::now();
        let decision = engine.match_request(&ctx);
        latencies.push(start.elapsed());

        match decision {
            Decision::Block => result.blocked += 1,
            Decision::Allow => result.allowed += 1,
            Decision::NoMatch => result.no_match += 1,
        }
        result.requests += 1;
    }

    latencies.sort_unstable();
    result.total = latencies.iter().sum();
    result.p50 = nearest_rank(&latencies, 50);
    result.p99 = nearest_rank(&latencies, 99);
    result
}

/// Nearest-rank percentile of sorted samples.
fn nearest_rank(sorted: &[Duration], percent: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (percent * sorted.len()).div_ceil(100).max(1);
    sorted[rank - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_rank() {
        let samples: Vec<Duration> = (1..=4).map(Duration::from_micros).collect();
        assert_eq!(nearest_rank(&samples, 50), Duration::from_micros(2));
        assert_eq!(nearest_rank(&samples, 99), Duration::from_micros(4));
        assert_eq!(nearest_rank(&samples[..1], 0), Duration::from_micros(1));
        assert_eq!(nearest_rank(&[], 50), Duration::ZERO);
    }

    #[test]
    fn test_request_record() {
        let request: ReplayRequest = serde_json::from_str(
            r#"{"url":"https://ads.com/a.js","frameUrl":"https://site.org/","cpt":"script"}"#,
        )
        .unwrap();
        assert_eq!(request.frame_url, "https://site.org/");
        assert_eq!(request.cpt, "script");

        let request: ReplayRequest = serde_json::from_str(r#"{"url":"https://a.com/"}"#).unwrap();
        assert_eq!(request.cpt, "other");
    }
}
