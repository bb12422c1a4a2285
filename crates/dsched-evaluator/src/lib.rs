//! The Evaluator (§4.3): a pure, side-effect-free scoring function over
//! parent/child candidates, plus the statistical bad-parent predicate. No
//! mutable state is held anywhere in this crate — every call is a function
//! of its arguments.

pub mod metrics;

use dsched_common::HostType;
use dsched_core_traits::{Host, ParentScorer, Peer, PeerState, PersistentPeer, ScoredCandidate};

const WEIGHT_PIECE_PROGRESS: f64 = 0.20;
const WEIGHT_UPLOAD_SUCCESS: f64 = 0.20;
const WEIGHT_FREE_UPLOAD: f64 = 0.15;
const WEIGHT_HOST_TYPE: f64 = 0.15;
const WEIGHT_IDC: f64 = 0.15;
const WEIGHT_LOCALITY: f64 = 0.15;

/// Fewer than this many piece costs is insufficient evidence to call a peer
/// a bad parent (§4.3).
const MIN_COST_SAMPLES: usize = 2;
/// Below this sample size the three-sigma test is unreliable; fall back to
/// a cruder 20x-mean outlier check (§4.3).
const NORMALITY_SAMPLE_THRESHOLD: usize = 30;

/// `parent`'s finished-piece count relative to `child`'s and `total_piece_count`
/// (§4.3, boundary cases in §8.10).
pub fn piece_progress_score(parent_finished: i64, child_finished: i64, total_piece_count: i64) -> f64 {
    if total_piece_count > 0 {
        parent_finished as f64 / total_piece_count as f64
    } else {
        (parent_finished - child_finished) as f64
    }
}

/// §8.12's boundary cases: (2,1) -> 0.5, (1,2) -> 0.
pub fn host_upload_success_score(upload_count: u64, upload_failed_count: u64) -> f64 {
    if upload_count < upload_failed_count {
        0.0
    } else if upload_count == 0 && upload_failed_count == 0 {
        1.0
    } else {
        (upload_count - upload_failed_count) as f64 / upload_count as f64
    }
}

/// §8.13: limit=0 -> 0.
pub fn free_upload_capacity_score(free_upload_count: u32, concurrent_upload_limit: u32) -> f64 {
    if concurrent_upload_limit == 0 {
        return 0.0;
    }
    (free_upload_count as f64 / concurrent_upload_limit as f64).clamp(0.0, 1.0)
}

pub fn host_type_score(host_type: HostType, parent_state: PeerState) -> f64 {
    match host_type {
        HostType::Normal => 0.5,
        HostType::SuperSeed => {
            if matches!(parent_state, PeerState::Running | PeerState::ReceivedNormal) {
                1.0
            } else {
                0.0
            }
        }
    }
}

pub fn idc_affinity_score(parent_idc: &str, child_idc: &str) -> f64 {
    if parent_idc.is_empty() || child_idc.is_empty() {
        return 0.0;
    }
    if parent_idc.eq_ignore_ascii_case(child_idc) {
        1.0
    } else {
        0.0
    }
}

/// §8.11: compares up to the first 5 pipe-separated elements of each
/// location string, scoring the length of the matching prefix over 5.
pub fn calculate_multi_element_affinity(parent_location: &str, child_location: &str) -> f64 {
    if parent_location.is_empty() || child_location.is_empty() {
        return 0.0;
    }
    let parent_elems: Vec<&str> = parent_location.split('|').take(5).collect();
    let child_elems: Vec<&str> = child_location.split('|').take(5).collect();
    let mut matched = 0usize;
    for i in 0..5 {
        match (parent_elems.get(i), child_elems.get(i)) {
            (Some(p), Some(c)) if p == c => matched += 1,
            _ => break,
        }
    }
    matched as f64 / 5.0
}

fn mean(values: &[u64]) -> f64 {
    values.iter().sum::<u64>() as f64 / values.len() as f64
}

fn population_stdev(values: &[u64], mean: f64) -> f64 {
    let variance = values
        .iter()
        .map(|v| {
            let d = *v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

/// §4.3's bad-parent predicate, lifted out as a free function over the raw
/// cost history so it can be unit tested against §8.14's fixtures directly.
pub fn is_bad_parent_cost_history(costs: &[u64]) -> bool {
    if costs.len() < MIN_COST_SAMPLES {
        return false;
    }
    let (rest, last) = costs.split_at(costs.len() - 1);
    let last = last[0] as f64;
    let m = mean(rest);
    if costs.len() < NORMALITY_SAMPLE_THRESHOLD {
        last > 20.0 * m
    } else {
        last > m + 3.0 * population_stdev(rest, m)
    }
}

/// The default weighted-sum scorer (§4.3). Other strategies (ML-backed,
/// plugin-backed) implement the same `ParentScorer` trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedEvaluator;

impl WeightedEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn score_candidate(&self, task_total_pieces: i64, child: &Peer, child_host: &Host, candidate: &ScoredCandidate<'_>) -> f64 {
        let parent = candidate.peer;
        let parent_host = candidate.host;

        let piece = piece_progress_score(
            parent.finished_piece_count(),
            child.finished_piece_count(),
            task_total_pieces,
        );
        let upload = host_upload_success_score(parent_host.upload_count, parent_host.upload_failed_count);
        let free = free_upload_capacity_score(
            parent_host.free_upload_count(),
            parent_host.concurrent_upload_limit,
        );
        let host_type = host_type_score(parent_host.host_type, parent.state);
        let idc = idc_affinity_score(&parent_host.idc, &child_host.idc);
        let locality = calculate_multi_element_affinity(&parent_host.location, &child_host.location);

        WEIGHT_PIECE_PROGRESS * piece
            + WEIGHT_UPLOAD_SUCCESS * upload
            + WEIGHT_FREE_UPLOAD * free
            + WEIGHT_HOST_TYPE * host_type
            + WEIGHT_IDC * idc
            + WEIGHT_LOCALITY * locality
    }

    fn score_persistent_candidate(
        &self,
        task_total_pieces: i64,
        child_host: &Host,
        peer: &PersistentPeer,
        host: &Host,
    ) -> f64 {
        let piece = piece_progress_score(
            peer.finished_pieces.iter().filter(|p| **p).count() as i64,
            0,
            task_total_pieces,
        );
        let idc = idc_affinity_score(&host.idc, &child_host.idc);
        let locality = calculate_multi_element_affinity(&host.location, &child_host.location);
        // Persistent-cache variant uses only these three features (§4.3);
        // renormalize their weights so the three sum to 1.0.
        let total_weight = WEIGHT_PIECE_PROGRESS + WEIGHT_IDC + WEIGHT_LOCALITY;
        (WEIGHT_PIECE_PROGRESS * piece + WEIGHT_IDC * idc + WEIGHT_LOCALITY * locality) / total_weight
    }
}

fn stable_rank_descending(scores: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    indices
}

impl ParentScorer for WeightedEvaluator {
    fn evaluate_parents(
        &self,
        task: &dsched_core_traits::Task,
        child: &Peer,
        child_host: &Host,
        candidates: &[ScoredCandidate<'_>],
    ) -> Vec<usize> {
        metrics::PARENT_EVALUATIONS.inc();
        let scores: Vec<f64> = candidates
            .iter()
            .map(|c| self.score_candidate(task.total_piece_count, child, child_host, c))
            .collect();
        stable_rank_descending(&scores)
    }

    fn evaluate_persistent_cache_parents(
        &self,
        task: &dsched_core_traits::Task,
        child_host: &Host,
        candidates: &[(&PersistentPeer, &Host)],
    ) -> Vec<usize> {
        let scores: Vec<f64> = candidates
            .iter()
            .map(|(peer, host)| {
                self.score_persistent_candidate(task.total_piece_count, child_host, peer, host)
            })
            .collect();
        stable_rank_descending(&scores)
    }

    fn is_bad_parent(&self, peer: &Peer) -> bool {
        if peer.state.is_immediately_bad_parent() {
            metrics::BAD_PARENT_FLAGS.inc();
            return true;
        }
        let costs: Vec<u64> = peer.piece_costs.iter().copied().collect();
        let bad = is_bad_parent_cost_history(&costs);
        if bad {
            metrics::BAD_PARENT_FLAGS.inc();
        }
        bad
    }

    fn is_bad_persistent_cache_parent(&self, peer: &PersistentPeer) -> bool {
        // Persistent-cache peers carry no live cost history; persistence
        // alone is evidence of health, so only an explicit bad marker would
        // apply here and the data model carries none.
        let _ = peer;
        false
    }
}
