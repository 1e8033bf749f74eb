//! Signature matching — multi-metric fusion scoring.
//!
//! Two signatures are compared with four metrics (Euclidean, cosine,
//! Manhattan, Pearson correlation) fused into one confidence in [0, 1].
//! The weights live in [`MatchWeights`] so a deployment can tune them
//! without touching the algorithm shape.

use crate::types::Signature;

/// Fusion weights and scale constants for the confidence score.
///
/// Cosine similarity carries the largest weight: the signature blocks are
/// L2-normalized histograms, where angular distance is the most
/// discriminative of the four metrics.
#[derive(Debug, Clone)]
pub struct MatchWeights {
    pub euclidean: f64,
    pub cosine: f64,
    pub manhattan: f64,
    pub correlation: f64,
    /// Euclidean distance at this scale halves its term.
    pub euclidean_scale: f64,
    /// Manhattan distance at this scale halves its term.
    pub manhattan_scale: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            euclidean: 0.35,
            cosine: 0.40,
            manhattan: 0.15,
            correlation: 0.10,
            euclidean_scale: 100.0,
            manhattan_scale: 1000.0,
        }
    }
}

/// Guard against division by zero in the cosine and correlation terms.
const EPSILON: f64 = 1e-10;

/// Weight of the best sample vs. the sample average in multi-sample scoring.
const MULTI_BEST_WEIGHT: f64 = 0.7;
const MULTI_AVG_WEIGHT: f64 = 0.3;

/// Fused confidence that two signatures describe the same face, in [0, 1].
pub fn score(a: &Signature, b: &Signature, weights: &MatchWeights) -> f64 {
    let a = a.as_slice();
    let b = b.as_slice();

    let mut sq_dist = 0.0f64;
    let mut abs_dist = 0.0f64;
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        let d = x - y;
        sq_dist += d * d;
        abs_dist += d.abs();
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let euclidean_term = 1.0 / (1.0 + sq_dist.sqrt() / weights.euclidean_scale);
    let manhattan_term = 1.0 / (1.0 + abs_dist / weights.manhattan_scale);
    let cosine_term = dot / (norm_a.sqrt() * norm_b.sqrt() + EPSILON);
    let correlation_term = pearson(a, b);

    let confidence = weights.euclidean * euclidean_term
        + weights.cosine * cosine_term
        + weights.manhattan * manhattan_term
        + weights.correlation * correlation_term;

    confidence.clamp(0.0, 1.0)
}

/// True iff the fused confidence clears `1 - tolerance`.
pub fn is_match(a: &Signature, b: &Signature, tolerance: f64, weights: &MatchWeights) -> bool {
    score(a, b, weights) >= 1.0 - tolerance
}

/// Pearson correlation coefficient in [-1, 1].
///
/// A zero-variance input makes the coefficient undefined; it contributes 0.0
/// so the fused score stays finite.
fn pearson(a: &[f32], b: &[f32]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = var_a.sqrt() * var_b.sqrt();
    if denom < EPSILON {
        0.0
    } else {
        cov / denom
    }
}

/// Result of comparing a probe against one identity's sample set.
#[derive(Debug, Clone, Copy)]
pub struct MultiScore {
    /// Highest single-sample confidence.
    pub best: f64,
    /// Mean confidence across all samples.
    pub avg: f64,
    /// Reported confidence: best-weighted blend of `best` and `avg`.
    pub confidence: f64,
    /// Match decision — gates on `best`, not on the blended confidence.
    pub matched: bool,
}

/// Compare a probe signature against every known sample for one identity.
///
/// One good enrollment sample is enough to unlock recognition (`best` drives
/// the gate); the average tempers the reported confidence so a single lucky
/// outlier does not dominate it.
pub fn score_multi(
    known: &[Signature],
    unknown: &Signature,
    tolerance: f64,
    weights: &MatchWeights,
) -> MultiScore {
    if known.is_empty() {
        return MultiScore {
            best: 0.0,
            avg: 0.0,
            confidence: 0.0,
            matched: false,
        };
    }

    let mut best = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for sample in known {
        let c = score(sample, unknown, weights);
        sum += c;
        if c > best {
            best = c;
        }
    }
    let avg = sum / known.len() as f64;

    MultiScore {
        best,
        avg,
        confidence: MULTI_BEST_WEIGHT * best + MULTI_AVG_WEIGHT * avg,
        matched: best >= 1.0 - tolerance,
    }
}

/// One enrolled identity with its accumulated sample set.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub identity_id: i64,
    pub external_ref: String,
    pub display_name: String,
    /// Primary signature first, then training samples in capture order.
    pub signatures: Vec<Signature>,
}

/// Result of matching a probe against the whole enrolled pool.
#[derive(Debug, Clone)]
pub struct IdentifyOutcome {
    pub matched: bool,
    /// Blended confidence of the top candidate (reported even on non-match).
    pub confidence: f64,
    /// Identity of the top candidate, present only on a positive match.
    pub identity_id: Option<i64>,
    pub external_ref: Option<String>,
    pub display_name: Option<String>,
}

/// Match a probe against every enrolled identity.
///
/// Always traverses the full pool. The winner is the identity with the
/// highest blended confidence, ties broken by enrollment order; the match
/// gate is then evaluated on the winner's raw best-sample confidence,
/// independent of the confidence ordering. The top candidate can lose the
/// gate — that is a no-match, not a downgraded match.
pub fn identify(
    pool: &[Enrollment],
    unknown: &Signature,
    tolerance: f64,
    weights: &MatchWeights,
) -> IdentifyOutcome {
    let mut top: Option<(usize, MultiScore)> = None;

    for (i, enrollment) in pool.iter().enumerate() {
        let ms = score_multi(&enrollment.signatures, unknown, tolerance, weights);
        let is_better = match &top {
            None => true,
            Some((_, prev)) => ms.confidence > prev.confidence,
        };
        if is_better {
            top = Some((i, ms));
        }
    }

    match top {
        Some((i, ms)) if ms.matched => IdentifyOutcome {
            matched: true,
            confidence: ms.confidence,
            identity_id: Some(pool[i].identity_id),
            external_ref: Some(pool[i].external_ref.clone()),
            display_name: Some(pool[i].display_name.clone()),
        },
        Some((_, ms)) => IdentifyOutcome {
            matched: false,
            confidence: ms.confidence,
            identity_id: None,
            external_ref: None,
            display_name: None,
        },
        None => IdentifyOutcome {
            matched: false,
            confidence: 0.0,
            identity_id: None,
            external_ref: None,
            display_name: None,
        },
    }
}
