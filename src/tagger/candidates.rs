use super::data::{Candidate, Tagging};
use crate::maxent::{Distribution, Domain};

/// Builds the widened candidate list for one token.
///
/// Candidates are sorted by descending probability, ties by outcome index.
/// Everything with `prob >= ratio * best` is kept. With `gold` set, the walk
/// continues past the cutoff until the gold label has been added.
pub fn build_candidates(dist: &Distribution<'_>, ratio: f64, gold: Option<&str>) -> Tagging {
    let mut scored: Vec<(usize, &str, f64)> = dist
        .iter()
        .map(|(id, label, v)| match dist.domain() {
            Domain::Probability => (id, label, v),
            Domain::Log => (id, label, v.exp()),
        })
        .collect();
    scored.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)));

    let best = match scored.first() {
        Some(&(_, _, p)) => p,
        None => return Tagging::new(),
    };
    let cutoff = ratio * best;
    let mut tagging = Tagging::new();
    let mut gold_seen = false;
    for (_, label, prob) in scored {
        let missing_gold = gold.is_some() && !gold_seen;
        if prob < cutoff && !missing_gold {
            break;
        }
        gold_seen |= gold == Some(label);
        tagging.push(Candidate::new(prob, label));
    }
    tagging
}

/// The longest prefix of a descending `tagging` whose probabilities are all
/// at least `beta` times the first.
pub fn beta_best(tagging: &[Candidate], beta: f64) -> &[Candidate] {
    let Some(best) = tagging.first() else {
        return tagging;
    };
    let cutoff = beta * best.prob;
    let keep = tagging.iter().take_while(|c| c.prob >= cutoff).count();
    &tagging[..keep]
}

/// In-place version of [`beta_best`].
pub fn apply_beta(tagging: &mut Tagging, beta: f64) {
    let keep = beta_best(tagging, beta).len();
    tagging.truncate(keep);
}
