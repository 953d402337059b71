use std::{fmt, str::FromStr, sync::Arc};

use bitflags::bitflags;
use serde::{de, Deserialize, Deserializer, Serialize};

use super::data::{sort_descending, Candidate, SentenceTagging, Tagging};
use crate::{
    errors::{Error, Result},
    ngram::{NgramModel, SENT_END, SENT_START},
    numeric::{ln_prob, log_sum_exp, LN_10},
};

pub const DEFAULT_SEARCH_BEAM: usize = 5;

/// How the rescorer combines the lattice passes into per-token posteriors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TaggingAlgorithm {
    /// Marginals given the whole sentence.
    #[default]
    #[serde(rename = "forward-backward")]
    ForwardBackward,
    /// Prefix probabilities only.
    #[serde(rename = "forward")]
    Forward,
}

impl TaggingAlgorithm {
    fn passes(self) -> Passes {
        match self {
            TaggingAlgorithm::ForwardBackward => Passes::FORWARD | Passes::BACKWARD,
            TaggingAlgorithm::Forward => Passes::FORWARD,
        }
    }
}

impl FromStr for TaggingAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward-backward" | "forwardbackward" => Ok(TaggingAlgorithm::ForwardBackward),
            "forward" => Ok(TaggingAlgorithm::Forward),
            other => Err(Error::configuration(format!("unknown tagging algorithm '{other}'"))),
        }
    }
}

impl<'de> Deserialize<'de> for TaggingAlgorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

impl fmt::Display for TaggingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaggingAlgorithm::ForwardBackward => write!(f, "forward-backward"),
            TaggingAlgorithm::Forward => write!(f, "forward"),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Passes: u8 {
        const FORWARD = 0x01;
        const BACKWARD = 0x02;
    }
}

/// Rescores a sentence's candidate lists against an n-gram model over labels.
#[derive(Debug, Clone)]
pub struct SequenceScorer {
    lm: Arc<NgramModel>,
    algorithm: TaggingAlgorithm,
    search_beam: usize,
}

impl SequenceScorer {
    pub fn new(lm: Arc<NgramModel>) -> Self {
        Self {
            lm,
            algorithm: TaggingAlgorithm::default(),
            search_beam: DEFAULT_SEARCH_BEAM,
        }
    }

    pub fn with_algorithm(mut self, algorithm: TaggingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Number of best hypotheses at each position that are extended to the
    /// next one. Values below 1 are treated as 1.
    pub fn with_search_beam(mut self, search_beam: usize) -> Self {
        self.search_beam = search_beam.max(1);
        self
    }

    pub fn algorithm(&self) -> TaggingAlgorithm {
        self.algorithm
    }

    pub fn search_beam(&self) -> usize {
        self.search_beam
    }

    pub fn model(&self) -> &NgramModel {
        &self.lm
    }

    /// Returns new candidate lists for every token, each a reordered subset of
    /// the input list with probabilities summing to one.
    ///
    /// Tokens without candidates stay empty and are skipped by the lattice.
    pub fn rescore(&self, tagging: &SentenceTagging) -> SentenceTagging {
        let positions: Vec<usize> = (0..tagging.len()).filter(|&t| !tagging[t].is_empty()).collect();
        if positions.len() < tagging.len() {
            log::debug!(
                "{} of {} tokens have no candidates",
                tagging.len() - positions.len(),
                tagging.len()
            );
        }
        let lists: Vec<&Tagging> = positions.iter().map(|&t| &tagging[t]).collect();

        let mut trellis = Trellis::new(&lists, self.algorithm.passes());
        trellis.forward(self);
        if trellis.flag.contains(Passes::BACKWARD) {
            trellis.backward(self);
        }

        let mut rescored = vec![Tagging::new(); tagging.len()];
        for (t, &pos) in positions.iter().enumerate() {
            rescored[pos] = trellis.posterior(t, lists[t]);
        }
        rescored
    }

    fn transition(&self, history: &[&str], label: &str) -> f64 {
        self.lm.log_prob(history, label) as f64 * LN_10
    }

    fn history_len(&self) -> usize {
        self.lm.order().saturating_sub(1)
    }
}

/// Lattice over the candidate labels of a sentence. Node scores are stored
/// flat, row `t` spanning `offsets[t]..offsets[t + 1]`.
struct Trellis<'a> {
    flag: Passes,
    offsets: Vec<usize>,
    labels: Vec<&'a str>,
    /// ln p of each node's input candidate.
    obs: Vec<f64>,
    /// Row-normalised log forward scores.
    alpha: Vec<f64>,
    /// Row-normalised log backward scores.
    beta: Vec<f64>,
    /// Best predecessor of each node; `None` in the first row.
    backptr: Vec<Option<usize>>,
}

impl<'a> Trellis<'a> {
    fn new(lists: &[&'a Tagging], flag: Passes) -> Self {
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        let mut labels = Vec::new();
        let mut obs = Vec::new();
        offsets.push(0);
        for list in lists {
            for c in list.iter() {
                labels.push(c.label.as_str());
                obs.push(ln_prob(c.prob));
            }
            offsets.push(labels.len());
        }
        let n = labels.len();
        Self {
            flag,
            offsets,
            labels,
            obs,
            alpha: vec![f64::NEG_INFINITY; n],
            beta: if flag.contains(Passes::BACKWARD) {
                vec![0.0; n]
            } else {
                Vec::new()
            },
            backptr: vec![None; n],
        }
    }

    fn num_items(&self) -> usize {
        self.offsets.len() - 1
    }

    fn row(&self, t: usize) -> std::ops::Range<usize> {
        self.offsets[t]..self.offsets[t + 1]
    }

    /// The best label history ending at `node`, oldest first, at most `len`
    /// labels long. Runs off the start into `<s>`.
    fn history(&self, node: usize, len: usize) -> Vec<&'a str> {
        let mut hist = Vec::with_capacity(len);
        let mut cur = Some(node);
        while hist.len() < len {
            match cur {
                Some(n) => {
                    hist.push(self.labels[n]);
                    cur = self.backptr[n];
                }
                None => {
                    hist.push(SENT_START);
                    break;
                }
            }
        }
        hist.reverse();
        hist
    }

    fn start_history(len: usize) -> Vec<&'static str> {
        if len == 0 {
            Vec::new()
        } else {
            vec![SENT_START]
        }
    }

    fn forward(&mut self, scorer: &SequenceScorer) {
        let len = scorer.history_len();
        if self.num_items() == 0 {
            return;
        }

        let start = Self::start_history(len);
        for j in self.row(0) {
            self.alpha[j] = self.obs[j] + scorer.transition(&start, self.labels[j]);
        }
        let row = self.row(0);
        normalize(&mut self.alpha[row]);

        for t in 1..self.num_items() {
            let mut prev: Vec<usize> = self.row(t - 1).collect();
            prev.sort_by(|&a, &b| self.alpha[b].total_cmp(&self.alpha[a]));
            prev.truncate(scorer.search_beam);
            let histories: Vec<Vec<&str>> = prev.iter().map(|&i| self.history(i, len)).collect();

            let mut scores = vec![0.0; prev.len()];
            for j in self.row(t) {
                for (k, &i) in prev.iter().enumerate() {
                    scores[k] = self.alpha[i] + scorer.transition(&histories[k], self.labels[j]);
                }
                let best = scores
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map_or(0, |(k, _)| k);
                self.backptr[j] = Some(prev[best]);
                self.alpha[j] = self.obs[j] + log_sum_exp(&scores);
            }
            let row = self.row(t);
            normalize(&mut self.alpha[row]);
        }
    }

    fn backward(&mut self, scorer: &SequenceScorer) {
        let len = scorer.history_len();
        let t_last = match self.num_items() {
            0 => return,
            n => n - 1,
        };

        for i in self.row(t_last) {
            let hist = self.history(i, len);
            self.beta[i] = scorer.transition(&hist, SENT_END);
        }
        let row = self.row(t_last);
        normalize(&mut self.beta[row]);

        for t in (0..t_last).rev() {
            let next = self.row(t + 1);
            let mut scores = vec![0.0; next.len()];
            for i in self.row(t) {
                let hist = self.history(i, len);
                for (k, j) in next.clone().enumerate() {
                    scores[k] = scorer.transition(&hist, self.labels[j]) + self.obs[j] + self.beta[j];
                }
                self.beta[i] = log_sum_exp(&scores);
            }
            let row = self.row(t);
            normalize(&mut self.beta[row]);
        }
    }

    /// Renormalised posteriors for row `t`, sorted descending. Falls back to
    /// the renormalised input when every path through the row was pruned.
    fn posterior(&self, t: usize, input: &Tagging) -> Tagging {
        let row = self.row(t);
        let mut scores: Vec<f64> = self.alpha[row.clone()].to_vec();
        if self.flag.contains(Passes::BACKWARD) {
            for (s, b) in scores.iter_mut().zip(&self.beta[row]) {
                *s += b;
            }
        }

        let log_z = log_sum_exp(&scores);
        let mut tagging: Tagging = if log_z.is_finite() {
            input
                .iter()
                .zip(&scores)
                .map(|(c, s)| Candidate::new((s - log_z).exp(), c.label.as_str()))
                .collect()
        } else {
            log::debug!("no path reaches token #{t}; keeping its input probabilities");
            renormalized(input)
        };
        sort_descending(&mut tagging);
        tagging
    }
}

/// Shifts a row of log scores so that it sums to one in the probability
/// domain. Rows with no finite score are left alone.
fn normalize(row: &mut [f64]) {
    let log_z = log_sum_exp(row);
    if log_z.is_finite() {
        for v in row.iter_mut() {
            *v -= log_z;
        }
    }
}

fn renormalized(input: &Tagging) -> Tagging {
    let total: f64 = input.iter().map(|c| c.prob).sum();
    if total > 0.0 {
        input.iter().map(|c| Candidate::new(c.prob / total, c.label.as_str())).collect()
    } else {
        input.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG_BIGRAMS: &str = "\
\\data\\
ngram 1=4
ngram 2=4

\\1-grams:
-99\t<s>\t-0.5
-0.5\t</s>
-0.4\tDT\t-0.3
-0.3\tNN\t-0.2

\\2-grams:
-0.1\t<s> DT
-0.2\tDT NN
-0.1\tNN </s>
-0.9\tNN NN

\\end\\
";

    fn scorer(algorithm: TaggingAlgorithm) -> SequenceScorer {
        let lm = NgramModel::from_reader(TAG_BIGRAMS.as_bytes(), None).unwrap();
        SequenceScorer::new(Arc::new(lm)).with_algorithm(algorithm)
    }

    fn tagging(pairs: &[(f64, &str)]) -> Tagging {
        pairs.iter().map(|&(p, l)| Candidate::new(p, l)).collect()
    }

    fn sums_to_one(t: &Tagging) -> bool {
        (t.iter().map(|c| c.prob).sum::<f64>() - 1.0).abs() < 1e-9
    }

    #[test]
    fn parse_algorithm() {
        assert_eq!("forward".parse::<TaggingAlgorithm>().unwrap(), TaggingAlgorithm::Forward);
        assert_eq!(
            "Forward-Backward".parse::<TaggingAlgorithm>().unwrap(),
            TaggingAlgorithm::ForwardBackward
        );
        assert!(matches!(
            "viterbi".parse::<TaggingAlgorithm>(),
            Err(Error::Configuration(_))
        ));
        assert_eq!(TaggingAlgorithm::default().to_string(), "forward-backward");
    }

    #[test]
    fn labels_are_contained_and_normalised() {
        let input = vec![
            tagging(&[(0.6, "NN"), (0.4, "DT")]),
            tagging(&[(0.5, "NN"), (0.3, "DT"), (0.2, "VB")]),
            tagging(&[(1.0, "NN")]),
        ];
        for algorithm in [TaggingAlgorithm::ForwardBackward, TaggingAlgorithm::Forward] {
            let output = scorer(algorithm).rescore(&input);
            assert_eq!(output.len(), input.len());
            for (out, inp) in output.iter().zip(&input) {
                assert_eq!(out.len(), inp.len());
                assert!(out.iter().all(|c| inp.iter().any(|i| i.label == c.label)));
                assert!(sums_to_one(out));
                assert!(out.windows(2).all(|w| w[0].prob >= w[1].prob));
            }
        }
    }

    #[test]
    fn transitions_reorder_candidates() {
        // <s> DT is far likelier than <s> NN
        let input = vec![tagging(&[(0.5, "NN"), (0.5, "DT")])];
        let output = scorer(TaggingAlgorithm::Forward).rescore(&input);
        assert_eq!(output[0][0].label, "DT");
    }

    #[test]
    fn backward_pass_looks_ahead() {
        // after NN, DT is the likelier next label, but NN </s> beats DT </s>
        let input = vec![tagging(&[(1.0, "NN")]), tagging(&[(0.5, "DT"), (0.5, "NN")])];

        let forward = scorer(TaggingAlgorithm::Forward).rescore(&input);
        assert_eq!(forward[1][0].label, "DT");
        // p(DT | NN) : p(NN | NN) = 10^-0.6 : 10^-0.9
        let expected = 1.0 / (1.0 + 10f64.powf(-0.3));
        assert!((forward[1][0].prob - expected).abs() < 1e-9);

        let marginals = scorer(TaggingAlgorithm::ForwardBackward).rescore(&input);
        assert_eq!(marginals[1][0].label, "NN");
        assert_eq!(marginals[0], tagging(&[(1.0, "NN")]));
    }

    #[test]
    fn empty_tokens_are_bridged() {
        let input = vec![
            tagging(&[(0.7, "DT"), (0.3, "NN")]),
            Tagging::new(),
            tagging(&[(0.5, "NN"), (0.5, "DT")]),
        ];
        let output = scorer(TaggingAlgorithm::ForwardBackward).rescore(&input);
        assert!(output[1].is_empty());
        assert!(sums_to_one(&output[0]));
        // DT NN </s> is the likeliest path
        assert_eq!(output[2][0].label, "NN");
        assert!(scorer(TaggingAlgorithm::Forward).rescore(&Vec::new()).is_empty());
    }

    #[test]
    fn zero_probability_input() {
        let input = vec![tagging(&[(0.0, "NN"), (0.0, "DT")])];
        let output = scorer(TaggingAlgorithm::ForwardBackward).rescore(&input);
        assert_eq!(output[0].len(), 2);
        assert!(output[0].iter().all(|c| c.prob == 0.0));
    }

    #[test]
    fn narrow_search_beam() {
        let input = vec![
            tagging(&[(0.5, "NN"), (0.5, "DT")]),
            tagging(&[(0.5, "NN"), (0.5, "DT")]),
            tagging(&[(0.5, "NN"), (0.5, "DT")]),
        ];
        let s = scorer(TaggingAlgorithm::ForwardBackward).with_search_beam(0);
        assert_eq!(s.search_beam(), 1);
        for out in s.rescore(&input) {
            assert!(sums_to_one(&out));
        }
    }
}
