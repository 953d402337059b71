use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    ops::Index,
    path::Path,
};

use super::context::{Attribute, PRESENT};
use crate::{
    errors::{Error, Result},
    numeric::log_sum_exp,
    vocab::Vocabulary,
};

/// Whether a distribution holds probabilities or natural-log probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Probability,
    Log,
}

/// Predicate to outcome associations.
///
/// The associations of predicate `p` are `outcomes[offsets[p]..offsets[p + 1]]`.
/// Weight slots are handed out sequentially while loading, so the slot of an
/// association is its position in `outcomes`.
#[derive(Debug, Default)]
struct ParamTable {
    offsets: Vec<usize>,
    outcomes: Vec<usize>,
}

impl ParamTable {
    #[inline]
    fn params(&self, pred: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let (begin, end) = (self.offsets[pred], self.offsets[pred + 1]);
        (begin..end).map(move |slot| (self.outcomes[slot], slot))
    }

    fn num_slots(&self) -> usize {
        self.outcomes.len()
    }
}

/// A trained log-linear (maximum entropy) classifier.
///
/// Immutable after loading, so one instance can serve any number of threads.
#[derive(Debug)]
pub struct ClassifierModel {
    preds: Vocabulary,
    outcomes: Vocabulary,
    params: ParamTable,
    theta: Vec<f64>,
}

/// Line source that remembers the current line number for error reporting.
struct ModelLines<R> {
    lines: io::Lines<R>,
    line: usize,
}

impl<R: BufRead> ModelLines<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }

    fn next_line(&mut self, what: &str) -> Result<String> {
        match self.lines.next() {
            Some(line) => {
                self.line += 1;
                let mut line = line?;
                if line.ends_with('\r') {
                    line.pop();
                }
                Ok(line)
            }
            None => Err(Error::model_format(
                self.line + 1,
                format!("unexpected end of file, expected {what}"),
            )),
        }
    }

    fn parse_count(&self, s: &str, what: &str) -> Result<usize> {
        s.trim()
            .parse()
            .map_err(|_| Error::model_format(self.line, format!("expected {what}, found '{}'", s.trim())))
    }

    fn next_count(&mut self, what: &str) -> Result<usize> {
        let line = self.next_line(what)?;
        self.parse_count(&line, what)
    }

    fn read_names(&mut self, n: usize, what: &str) -> Result<Vocabulary> {
        let mut vocab = Vocabulary::with_capacity(n);
        for _ in 0..n {
            let name = self.next_line(what)?;
            if vocab.contains(&name) {
                return Err(Error::model_format(self.line, format!("duplicate {what} '{name}'")));
            }
            vocab.insert(&name);
        }
        Ok(vocab)
    }
}

impl ClassifierModel {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::ModelNotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(e),
        })?;
        log::info!("loading maxent model from {}", path.display());
        Self::from_reader(BufReader::new(file))
    }

    /// Reads the line-oriented text format:
    ///
    /// ```text
    /// # optional comment
    /// <#predicates>
    /// <predicate>            (one per line)
    /// <#outcomes>
    /// <outcome>              (one per line)
    /// <k> <oid_1> .. <oid_k> (one line per predicate)
    /// <#weights>
    /// <weight>               (one per line)
    /// ```
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = ModelLines::new(reader);

        let mut line = lines.next_line("predicate count")?;
        if line.contains('#') {
            line = lines.next_line("predicate count")?;
        }
        let n_preds = lines.parse_count(&line, "predicate count")?;
        let preds = lines.read_names(n_preds, "predicate")?;

        let n_outcomes = lines.next_count("outcome count")?;
        let outcomes = lines.read_names(n_outcomes, "outcome")?;

        let mut params = ParamTable {
            offsets: Vec::with_capacity(n_preds + 1),
            outcomes: Vec::new(),
        };
        params.offsets.push(0);
        for p in 0..n_preds {
            let line = lines.next_line("parameter line")?;
            let mut fields = line.split_whitespace();
            let arity = match fields.next() {
                Some(k) => lines.parse_count(k, "parameter arity")?,
                None => {
                    return Err(Error::model_format(
                        lines.line,
                        format!("empty parameter line for predicate #{p}"),
                    ))
                }
            };
            let begin = params.outcomes.len();
            for field in fields {
                let oid = lines.parse_count(field, "outcome index")?;
                if oid >= outcomes.len() {
                    return Err(Error::model_format(
                        lines.line,
                        format!("outcome index {oid} out of range (#outcomes: {})", outcomes.len()),
                    ));
                }
                params.outcomes.push(oid);
            }
            let found = params.outcomes.len() - begin;
            if found != arity {
                return Err(Error::model_format(
                    lines.line,
                    format!("predicate #{p} declares {arity} outcomes but lists {found}"),
                ));
            }
            params.offsets.push(params.outcomes.len());
        }

        let n_theta = lines.next_count("weight count")?;
        if n_theta != params.num_slots() {
            return Err(Error::model_format(
                lines.line,
                format!(
                    "declared {n_theta} weights but the parameter table allocates {}",
                    params.num_slots()
                ),
            ));
        }
        let mut theta = Vec::with_capacity(n_theta);
        for _ in 0..n_theta {
            let line = lines.next_line("weight")?;
            let w: f64 = line
                .trim()
                .parse()
                .map_err(|_| Error::model_format(lines.line, format!("expected weight, found '{}'", line.trim())))?;
            theta.push(w);
        }

        log::info!(
            "maxent model loaded (predicates: {}, outcomes: {}, weights: {})",
            preds.len(),
            outcomes.len(),
            theta.len()
        );
        Ok(Self {
            preds,
            outcomes,
            params,
            theta,
        })
    }

    pub fn num_outcomes(&self) -> usize {
        self.outcomes.len()
    }

    pub fn num_predicates(&self) -> usize {
        self.preds.len()
    }

    pub fn num_weights(&self) -> usize {
        self.theta.len()
    }

    pub fn outcome(&self, id: usize) -> Option<&str> {
        self.outcomes.get(id)
    }

    pub fn outcome_id(&self, label: &str) -> Option<usize> {
        self.outcomes.id(label)
    }

    pub fn outcomes(&self) -> &Vocabulary {
        &self.outcomes
    }

    /// Scores a feature context and returns the normalised distribution over
    /// all outcomes.
    ///
    /// Unknown predicates contribute nothing. A non-finite activation is an
    /// error.
    pub fn evaluate(&self, context: &[Attribute], domain: Domain) -> Result<Distribution<'_>> {
        let mut scores = vec![0.0; self.outcomes.len()];
        for attr in context {
            if !attr.value.is_finite() {
                return Err(Error::InvalidActivation {
                    feature: attr.name.clone(),
                    value: attr.value,
                });
            }
            let Some(pred) = self.preds.id(&attr.name) else {
                continue;
            };
            for (outcome, slot) in self.params.params(pred) {
                let lambda = self.theta[slot];
                // ln(exp(lambda)^v) == lambda * v
                scores[outcome] += if attr.value == PRESENT {
                    lambda
                } else {
                    lambda * attr.value
                };
            }
        }

        let log_z = log_sum_exp(&scores);
        for s in scores.iter_mut() {
            *s -= log_z;
        }
        if domain == Domain::Probability {
            for s in scores.iter_mut() {
                *s = s.exp();
            }
        }
        Ok(Distribution {
            values: scores,
            domain,
            outcomes: &self.outcomes,
        })
    }

    /// Label with the largest value, or `None` for an empty vector.
    pub fn best_outcome(&self, values: &[f64]) -> Option<&str> {
        argmax(values, f64::NEG_INFINITY).and_then(|i| self.outcomes.get(i))
    }

    /// Same as [`best_outcome`](Self::best_outcome) but with the running
    /// maximum starting at 0.0, as older models were scored: a vector with no
    /// positive value has no best outcome. Always `None` for log-domain input.
    pub fn best_outcome_compat(&self, values: &[f64]) -> Option<&str> {
        argmax(values, 0.0).and_then(|i| self.outcomes.get(i))
    }
}

/// First index whose value strictly exceeds both `floor` and all earlier values.
fn argmax(values: &[f64], floor: f64) -> Option<usize> {
    let mut best = floor;
    let mut idx = None;
    for (i, &v) in values.iter().enumerate() {
        if v > best {
            best = v;
            idx = Some(i);
        }
    }
    if idx.is_none() && floor == f64::NEG_INFINITY && !values.is_empty() {
        // every value is -inf (or NaN)
        idx = Some(0);
    }
    idx
}

/// Per-outcome scores for one feature context, indexable by outcome id or label.
#[derive(Debug, Clone)]
pub struct Distribution<'a> {
    values: Vec<f64>,
    domain: Domain,
    outcomes: &'a Vocabulary,
}

impl<'a> Distribution<'a> {
    /// Wraps scores computed elsewhere, one per outcome of `outcomes`.
    pub fn from_values(values: Vec<f64>, domain: Domain, outcomes: &'a Vocabulary) -> Result<Self> {
        if values.len() != outcomes.len() {
            return Err(Error::OutcomeMismatch {
                expected: outcomes.len(),
                found: values.len(),
            });
        }
        Ok(Self {
            values,
            domain,
            outcomes,
        })
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn label(&self, id: usize) -> Option<&'a str> {
        self.outcomes.get(id)
    }

    /// Value of the outcome named `label`.
    pub fn get(&self, label: &str) -> Option<f64> {
        self.outcomes.id(label).map(|i| self.values[i])
    }

    /// `(outcome id, label, value)` in outcome order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &'a str, f64)> + '_ {
        let outcomes = self.outcomes;
        self.values
            .iter()
            .enumerate()
            .filter_map(move |(i, &v)| outcomes.get(i).map(|label| (i, label, v)))
    }

    pub fn best_outcome(&self) -> Option<&'a str> {
        argmax(&self.values, f64::NEG_INFINITY).and_then(|i| self.outcomes.get(i))
    }

    pub fn best_outcome_compat(&self) -> Option<&'a str> {
        argmax(&self.values, 0.0).and_then(|i| self.outcomes.get(i))
    }
}

impl Index<usize> for Distribution<'_> {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAT_DOG: &str = "# cat/dog\n2\nw=cat\nw=dog\n2\nNOUN\nVERB\n1 0\n1 1\n2\n1.0\n-1.0\n";

    fn model(s: &str) -> Result<ClassifierModel> {
        ClassifierModel::from_reader(s.as_bytes())
    }

    #[test]
    fn load() {
        let m = model(CAT_DOG).unwrap();
        assert_eq!(m.num_predicates(), 2);
        assert_eq!(m.num_outcomes(), 2);
        assert_eq!(m.num_weights(), 2);
        assert_eq!(m.outcome(1), Some("VERB"));
        assert_eq!(m.outcome_id("NOUN"), Some(0));
    }

    #[test]
    fn load_without_comment() {
        let m = model("1\nw=a\n2\nA\nB\n2 0 1\n2\n0.5\n0.25\n").unwrap();
        assert_eq!(m.num_weights(), 2);
    }

    #[test]
    fn cat_is_a_noun() {
        let m = model(CAT_DOG).unwrap();
        let d = m.evaluate(&[Attribute::present("w=cat")], Domain::Probability).unwrap();
        assert_eq!(d.best_outcome(), Some("NOUN"));
        assert!(d.get("NOUN").unwrap() > 0.5);
        let expected = 1.0 / (1.0 + (-1.0f64).exp());
        assert!((d.get("NOUN").unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn dog_weight_is_negative() {
        let m = model(CAT_DOG).unwrap();
        let d = m.evaluate(&[Attribute::present("w=dog")], Domain::Probability).unwrap();
        assert_eq!(d.best_outcome(), Some("NOUN"));
        assert!(d.get("VERB").unwrap() < 0.5);
    }

    #[test]
    fn distribution_sums_to_one() {
        let m = model(CAT_DOG).unwrap();
        let ctx = vec![
            Attribute::present("w=cat"),
            Attribute::new("w=dog", 0.3),
            Attribute::present("unknown"),
        ];
        let d = m.evaluate(&ctx, Domain::Probability).unwrap();
        let sum: f64 = d.values().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn log_domain() {
        let m = model(CAT_DOG).unwrap();
        let ctx = vec![Attribute::present("w=cat")];
        let p = m.evaluate(&ctx, Domain::Probability).unwrap();
        let l = m.evaluate(&ctx, Domain::Log).unwrap();
        for i in 0..p.len() {
            assert!((l[i].exp() - p[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn real_valued_activation() {
        let m = model(CAT_DOG).unwrap();
        let d = m.evaluate(&[Attribute::new("w=cat", 2.0)], Domain::Log).unwrap();
        // scores (2, 0) normalised
        assert!(((d[0] - d[1]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn duplicate_features_are_additive() {
        let m = model(CAT_DOG).unwrap();
        let twice = vec![Attribute::present("w=cat"), Attribute::present("w=cat")];
        let d = m.evaluate(&twice, Domain::Log).unwrap();
        assert!(((d[0] - d[1]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_features_give_uniform() {
        let m = model(CAT_DOG).unwrap();
        let d = m.evaluate(&[Attribute::present("w=emu")], Domain::Probability).unwrap();
        assert!((d[0] - 0.5).abs() < 1e-12);
        assert!((d[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn deterministic() {
        let m = model(CAT_DOG).unwrap();
        let ctx = vec![Attribute::new("w=cat", 0.7), Attribute::present("w=dog")];
        let a = m.evaluate(&ctx, Domain::Probability).unwrap();
        let b = m.evaluate(&ctx, Domain::Probability).unwrap();
        assert_eq!(a.values(), b.values());
    }

    #[test]
    fn non_finite_activation() {
        let m = model(CAT_DOG).unwrap();
        let ret = m.evaluate(&[Attribute::new("w=cat", f64::NAN)], Domain::Probability);
        assert!(matches!(ret, Err(Error::InvalidActivation { .. })));
    }

    #[test]
    fn best_outcome_of_peaked_distribution() {
        let labels: Vec<String> = (0..5).map(|i| format!("T{i}")).collect();
        let mut s = format!("0\n{}\n", labels.len());
        for l in &labels {
            s.push_str(l);
            s.push('\n');
        }
        s.push_str("0\n");
        let m = model(&s).unwrap();
        let mut values = vec![0.1 / 4.0; 5];
        values[3] = 0.9;
        assert_eq!(m.best_outcome(&values), Some("T3"));
        assert_eq!(m.best_outcome_compat(&values), Some("T3"));
    }

    #[test]
    fn best_outcome_with_no_positive_value() {
        let m = model(CAT_DOG).unwrap();
        let values = [-2.0, -0.5];
        // corrected behaviour picks the true maximum
        assert_eq!(m.best_outcome(&values), Some("VERB"));
        // zero-initialised maximum finds nothing
        assert_eq!(m.best_outcome_compat(&values), None);
        assert_eq!(m.best_outcome_compat(&[0.0, 0.0]), None);
        assert_eq!(m.best_outcome(&[]), None);
    }

    #[test]
    fn bad_counts() {
        match model("two\n") {
            Err(Error::ModelFormat { line: 1, .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
        match model("# c\n1\nw=a\nx\n") {
            Err(Error::ModelFormat { line: 4, .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn arity_mismatch() {
        match model("1\nw=a\n2\nA\nB\n2 0\n1\n0.5\n") {
            Err(Error::ModelFormat { line: 6, .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn weight_count_mismatch() {
        match model("1\nw=a\n2\nA\nB\n2 0 1\n3\n0.5\n0.5\n0.5\n") {
            Err(Error::ModelFormat { line: 7, .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
        match model("1\nw=a\n2\nA\nB\n2 0 1\n2\n0.5\n") {
            Err(Error::ModelFormat { line: 9, .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn outcome_out_of_range() {
        assert!(matches!(
            model("1\nw=a\n1\nA\n1 3\n1\n0.5\n"),
            Err(Error::ModelFormat { line: 5, .. })
        ));
    }

    #[test]
    fn missing_file() {
        match ClassifierModel::from_path("tests/data/does-not-exist.mod") {
            Err(Error::ModelNotFound { .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }
}
