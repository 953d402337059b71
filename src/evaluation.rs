use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    iter::zip,
};

use crate::tagger::{Tagging, Token};

/// A hit count over a total.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Measure {
    pub n_match: usize,
    pub n_total: usize,
}

impl Measure {
    #[inline]
    pub fn accuracy(&self) -> f64 {
        if self.n_total == 0 {
            0.0
        } else {
            self.n_match as f64 / self.n_total as f64
        }
    }

    #[inline]
    pub fn misses(&self) -> usize {
        self.n_total - self.n_match
    }

    fn add(&mut self, hit: bool) {
        self.n_total += 1;
        if hit {
            self.n_match += 1;
        }
    }
}

impl Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} => {:.4}", self.n_match, self.n_total, self.accuracy())
    }
}

/// Multitagging accuracy against gold labels. A word counts as right when
/// its gold label is among its surviving candidates. The breakdown tables are
/// keyed on the word's part of speech, so supertag runs are reported per POS.
#[derive(Debug, Default)]
pub struct Evaluation {
    /// Per gold part of speech.
    labels: BTreeMap<String, Measure>,
    /// Per first character of the part of speech (`N` for `NN`, `NNS`, ..).
    coarse: BTreeMap<String, Measure>,
    /// Number of candidates over all words.
    total_tags: usize,
    words: Measure,
    sentences: Measure,
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one sentence's tagging, index-aligned with its gold tokens.
    pub fn accumulate(&mut self, tagging: &[Tagging], gold: &[Token]) {
        if tagging.len() != gold.len() {
            log::warn!(
                "tagging has {} tokens but the gold sentence has {}",
                tagging.len(),
                gold.len()
            );
        }
        let mut all_correct = tagging.len() == gold.len();
        for (candidates, token) in zip(tagging, gold) {
            self.total_tags += candidates.len();
            let Some(label) = token.label.as_deref() else {
                log::warn!("no gold label for '{}', skipping", token.form);
                self.words.n_total += 1;
                all_correct = false;
                continue;
            };
            let hit = candidates.iter().any(|c| c.label == label);
            self.words.add(hit);
            let pos = token.pos().unwrap_or(label);
            self.labels.entry(pos.to_string()).or_default().add(hit);
            let coarse: String = pos.chars().take(1).collect();
            self.coarse.entry(coarse).or_default().add(hit);
            all_correct &= hit;
        }
        self.sentences.add(all_correct);
    }

    pub fn words(&self) -> Measure {
        self.words
    }

    pub fn sentences(&self) -> Measure {
        self.sentences
    }

    pub fn label(&self, label: &str) -> Option<Measure> {
        self.labels.get(label).copied()
    }

    pub fn coarse_label(&self, prefix: &str) -> Option<Measure> {
        self.coarse.get(prefix).copied()
    }

    /// Average number of candidates per word.
    pub fn tags_per_word(&self) -> f64 {
        if self.words.n_total == 0 {
            0.0
        } else {
            self.total_tags as f64 / self.words.n_total as f64
        }
    }

    fn write_table(&self, f: &mut fmt::Formatter<'_>, table: &BTreeMap<String, Measure>) -> fmt::Result {
        let errors = self.words.misses();
        for (label, m) in table {
            write!(f, "\t{label}: {m}")?;
            if errors > 0 {
                write!(f, " ({:.2}% of errors)", 100.0 * m.misses() as f64 / errors as f64)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Accuracy by part of speech (#right/#total => accuracy):")?;
        self.write_table(f, &self.labels)?;
        writeln!(f, "Accuracy by coarse part of speech:")?;
        self.write_table(f, &self.coarse)?;
        writeln!(f, "Tags per word: {:.4}", self.tags_per_word())?;
        writeln!(f, "Word accuracy: {}", self.words)?;
        writeln!(f, "Sentence accuracy: {}", self.sentences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::Candidate;

    /// One space-separated candidate list per token.
    fn tagging(tokens: &[&str]) -> Vec<Tagging> {
        tokens
            .iter()
            .map(|ls| {
                let labels: Vec<&str> = ls.split_whitespace().collect();
                let p = 1.0 / labels.len() as f64;
                labels.into_iter().map(|l| Candidate::new(p, l)).collect()
            })
            .collect()
    }

    #[test]
    fn counts() {
        let mut eval = Evaluation::new();
        let gold = [Token::labelled("the", "DT"), Token::labelled("dogs", "NNS")];
        eval.accumulate(&tagging(&["DT", "NN NNS"]), &gold);
        eval.accumulate(&tagging(&["DT", "VBZ"]), &gold);

        assert_eq!(eval.words(), Measure { n_match: 3, n_total: 4 });
        assert_eq!(eval.sentences(), Measure { n_match: 1, n_total: 2 });
        assert_eq!(eval.label("NNS"), Some(Measure { n_match: 1, n_total: 2 }));
        assert_eq!(eval.coarse_label("D"), Some(Measure { n_match: 2, n_total: 2 }));
        assert!((eval.tags_per_word() - 5.0 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn supertags_by_pos() {
        let mut eval = Evaluation::new();
        let gold = [
            Token::labelled("dogs", "n").with_pos("NNS"),
            Token::labelled("bark", "s\\np").with_pos("VBP"),
        ];
        eval.accumulate(&tagging(&["n", "s\\np np"]), &gold);
        eval.accumulate(&tagging(&["np", "s\\np"]), &gold);

        assert_eq!(eval.words(), Measure { n_match: 3, n_total: 4 });
        assert_eq!(eval.label("NNS"), Some(Measure { n_match: 1, n_total: 2 }));
        assert_eq!(eval.label("VBP"), Some(Measure { n_match: 2, n_total: 2 }));
        assert_eq!(eval.coarse_label("V"), Some(Measure { n_match: 2, n_total: 2 }));
        assert_eq!(eval.label("n"), None);
        assert_eq!(eval.coarse_label("s"), None);
    }

    #[test]
    fn missing_gold_spoils_sentence() {
        let mut eval = Evaluation::new();
        eval.accumulate(&tagging(&["DT", "NN"]), &[Token::labelled("a", "DT"), Token::new("b")]);
        assert_eq!(eval.words(), Measure { n_match: 1, n_total: 2 });
        assert_eq!(eval.sentences().n_match, 0);
    }

    #[test]
    fn report() {
        let mut eval = Evaluation::new();
        eval.accumulate(&tagging(&["NN"]), &[Token::labelled("x", "VB")]);
        let report = eval.to_string();
        assert!(report.contains("\tVB: 0/1 => 0.0000 (100.00% of errors)"));
        assert!(report.contains("Word accuracy: 0/1 => 0.0000"));
        assert!(Evaluation::new().to_string().contains("Sentence accuracy: 0/0"));
    }
}
