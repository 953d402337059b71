use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    iter,
    path::Path,
};

use crate::{
    errors::{Error, Result},
    vocab::Vocabulary,
};

pub const SENT_START: &str = "<s>";
pub const SENT_END: &str = "</s>";
pub const UNKNOWN: &str = "<unk>";

/// Base-10 log-probability reported for a word the model has never seen.
pub const NOT_FOUND: f32 = -99.0;

#[derive(Debug, Clone, Copy)]
struct NgramScores {
    logprob: f32,
    bow: f32,
}

/// Why reading stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    End,
    /// A section above the order cap was reached.
    Truncated,
    Eof,
}

/// A standard back-off n-gram model read from an ARPA file.
///
/// Scores are base-10 log-probabilities. When the model contains `<unk>`, words
/// outside its vocabulary are scored as `<unk>`.
#[derive(Debug)]
pub struct NgramModel {
    order: usize,
    vocab: Vocabulary,
    ngrams: HashMap<Vec<u32>, NgramScores>,
    counts: Vec<usize>,
    unk: Option<u32>,
}

impl NgramModel {
    pub fn from_path<P: AsRef<Path>>(path: P, max_order: Option<usize>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::ModelNotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(e),
        })?;
        log::info!("loading n-gram model from {}", path.display());
        Self::from_reader(BufReader::new(file), max_order)
    }

    /// Reads an ARPA model. The order is the highest `ngram N=` entry of the
    /// `\data\` header, capped at `max_order` when given.
    pub fn from_reader<R: BufRead>(reader: R, max_order: Option<usize>) -> Result<Self> {
        let (model, stop) = Self::read(reader, max_order)?;
        if stop == Stop::Eof {
            log::warn!("n-gram model has no \\end\\ marker");
        }
        Ok(model)
    }

    fn read<R: BufRead>(reader: R, max_order: Option<usize>) -> Result<(Self, Stop)> {
        let cap = max_order.unwrap_or(usize::MAX);
        let mut order = 0;
        let mut counts = Vec::new();
        let mut vocab = Vocabulary::default();
        let mut ngrams = HashMap::new();
        let mut found_data = false;
        let mut stop = Stop::Eof;
        let mut current = 0;
        let mut lineno = 0;

        for line in reader.lines() {
            let line = line?;
            lineno += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "\\data\\" {
                found_data = true;
                continue;
            }
            if !found_data {
                continue;
            }
            if let Some(header) = line.strip_prefix("ngram ") {
                let (n, total) = header
                    .split_once('=')
                    .and_then(|(n, total)| Some((n.trim().parse::<usize>().ok()?, total.trim().parse::<usize>().ok()?)))
                    .ok_or_else(|| Error::model_format(lineno, format!("bad n-gram header '{line}'")))?;
                if n == 0 || n > cap {
                    continue;
                }
                if counts.len() < n {
                    counts.resize(n, 0);
                }
                counts[n - 1] = total;
                order = order.max(n);
                continue;
            }
            if line == "\\end\\" {
                stop = Stop::End;
                break;
            }
            if let Some(section) = line.strip_prefix('\\').and_then(|s| s.strip_suffix("-grams:")) {
                current = section
                    .parse()
                    .map_err(|_| Error::model_format(lineno, format!("bad section header '{line}'")))?;
                if current > order {
                    stop = Stop::Truncated;
                    break;
                }
                continue;
            }
            if current == 0 {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < current + 1 {
                return Err(Error::model_format(
                    lineno,
                    format!("expected {current} words after the log-probability"),
                ));
            }
            let logprob: f32 = fields[0]
                .parse()
                .map_err(|_| Error::model_format(lineno, format!("bad log-probability '{}'", fields[0])))?;
            let bow = match fields.get(current + 1) {
                Some(s) if current < order => s
                    .parse()
                    .map_err(|_| Error::model_format(lineno, format!("bad back-off weight '{s}'")))?,
                _ => 0.0,
            };
            let key: Vec<u32> = fields[1..=current].iter().map(|w| vocab.insert(w) as u32).collect();
            ngrams.insert(key, NgramScores { logprob, bow });
        }

        if !found_data {
            return Err(Error::model_format(lineno, "missing \\data\\ header"));
        }
        if order == 0 {
            return Err(Error::model_format(lineno, "no n-gram counts in \\data\\ header"));
        }
        let unk = vocab.id(UNKNOWN).map(|i| i as u32);
        log::info!(
            "n-gram model loaded (order: {order}, n-grams: {}, vocabulary: {}, open vocabulary: {})",
            ngrams.len(),
            vocab.len(),
            unk.is_some()
        );
        let model = Self {
            order,
            vocab,
            ngrams,
            counts,
            unk,
        };
        Ok((model, stop))
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of n-grams declared in the header for each order.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    fn word_id(&self, word: &str) -> Option<u32> {
        self.vocab.id(word).map(|i| i as u32).or(self.unk)
    }

    fn lookup(&self, ids: &[Option<u32>]) -> Option<&NgramScores> {
        let key: Option<Vec<u32>> = ids.iter().copied().collect();
        self.ngrams.get(&key?)
    }

    // p(w3|w1,w2) = p3(w1,w2,w3)              if the trigram exists
    //             = bow(w1,w2) * p(w3|w2)     otherwise
    fn backoff(&self, ids: &[Option<u32>]) -> f32 {
        if let Some(scores) = self.lookup(ids) {
            return scores.logprob;
        }
        if ids.len() == 1 {
            return NOT_FOUND;
        }
        let mut logprob = self.backoff(&ids[1..]);
        if logprob > NOT_FOUND {
            logprob += self.lookup(&ids[..ids.len() - 1]).map_or(0.0, |s| s.bow);
        }
        logprob
    }

    /// log10 p(word | context). Only the last `order - 1` context words are used.
    pub fn log_prob(&self, context: &[&str], word: &str) -> f32 {
        let keep = context.len().min(self.order - 1);
        let ids: Vec<Option<u32>> = context[context.len() - keep..]
            .iter()
            .chain(iter::once(&word))
            .map(|w| self.word_id(w))
            .collect();
        self.backoff(&ids)
    }

    /// log10 probability of a whole word sequence. A leading `<s>` is a given
    /// and contributes nothing.
    pub fn score(&self, words: &[&str]) -> f32 {
        let mut total = 0.0;
        for i in 0..words.len() {
            if i == 0 && words[0] == SENT_START {
                continue;
            }
            let n = self.order.min(i + 1);
            total += self.log_prob(&words[i + 1 - n..i], words[i]);
        }
        total
    }
}

/// Converts a base-10 log-probability to a probability; [`NOT_FOUND`] maps to 0.
pub fn to_prob(logprob: f32) -> f64 {
    if logprob <= NOT_FOUND {
        0.0
    } else {
        10f64.powf(logprob as f64)
    }
}
