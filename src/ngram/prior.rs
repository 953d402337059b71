use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use super::arpa::{to_prob, NgramModel};
use crate::{
    errors::{Error, Result},
    tagger::data::{sort_descending, Candidate},
};

const WORD_FACTOR: &str = "W-";
const TAG_FACTOR: &str = "P-";

/// Estimates p(tag | word) from a unigram model over `W-<word>:P-<tag>` bundles.
#[derive(Debug)]
pub struct PriorModel {
    lm: NgramModel,
    tags: Vec<String>,
}

impl PriorModel {
    /// Loads the bundle model and, when given, the tag list from a vocabulary
    /// file (one `P-<tag>` entry per line, other lines ignored). Without a
    /// vocabulary the tags are taken from the model's own bundles.
    pub fn from_paths<P: AsRef<Path>, Q: AsRef<Path>>(model: P, vocab: Option<Q>) -> Result<Self> {
        let lm = NgramModel::from_path(model, Some(1))?;
        let tags = match vocab {
            Some(path) => {
                let path = path.as_ref();
                let file = File::open(path).map_err(|_| Error::ModelNotFound {
                    path: path.to_path_buf(),
                })?;
                read_tag_vocab(BufReader::new(file))?
            }
            None => tags_of(&lm),
        };
        Ok(Self::new(lm, tags))
    }

    pub fn new(lm: NgramModel, tags: Vec<String>) -> Self {
        log::info!("prior model over {} tags", tags.len());
        Self { lm, tags }
    }

    pub fn from_model(lm: NgramModel) -> Self {
        let tags = tags_of(&lm);
        Self::new(lm, tags)
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Joint probability of `word` occurring with `tag`.
    pub fn prior_of(&self, tag: &str, word: &str) -> f64 {
        let bundle = format!("{WORD_FACTOR}{word}:{TAG_FACTOR}{tag}");
        to_prob(self.lm.log_prob(&[], &bundle))
    }

    /// The tag distribution for `word`, sorted by descending probability.
    /// Words the model knows nothing about get a uniform distribution.
    pub fn priors(&self, word: &str) -> Vec<Candidate> {
        let joint: Vec<f64> = self.tags.iter().map(|t| self.prior_of(t, word)).collect();
        let total: f64 = joint.iter().sum();
        let mut priors: Vec<Candidate> = if total > 0.0 {
            self.tags
                .iter()
                .zip(&joint)
                .map(|(t, p)| Candidate::new(p / total, t.as_str()))
                .collect()
        } else {
            let uniform = 1.0 / self.tags.len() as f64;
            self.tags.iter().map(|t| Candidate::new(uniform, t.as_str())).collect()
        };
        sort_descending(&mut priors);
        priors
    }
}

fn read_tag_vocab<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut tags = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(tag) = line.trim().strip_prefix(TAG_FACTOR) {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
    }
    Ok(tags)
}

fn tags_of(lm: &NgramModel) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in lm.vocabulary().iter() {
        if let Some(tag) = word.split(':').find_map(|f| f.strip_prefix(TAG_FACTOR)) {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
    }
    tags
}
