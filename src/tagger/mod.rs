pub mod basic;
pub mod candidates;
pub mod data;
pub mod dummy;
pub mod features;
pub mod sequence;

use rayon::prelude::*;

pub use basic::StatisticalTagger;
pub use candidates::{apply_beta, beta_best, build_candidates};
pub use data::{Candidate, SentenceTagging, TaggedToken, Tagging, Token};
pub use dummy::PassThroughTagger;
pub use features::{FeatureExtractor, WindowFeatureExtractor};
pub use sequence::{SequenceScorer, TaggingAlgorithm};

use crate::{
    config::{ModelStore, TaggerConfig, TaggerType},
    errors::{Error, Result},
};

/// Label given to a token that ends up with no candidate.
pub const DEFAULT_OOV_LABEL: &str = "UNK";

/// Tag a whole sentence.
pub trait SentenceTagger {
    /// Returns one candidate list per token, index-aligned with `sentence`.
    fn tag_sentence(&self, sentence: &[Token]) -> Result<SentenceTagging>;
}

/// The tagger kinds a configuration can select.
#[derive(Debug)]
pub enum Tagger {
    PassThrough(PassThroughTagger),
    Statistical(Box<StatisticalTagger>),
}

impl Tagger {
    /// Builds the tagger a validated configuration describes, loading models
    /// through `store`.
    pub fn from_config(config: &TaggerConfig, store: &mut ModelStore) -> Result<Self> {
        config.validate()?;
        let tagger_type = config
            .tagger_type
            .ok_or_else(|| Error::configuration("missing taggerType"))?;
        log::info!("building {tagger_type} tagger");
        match tagger_type {
            TaggerType::Dummy => Ok(Tagger::PassThrough(PassThroughTagger::new(config.oov_label.as_str()))),
            TaggerType::Basic => {
                let (Some(maxent), Some(sequence)) = (&config.maxent_model, &config.sequence_model) else {
                    return Err(Error::configuration("a basic tagger needs maxentModel and sequenceModel"));
                };
                let model = store.classifier(maxent)?;
                let lm = store.sequence_model(sequence)?;
                let extractor = match &config.prior_model {
                    Some(prior) => {
                        let prior = store.prior(prior, config.prior_model_vocab.as_deref())?;
                        WindowFeatureExtractor::with_prior(prior)
                    }
                    None => WindowFeatureExtractor::new(),
                };
                let scorer = SequenceScorer::new(lm)
                    .with_algorithm(config.tagging_algorithm)
                    .with_search_beam(config.search_beam);
                let tagger = StatisticalTagger::new(model, scorer, Box::new(extractor))
                    .with_beta(config.beta)
                    .with_include_gold(config.include_gold)
                    .with_oov_label(config.oov_label.as_str());
                log::debug!("{tagger:?}");
                Ok(Tagger::Statistical(Box::new(tagger)))
            }
        }
    }

    /// Tags every sentence in a pool of `threads` workers. Results keep the
    /// input order; a failed sentence carries its index and does not stop the
    /// others.
    pub fn tag_batch<S>(&self, sentences: &[S], threads: usize) -> Result<Vec<Result<SentenceTagging>>>
    where
        S: AsRef<[Token]> + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()?;
        Ok(pool.install(|| {
            sentences
                .par_iter()
                .enumerate()
                .map(|(i, s)| self.tag_sentence(s.as_ref()).map_err(|e| e.in_sentence(i)))
                .collect()
        }))
    }
}

impl SentenceTagger for Tagger {
    fn tag_sentence(&self, sentence: &[Token]) -> Result<SentenceTagging> {
        match self {
            Tagger::PassThrough(t) => t.tag_sentence(sentence),
            Tagger::Statistical(t) => t.tag_sentence(sentence),
        }
    }
}

impl From<PassThroughTagger> for Tagger {
    fn from(t: PassThroughTagger) -> Self {
        Tagger::PassThrough(t)
    }
}

impl From<StatisticalTagger> for Tagger {
    fn from(t: StatisticalTagger) -> Self {
        Tagger::Statistical(Box::new(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_through_batch() {
        let tagger = Tagger::from(PassThroughTagger::default());
        let sentences: Vec<Vec<Token>> = (0..7)
            .map(|i| vec![Token::labelled(format!("w{i}"), format!("T{i}"))])
            .collect();
        for threads in [1, 3, 16] {
            let results = tagger.tag_batch(&sentences, threads).unwrap();
            assert_eq!(results.len(), 7);
            for (i, r) in results.into_iter().enumerate() {
                assert_eq!(r.unwrap(), vec![vec![Candidate::new(1.0, format!("T{i}"))]]);
            }
        }
        assert!(tagger.tag_batch::<Vec<Token>>(&[], 4).unwrap().is_empty());
    }

    #[test]
    fn shareable_across_threads() {
        fn check<T: Send + Sync>() {}
        check::<Tagger>();
    }

    #[test]
    fn dummy_from_config() {
        let config = TaggerConfig {
            tagger_type: Some(TaggerType::Dummy),
            ..Default::default()
        };
        let tagger = Tagger::from_config(&config, &mut ModelStore::new()).unwrap();
        assert!(matches!(tagger, Tagger::PassThrough(_)));
    }

    #[test]
    fn basic_needs_models() {
        let config = TaggerConfig {
            tagger_type: Some(TaggerType::Basic),
            ..Default::default()
        };
        assert!(matches!(
            Tagger::from_config(&config, &mut ModelStore::new()),
            Err(Error::Configuration(_))
        ));
    }
}
