//! Statistical sequence tagging: a log-linear classifier proposes candidate
//! labels per token, an n-gram model over labels rescores them for the whole
//! sentence, and a beta-best beam decides how many survive.

pub mod config;
pub mod corpus;
pub mod errors;
pub mod evaluation;
pub mod maxent;
pub mod ngram;
pub mod numeric;
pub mod tagger;
pub mod vocab;

pub use config::{ModelStore, TaggerConfig, TaggerType};
pub use errors::{Error, Result};
pub use evaluation::Evaluation;
pub use maxent::{Attribute, ClassifierModel, Distribution, Domain, FeatureContext};
pub use ngram::{NgramModel, PriorModel};
pub use tagger::{
    Candidate, SentenceTagger, SentenceTagging, SequenceScorer, TaggedToken, Tagger, Tagging, TaggingAlgorithm, Token,
};
pub use vocab::Vocabulary;
