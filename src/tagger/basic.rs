use std::{fmt, sync::Arc};

use super::{
    candidates::{apply_beta, build_candidates},
    data::{Candidate, SentenceTagging, TaggedToken, Tagging, Token},
    features::FeatureExtractor,
    sequence::SequenceScorer,
    SentenceTagger, DEFAULT_OOV_LABEL,
};
use crate::{
    errors::{Error, Result},
    maxent::{ClassifierModel, Domain},
};

/// The candidate beam before rescoring is this many times wider than `beta`.
pub const WIDENING: f64 = 8.0;

/// Classifier plus sequence rescoring plus a final beta-best beam.
pub struct StatisticalTagger {
    model: Arc<ClassifierModel>,
    scorer: SequenceScorer,
    extractor: Box<dyn FeatureExtractor + Send + Sync>,
    beta: f64,
    include_gold: bool,
    oov_label: String,
}

impl fmt::Debug for StatisticalTagger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatisticalTagger")
            .field("outcomes", &self.model.num_outcomes())
            .field("algorithm", &self.scorer.algorithm())
            .field("search_beam", &self.scorer.search_beam())
            .field("beta", &self.beta)
            .field("include_gold", &self.include_gold)
            .finish()
    }
}

impl StatisticalTagger {
    pub fn new(
        model: Arc<ClassifierModel>,
        scorer: SequenceScorer,
        extractor: Box<dyn FeatureExtractor + Send + Sync>,
    ) -> Self {
        Self {
            model,
            scorer,
            extractor,
            beta: 1.0,
            include_gold: false,
            oov_label: DEFAULT_OOV_LABEL.to_string(),
        }
    }

    /// Final beam width in (0, 1]; 1.0 keeps only the best label.
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Keep each token's own label among its pre-rescoring candidates.
    pub fn with_include_gold(mut self, include_gold: bool) -> Self {
        self.include_gold = include_gold;
        self
    }

    pub fn with_oov_label<S: Into<String>>(mut self, oov_label: S) -> Self {
        self.oov_label = oov_label.into();
        self
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn include_gold(&self) -> bool {
        self.include_gold
    }

    pub fn scorer(&self) -> &SequenceScorer {
        &self.scorer
    }

    pub fn model(&self) -> &ClassifierModel {
        &self.model
    }

    /// Per-token candidate lists from the classifier alone, before rescoring.
    pub fn candidates(&self, sentence: &[Token]) -> Result<SentenceTagging> {
        let tagged = TaggedToken::untagged(sentence);
        let contexts = self.extractor.contexts(&tagged)?;
        if contexts.len() != sentence.len() {
            return Err(Error::ContextMismatch {
                expected: sentence.len(),
                found: contexts.len(),
            });
        }

        let ratio = self.beta / WIDENING;
        sentence
            .iter()
            .zip(&contexts)
            .map(|(token, context)| {
                let dist = self.model.evaluate(context, Domain::Probability)?;
                let gold = if self.include_gold {
                    token.label.as_deref()
                } else {
                    None
                };
                Ok(build_candidates(&dist, ratio, gold))
            })
            .collect()
    }

    fn fill_empty(&self, index: usize, tagging: &mut Tagging) {
        if tagging.is_empty() {
            log::warn!("{}, using '{}'", Error::EmptyCandidate { token: index }, self.oov_label);
            tagging.push(Candidate::new(1.0, self.oov_label.as_str()));
        }
    }
}

impl SentenceTagger for StatisticalTagger {
    fn tag_sentence(&self, sentence: &[Token]) -> Result<SentenceTagging> {
        let candidates = self.candidates(sentence)?;
        let mut tagging = self.scorer.rescore(&candidates);
        for (i, t) in tagging.iter_mut().enumerate() {
            apply_beta(t, self.beta);
            self.fill_empty(i, t);
        }
        log::debug!(
            "tagged {} tokens, {} candidates kept",
            tagging.len(),
            tagging.iter().map(Vec::len).sum::<usize>()
        );
        Ok(tagging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        maxent::{Attribute, FeatureContext},
        ngram::NgramModel,
    };

    const MODEL: &str = "\
3
w=the
w=dog
w=barks
3
DT
NN
VB
1 0
2 1 2
1 2
4
3.0
2.0
1.5
3.0
";

    const LM: &str = "\
\\data\\
ngram 1=5
ngram 2=4

\\1-grams:
-99\t<s>\t-0.5
-0.5\t</s>\t0
-0.6\tDT\t-0.3
-0.5\tNN\t-0.2
-0.6\tVB\t-0.2

\\2-grams:
-0.1\t<s> DT
-0.1\tDT NN
-0.2\tNN VB
-0.1\tVB </s>

\\end\\
";

    /// One `w=<form>` feature per token.
    struct FormFeatures;

    impl FeatureExtractor for FormFeatures {
        fn contexts(&self, sentence: &[TaggedToken]) -> Result<Vec<FeatureContext>> {
            Ok(sentence
                .iter()
                .map(|t| vec![Attribute::present(format!("w={}", t.form()))])
                .collect())
        }
    }

    struct Broken;

    impl FeatureExtractor for Broken {
        fn contexts(&self, _: &[TaggedToken]) -> Result<Vec<FeatureContext>> {
            Ok(Vec::new())
        }
    }

    fn tagger(extractor: Box<dyn FeatureExtractor + Send + Sync>) -> StatisticalTagger {
        let model = ClassifierModel::from_reader(MODEL.as_bytes()).unwrap();
        let lm = NgramModel::from_reader(LM.as_bytes(), None).unwrap();
        StatisticalTagger::new(Arc::new(model), SequenceScorer::new(Arc::new(lm)), extractor)
    }

    fn sentence(forms: &[&str]) -> Vec<Token> {
        forms.iter().map(|f| Token::new(*f)).collect()
    }

    #[test]
    fn single_best() {
        let t = tagger(Box::new(FormFeatures));
        let tagging = t.tag_sentence(&sentence(&["the", "dog", "barks"])).unwrap();
        let labels: Vec<&str> = tagging.iter().map(|c| c[0].label.as_str()).collect();
        assert_eq!(labels, ["DT", "NN", "VB"]);
        assert!(tagging.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn wider_beta_keeps_more() {
        let t = tagger(Box::new(FormFeatures)).with_beta(0.01);
        let tagging = t.tag_sentence(&sentence(&["dog"])).unwrap();
        assert!(tagging[0].len() > 1);
        assert!(tagging[0].windows(2).all(|w| w[0].prob >= w[1].prob));
        let total: f64 = tagging[0].iter().map(|c| c.prob).sum();
        assert!(total <= 1.0 + 1e-9);
    }

    #[test]
    fn gold_is_kept_before_rescoring() {
        let t = tagger(Box::new(FormFeatures)).with_include_gold(true);
        let candidates = t.candidates(&[Token::labelled("the", "VB")]).unwrap();
        assert!(candidates[0].iter().any(|c| c.label == "VB"));

        let t = tagger(Box::new(FormFeatures));
        let candidates = t.candidates(&[Token::labelled("the", "VB")]).unwrap();
        assert!(!candidates[0].iter().any(|c| c.label == "VB"));
    }

    #[test]
    fn context_count_must_match() {
        let t = tagger(Box::new(Broken));
        assert!(matches!(
            t.tag_sentence(&sentence(&["the"])),
            Err(Error::ContextMismatch { expected: 1, found: 0 })
        ));
    }

    #[test]
    fn empty_list_becomes_sentinel() {
        let t = tagger(Box::new(FormFeatures)).with_oov_label("OOV");
        let mut tagging = Tagging::new();
        t.fill_empty(3, &mut tagging);
        assert_eq!(tagging, vec![Candidate::new(1.0, "OOV")]);
        assert!(t.tag_sentence(&[]).unwrap().is_empty());
    }

    #[test]
    fn model_without_outcomes() {
        let model = ClassifierModel::from_reader("1\nw=the\n0\n0\n0\n".as_bytes()).unwrap();
        let lm = NgramModel::from_reader(LM.as_bytes(), None).unwrap();
        let t = StatisticalTagger::new(Arc::new(model), SequenceScorer::new(Arc::new(lm)), Box::new(FormFeatures))
            .with_beta(0.1);
        let tagging = t.tag_sentence(&sentence(&["the", "dog"])).unwrap();
        assert_eq!(
            tagging,
            vec![vec![Candidate::new(1.0, DEFAULT_OOV_LABEL)], vec![Candidate::new(1.0, DEFAULT_OOV_LABEL)]]
        );
    }
}
