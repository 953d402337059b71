use std::sync::Arc;

use super::data::TaggedToken;
use crate::{
    errors::Result,
    maxent::{Attribute, FeatureContext, PRESENT},
    ngram::PriorModel,
};

/// Produces one feature context per token of a sentence, index-aligned.
pub trait FeatureExtractor {
    fn contexts(&self, sentence: &[TaggedToken]) -> Result<Vec<FeatureContext>>;
}

/// Form used for window positions outside the sentence.
pub const OUT_OF_BOUNDS: &str = "<OOB>";

const WINDOW: [&str; 5] = ["X-2", "X-1", "X", "X+1", "X+2"];
const PRIOR_FEATURE: &str = "PPOS";
const PRIOR_BEAM: f64 = 0.1;
const NE_CONNECTOR: char = '_';

/// Word window features: forms within two tokens either side, form bigrams,
/// affixes, orthographic indicators and, with a prior model, real-valued
/// prior tag features.
#[derive(Debug, Clone, Default)]
pub struct WindowFeatureExtractor {
    prior: Option<Arc<PriorModel>>,
}

impl WindowFeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prior(prior: Arc<PriorModel>) -> Self {
        Self { prior: Some(prior) }
    }

    fn context(&self, sentence: &[TaggedToken], index: usize) -> FeatureContext {
        let window: Vec<&str> = (-2..=2).map(|offset| form_at(sentence, index, offset)).collect();
        let form = window[2];
        let mut context = FeatureContext::with_capacity(30);

        for (name, w) in WINDOW.iter().zip(&window) {
            context.push(Attribute::present(format!("{name}={w}")));
        }

        if let Some(prior) = &self.prior {
            let priors = prior.priors(form);
            let best = priors.first().map_or(0.0, |c| c.prob);
            for c in priors.iter().take_while(|c| c.prob > PRIOR_BEAM * best) {
                context.push(Attribute::new(format!("{PRIOR_FEATURE}={}", c.label), c.prob));
                context.push(Attribute::new(
                    format!("{PRIOR_FEATURE}_word={}_{form}", c.label),
                    c.prob,
                ));
            }
        }

        for j in 1..WINDOW.len() {
            context.push(Attribute::present(format!(
                "{}|{}={}|{}",
                WINDOW[j - 1],
                WINDOW[j],
                window[j - 1],
                window[j]
            )));
            // the bigram straddling the current word
            if j == 2 {
                context.push(Attribute::present(format!(
                    "{}|{}={}|{}",
                    WINDOW[1], WINDOW[3], window[1], window[3]
                )));
            }
        }

        let chars: Vec<char> = form.chars().collect();
        if chars.len() > 4 {
            for n in 1..=4 {
                let prefix: String = chars[..n].iter().collect();
                context.push(Attribute::present(format!("prefix={prefix}")));
            }
            for n in 1..=5 {
                let suffix: String = chars[chars.len() - n..].iter().collect();
                context.push(Attribute::present(format!("suffix={suffix}")));
            }
        }

        if form.contains('-') {
            context.push(Attribute::new("containsHyphen", PRESENT));
        }
        if form.chars().any(|c| c.is_ascii_digit()) {
            context.push(Attribute::new("containsNum", PRESENT));
        }
        if form.to_lowercase() != form {
            context.push(Attribute::new("containsUC", PRESENT));
        }
        if form.contains(NE_CONNECTOR) {
            context.push(Attribute::new("containsNEConnector", PRESENT));
        }
        context
    }
}

fn form_at(sentence: &[TaggedToken], index: usize, offset: isize) -> &str {
    index
        .checked_add_signed(offset)
        .and_then(|i| sentence.get(i))
        .map_or(OUT_OF_BOUNDS, |t| t.form())
}

impl FeatureExtractor for WindowFeatureExtractor {
    fn contexts(&self, sentence: &[TaggedToken]) -> Result<Vec<FeatureContext>> {
        Ok((0..sentence.len()).map(|i| self.context(sentence, i)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ngram::NgramModel,
        tagger::data::{Tagging, Token},
    };

    fn sentence(forms: &[&str]) -> Vec<TaggedToken> {
        forms
            .iter()
            .map(|f| TaggedToken::new(Token::new(*f), Tagging::new()))
            .collect()
    }

    fn names(context: &FeatureContext) -> Vec<&str> {
        context.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn window_and_bigrams() {
        let fex = WindowFeatureExtractor::new();
        let contexts = fex.contexts(&sentence(&["the", "dog", "ran"])).unwrap();
        assert_eq!(contexts.len(), 3);
        let first = names(&contexts[0]);
        assert!(first.contains(&"X=the"));
        assert!(first.contains(&"X-1=<OOB>"));
        assert!(first.contains(&"X+2=ran"));
        assert!(first.contains(&"X-1|X+1=<OOB>|dog"));
        let mid = names(&contexts[1]);
        assert!(mid.contains(&"X-1|X=the|dog"));
        assert!(mid.contains(&"X+1|X+2=ran|<OOB>"));
        assert!(contexts[1].iter().all(|a| a.value == PRESENT));
    }

    #[test]
    fn affixes_and_indicators() {
        let fex = WindowFeatureExtractor::new();
        let contexts = fex.contexts(&sentence(&["New_York-2", "cat"])).unwrap();
        let long = names(&contexts[0]);
        for f in ["prefix=N", "prefix=New_", "suffix=2", "suffix=rk-2", "suffix=ork-2"] {
            assert!(long.contains(&f), "missing {f}");
        }
        for f in ["containsHyphen", "containsNum", "containsUC", "containsNEConnector"] {
            assert!(long.contains(&f), "missing {f}");
        }
        let short = names(&contexts[1]);
        assert!(!short.iter().any(|f| f.starts_with("prefix=") || f.starts_with("contains")));
    }

    #[test]
    fn prior_features() {
        let lm = NgramModel::from_reader(
            "\\data\\\nngram 1=3\n\n\\1-grams:\n-0.3\tW-run:P-VB\n-0.6\tW-run:P-NN\n-2.0\tW-run:P-DT\n\\end\\\n".as_bytes(),
            None,
        )
        .unwrap();
        let fex = WindowFeatureExtractor::with_prior(Arc::new(PriorModel::from_model(lm)));
        let contexts = fex.contexts(&sentence(&["run"])).unwrap();
        let priors: Vec<&Attribute> = contexts[0]
            .iter()
            .filter(|a| a.name.starts_with("PPOS"))
            .collect();
        // DT is below a tenth of the best prior
        assert_eq!(priors.len(), 4);
        assert_eq!(priors[0].name, "PPOS=VB");
        assert_eq!(priors[1].name, "PPOS_word=VB_run");
        assert_eq!(priors[2].name, "PPOS=NN");
        assert!(priors[0].value > priors[2].value && priors[0].value < 1.0);
    }
}
