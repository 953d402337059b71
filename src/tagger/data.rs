use serde::{Deserialize, Serialize};

/// A label with its probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub prob: f64,
    pub label: String,
}

impl Candidate {
    pub fn new<S: Into<String>>(prob: f64, label: S) -> Self {
        Self {
            prob,
            label: label.into(),
        }
    }
}

/// Candidates for one token, sorted by descending probability.
pub type Tagging = Vec<Candidate>;

/// One [`Tagging`] per input token, in token order.
pub type SentenceTagging = Vec<Tagging>;

/// Stable descending sort by probability: equal probabilities keep their
/// input order.
pub fn sort_descending(tagging: &mut [Candidate]) {
    tagging.sort_by(|a, b| b.prob.total_cmp(&a.prob));
}

/// An input token: its surface form and, if known, its label (gold or
/// assigned upstream).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Token {
    pub form: String,
    pub label: Option<String>,
    /// Part of speech, kept when the label is some other factor (supertags).
    pub pos: Option<String>,
}

impl Token {
    pub fn new<S: Into<String>>(form: S) -> Self {
        Self {
            form: form.into(),
            label: None,
            pos: None,
        }
    }

    pub fn labelled<S: Into<String>, L: Into<String>>(form: S, label: L) -> Self {
        Self {
            form: form.into(),
            label: Some(label.into()),
            pos: None,
        }
    }

    pub fn with_pos<S: Into<String>>(mut self, pos: S) -> Self {
        self.pos = Some(pos.into());
        self
    }

    /// The part of speech: `pos` when set, otherwise the label.
    pub fn pos(&self) -> Option<&str> {
        self.pos.as_deref().or(self.label.as_deref())
    }
}

/// A token together with its (multi)tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedToken {
    pub token: Token,
    pub tagging: Tagging,
}

impl TaggedToken {
    pub fn new(token: Token, tagging: Tagging) -> Self {
        Self { token, tagging }
    }

    /// Wraps tokens that have not been tagged yet.
    pub fn untagged(tokens: &[Token]) -> Vec<TaggedToken> {
        tokens
            .iter()
            .map(|t| TaggedToken::new(t.clone(), Tagging::new()))
            .collect()
    }

    /// Pairs tokens with the tagging of their sentence.
    pub fn zip(tokens: &[Token], tagging: SentenceTagging) -> Vec<TaggedToken> {
        tokens
            .iter()
            .cloned()
            .zip(tagging)
            .map(|(token, tagging)| TaggedToken::new(token, tagging))
            .collect()
    }

    pub fn form(&self) -> &str {
        &self.token.form
    }

    pub fn gold(&self) -> Option<&str> {
        self.token.label.as_deref()
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.tagging.first()
    }

    /// The working label: the best candidate, or the token's own label while
    /// it has no tagging.
    pub fn label(&self) -> Option<&str> {
        self.best().map(|c| c.label.as_str()).or_else(|| self.gold())
    }
}
