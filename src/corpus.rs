use std::io::{BufRead, Lines, Write};

use serde::Serialize;

use crate::{
    errors::Result,
    ngram::{SENT_END, SENT_START},
    tagger::{Candidate, Tagging, Token},
};

/// Factor holding part-of-speech tags.
pub const POS_FACTOR: &str = "P";
/// Factor holding supertags.
pub const SUPERTAG_FACTOR: &str = "S";

const WORD_FACTOR: &str = "W";

/// Splits a `form[:F-value]*` bundle. The value of `label_factor`, if present,
/// becomes the token's label. When the label is not the POS factor, the POS
/// factor is kept as well.
pub fn parse_token(bundle: &str, label_factor: &str) -> Token {
    let mut factors = bundle.split(':');
    let first = factors.next().unwrap_or_default();
    let form = first
        .strip_prefix(WORD_FACTOR)
        .and_then(|f| f.strip_prefix('-'))
        .unwrap_or(first);

    let mut token = Token::new(form);
    for (name, value) in factors.filter_map(|f| f.split_once('-')) {
        if name == label_factor {
            token.label.get_or_insert_with(|| value.to_string());
        } else if name == POS_FACTOR {
            token.pos.get_or_insert_with(|| value.to_string());
        }
    }
    token
}

/// Tokens of one corpus line, without the optional `<s>`/`</s>` brackets.
pub fn parse_sentence(line: &str, label_factor: &str) -> Vec<Token> {
    let mut bundles: Vec<&str> = line.split_whitespace().collect();
    if bundles.first() == Some(&SENT_START) {
        bundles.remove(0);
    }
    if bundles.last() == Some(&SENT_END) {
        bundles.pop();
    }
    bundles
        .into_iter()
        .filter_map(|b| {
            let token = parse_token(b, label_factor);
            if token.form.is_empty() {
                log::warn!("skipping bundle '{b}' with an empty word form");
                None
            } else {
                Some(token)
            }
        })
        .collect()
}

/// One sentence per line; blank lines are skipped.
pub struct CorpusReader<R> {
    lines: Lines<R>,
    label_factor: String,
}

impl<R: BufRead> CorpusReader<R> {
    pub fn new<S: Into<String>>(reader: R, label_factor: S) -> Self {
        Self {
            lines: reader.lines(),
            label_factor: label_factor.into(),
        }
    }
}

impl<R: BufRead> Iterator for CorpusReader<R> {
    type Item = Result<Vec<Token>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(Ok(parse_sentence(&line, &self.label_factor)));
        }
    }
}

/// Writes `<s>`, one `form label prob ..` line per token, then `</s>`.
pub fn write_sentence<W: Write>(out: &mut W, tokens: &[Token], tagging: &[Tagging]) -> Result<()> {
    writeln!(out, "{SENT_START}")?;
    for (token, candidates) in tokens.iter().zip(tagging) {
        write!(out, "{}", token.form)?;
        for c in candidates {
            write!(out, " {} {}", c.label, c.prob)?;
        }
        writeln!(out)?;
    }
    writeln!(out, "{SENT_END}")?;
    Ok(())
}

#[derive(Serialize)]
struct TokenRecord<'a> {
    form: &'a str,
    candidates: &'a [Candidate],
}

/// Writes the sentence as a single JSON array line.
pub fn write_sentence_json<W: Write>(out: &mut W, tokens: &[Token], tagging: &[Tagging]) -> Result<()> {
    let records: Vec<TokenRecord<'_>> = tokens
        .iter()
        .zip(tagging)
        .map(|(token, candidates)| TokenRecord {
            form: &token.form,
            candidates,
        })
        .collect();
    serde_json::to_writer(&mut *out, &records)?;
    writeln!(out)?;
    Ok(())
}
