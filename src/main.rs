use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use seqtag::{
    corpus::{self, CorpusReader, POS_FACTOR},
    Error, Evaluation, ModelStore, Tagger, TaggerConfig, Token,
};

/// Sentences handed to the workers at a time.
const BATCH_SIZE: usize = 256;

/// Tag a corpus with one sentence per line (`<s> form:P-tag ... </s>`) and
/// write the surviving candidates of every token.
#[derive(Debug, Parser)]
#[command(name = "seqtag", version)]
struct Argv {
    /// tagger configuration (key=value or .json)
    #[arg(short, long, value_name = "CONFIG")]
    config: PathBuf,
    /// input corpus, stdin when omitted
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,
    /// output file, stdout when omitted
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// treat the input labels as gold and report accuracy on stderr
    #[arg(short, long)]
    evaluate: bool,
    /// write one JSON array per sentence instead of the plain format
    #[arg(long)]
    json: bool,
    /// factor of each bundle that holds the label (P for POS, S for supertags)
    #[arg(long, default_value = POS_FACTOR)]
    label_factor: String,
    /// worker threads
    #[arg(short = 'j', long, default_value_t = 1)]
    threads: usize,
}

fn main() -> ExitCode {
    env_logger::init();
    let argv = Argv::parse();
    log::debug!("{argv:?}");
    match run(&argv) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            eprintln!("{failed} sentence(s) could not be tagged");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns the number of sentences that failed.
fn run(argv: &Argv) -> seqtag::Result<usize> {
    let input: Box<dyn BufRead> = match &argv.input {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| io::Error::new(e.kind(), format!("input corpus {}: {e}", path.display())))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut output: Box<dyn Write> = match &argv.output {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| io::Error::new(e.kind(), format!("output file {}: {e}", path.display())))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let config = TaggerConfig::from_path(&argv.config)?;
    let mut store = ModelStore::new();
    let tagger = Tagger::from_config(&config, &mut store)?;

    let mut evaluation = Evaluation::new();
    let mut failed = 0;
    let mut done = 0;
    let mut batch: Vec<Vec<Token>> = Vec::with_capacity(BATCH_SIZE);
    let mut sentences = CorpusReader::new(input, argv.label_factor.as_str()).peekable();
    while sentences.peek().is_some() {
        batch.clear();
        for sentence in sentences.by_ref().take(BATCH_SIZE) {
            batch.push(sentence?);
        }
        for (i, result) in tagger.tag_batch(&batch, argv.threads)?.into_iter().enumerate() {
            let tokens = &batch[i];
            let tagging = match result {
                Ok(tagging) => tagging,
                Err(Error::Sentence { source, .. }) => {
                    eprintln!("sentence #{}: {source}", done + i);
                    failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if argv.evaluate {
                evaluation.accumulate(&tagging, tokens);
            }
            if argv.json {
                corpus::write_sentence_json(&mut output, tokens, &tagging)?;
            } else {
                corpus::write_sentence(&mut output, tokens, &tagging)?;
            }
        }
        done += batch.len();
    }
    output.flush()?;
    log::info!("tagged {done} sentences ({failed} failed)");

    if argv.evaluate {
        eprint!("{evaluation}");
    }
    Ok(failed)
}
