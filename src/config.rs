use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::{
    errors::{Error, Result},
    maxent::ClassifierModel,
    ngram::{NgramModel, PriorModel},
    tagger::{sequence::DEFAULT_SEARCH_BEAM, TaggingAlgorithm, DEFAULT_OOV_LABEL},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaggerType {
    /// Pass the input labels through.
    Dummy,
    /// Classifier, sequence rescoring and beta-best filtering.
    Basic,
}

impl FromStr for TaggerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dummy" => Ok(TaggerType::Dummy),
            "basic" => Ok(TaggerType::Basic),
            other => Err(Error::configuration(format!("unknown tagger type '{other}'"))),
        }
    }
}

impl<'de> Deserialize<'de> for TaggerType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

impl fmt::Display for TaggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaggerType::Dummy => write!(f, "dummy"),
            TaggerType::Basic => write!(f, "basic"),
        }
    }
}

/// Options for assembling a [`Tagger`](crate::tagger::Tagger).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaggerConfig {
    pub tagger_type: Option<TaggerType>,
    pub maxent_model: Option<PathBuf>,
    pub sequence_model: Option<PathBuf>,
    pub prior_model: Option<PathBuf>,
    pub prior_model_vocab: Option<PathBuf>,
    pub beta: f64,
    pub tagging_algorithm: TaggingAlgorithm,
    pub include_gold: bool,
    pub search_beam: usize,
    pub oov_label: String,
    /// Keys this crate does not know about.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            tagger_type: None,
            maxent_model: None,
            sequence_model: None,
            prior_model: None,
            prior_model_vocab: None,
            beta: 1.0,
            tagging_algorithm: TaggingAlgorithm::default(),
            include_gold: false,
            search_beam: DEFAULT_SEARCH_BEAM,
            oov_label: DEFAULT_OOV_LABEL.to_string(),
            extra: HashMap::new(),
        }
    }
}

impl TaggerConfig {
    /// Reads a `.json` config or else a key=value config, resolves model
    /// paths against the config file's directory and validates the result.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::configuration(format!("cannot open config file {}: {e}", path.display())))?;
        let reader = BufReader::new(file);
        let mut config = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json(reader)?,
            _ => Self::from_key_values(reader)?,
        };
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base)?;
        config.validate()?;
        log::info!("configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Option names are exact (camelCase); tagger type and algorithm names
    /// are case-insensitive, as in key=value files.
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        let config: Self = serde_json::from_reader(reader)
            .map_err(|e| Error::configuration(format!("invalid JSON configuration: {e}")))?;
        for key in config.extra.keys() {
            log::warn!("ignoring unknown configuration key '{key}'");
        }
        Ok(config)
    }

    /// Parses `key = value` lines. Keys are case-insensitive, `#` starts a
    /// comment line, and a repeated key's last value wins.
    pub fn from_key_values<R: BufRead>(reader: R) -> Result<Self> {
        let mut opts: Vec<(String, String)> = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::configuration(format!(
                    "line {}: expected key=value, found '{line}'",
                    i + 1
                )));
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            match opts.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => opts.push((key, value)),
            }
        }

        let mut config = Self::default();
        for (key, value) in opts {
            match key.as_str() {
                "taggertype" => config.tagger_type = Some(value.parse()?),
                "maxentmodel" => config.maxent_model = Some(value.into()),
                "sequencemodel" => config.sequence_model = Some(value.into()),
                "priormodel" => config.prior_model = Some(value.into()),
                "priormodelvocab" => config.prior_model_vocab = Some(value.into()),
                "beta" => config.beta = parse_number(&key, &value)?,
                "taggingalgorithm" => config.tagging_algorithm = value.parse()?,
                "includegold" => config.include_gold = !value.eq_ignore_ascii_case("false"),
                "searchbeam" => config.search_beam = parse_number(&key, &value)?,
                "oovlabel" => config.oov_label = value,
                _ => {
                    log::warn!("ignoring unknown configuration key '{key}'");
                    config.extra.insert(key, serde_json::Value::String(value));
                }
            }
        }
        Ok(config)
    }

    /// Makes every model path point at an existing file, trying `base` first
    /// and then the path as given.
    pub fn resolve_paths(&mut self, base: &Path) -> Result<()> {
        for (key, path) in [
            ("maxentModel", &mut self.maxent_model),
            ("sequenceModel", &mut self.sequence_model),
            ("priorModel", &mut self.prior_model),
            ("priorModelVocab", &mut self.prior_model_vocab),
        ] {
            if let Some(p) = path {
                *p = resolve(key, base, p)?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.beta > 0.0 && self.beta <= 1.0) {
            return Err(Error::configuration(format!("beta must be in (0, 1], got {}", self.beta)));
        }
        if self.search_beam < 1 {
            return Err(Error::configuration("searchBeam must be at least 1"));
        }
        match self.tagger_type {
            None => Err(Error::configuration("missing taggerType")),
            Some(TaggerType::Dummy) => Ok(()),
            Some(TaggerType::Basic) => {
                if self.maxent_model.is_none() {
                    return Err(Error::configuration("a basic tagger needs maxentModel"));
                }
                if self.sequence_model.is_none() {
                    return Err(Error::configuration("a basic tagger needs sequenceModel"));
                }
                Ok(())
            }
        }
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::configuration(format!("{key}: '{value}' is not a number")))
}

fn resolve(key: &str, base: &Path, path: &Path) -> Result<PathBuf> {
    let relative = base.join(path);
    if relative.exists() {
        Ok(relative)
    } else if path.exists() {
        Ok(path.to_path_buf())
    } else {
        Err(Error::configuration(format!("{key}: cannot find {}", path.display())))
    }
}

/// Models loaded so far, by path. Asking twice for the same file returns the
/// same shared model.
#[derive(Debug, Default)]
pub struct ModelStore {
    classifiers: HashMap<PathBuf, Arc<ClassifierModel>>,
    sequence_models: HashMap<PathBuf, Arc<NgramModel>>,
    priors: HashMap<(PathBuf, Option<PathBuf>), Arc<PriorModel>>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classifier(&mut self, path: &Path) -> Result<Arc<ClassifierModel>> {
        cached(&mut self.classifiers, path.to_path_buf(), || ClassifierModel::from_path(path))
    }

    pub fn sequence_model(&mut self, path: &Path) -> Result<Arc<NgramModel>> {
        cached(&mut self.sequence_models, path.to_path_buf(), || {
            NgramModel::from_path(path, None)
        })
    }

    pub fn prior(&mut self, path: &Path, vocab: Option<&Path>) -> Result<Arc<PriorModel>> {
        let key = (path.to_path_buf(), vocab.map(Path::to_path_buf));
        cached(&mut self.priors, key, || PriorModel::from_paths(path, vocab))
    }

    /// Number of distinct models held.
    pub fn len(&self) -> usize {
        self.classifiers.len() + self.sequence_models.len() + self.priors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cached<K, T, F>(cache: &mut HashMap<K, Arc<T>>, key: K, load: F) -> Result<Arc<T>>
where
    K: std::hash::Hash + Eq + fmt::Debug,
    F: FnOnce() -> Result<T>,
{
    if let Some(model) = cache.get(&key) {
        log::debug!("reusing loaded model {key:?}");
        return Ok(Arc::clone(model));
    }
    let model = Arc::new(load()?);
    cache.insert(key, Arc::clone(&model));
    Ok(model)
}
