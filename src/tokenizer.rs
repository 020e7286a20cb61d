//! Morphological analysis behind a swappable [`Tokenizer`] trait.
//!
//! The index and every text-matching query go through a [`TextAnalyzer`],
//! which is built once at startup from a tokenizer provider and passed to
//! the components that need it.
//!
//! # Providers
//!
//! - **[`MecabTokenizer`]**: runs the MeCab executable and parses its
//!   IPADIC-style output. Default.
//! - **[`RemoteTokenizer`]**: posts text to an HTTP analysis service.
//! - **[`SimpleTokenizer`]**: splits on non-alphanumeric characters and tags
//!   every token as a noun. Useful for ledgers written in space-delimited
//!   languages and for tests.
//!
//! Use [`create_tokenizer`] to pick a provider from configuration.
//!
//! # Availability
//!
//! A provider that cannot run returns a [`TokenizerError`], never an empty
//! token list. Callers surface that as "service unavailable".

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::TokenizerConfig;

/// Part-of-speech class of a morpheme, reduced to what indexing needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Other,
}

impl PartOfSpeech {
    /// Maps an analyzer tag (IPADIC `名詞`, or an English name) to a class.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "名詞" | "noun" | "NOUN" => PartOfSpeech::Noun,
            "動詞" | "verb" | "VERB" => PartOfSpeech::Verb,
            "形容詞" | "adjective" | "ADJ" => PartOfSpeech::Adjective,
            _ => PartOfSpeech::Other,
        }
    }

    /// Parses a class name as written in `tokenizer.index_pos`.
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "noun" => Some(PartOfSpeech::Noun),
            "verb" => Some(PartOfSpeech::Verb),
            "adjective" => Some(PartOfSpeech::Adjective),
            _ => None,
        }
    }
}

/// One analyzed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Morpheme {
    pub surface: String,
    pub pos: PartOfSpeech,
}

impl Morpheme {
    pub fn new(surface: impl Into<String>, pos: PartOfSpeech) -> Self {
        Self {
            surface: surface.into(),
            pos,
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenizerError {
    /// The analyzer could not be started or reached.
    #[error("tokenizer unavailable: {0}")]
    Unavailable(String),

    #[error("tokenizer timed out after {0}s")]
    Timeout(u64),

    /// The analyzer answered with something we could not interpret.
    #[error("tokenizer protocol error: {0}")]
    Protocol(String),
}

/// A morphological analyzer.
#[async_trait]
pub trait Tokenizer: Send + Sync {
    /// Provider name, reported by the health endpoint.
    fn name(&self) -> &str;

    /// Splits `text` into morphemes in document order.
    async fn analyze(&self, text: &str) -> Result<Vec<Morpheme>, TokenizerError>;
}

/// Index/keyword operations over an injected [`Tokenizer`].
pub struct TextAnalyzer {
    tokenizer: Arc<dyn Tokenizer>,
    index_pos: HashSet<PartOfSpeech>,
}

impl TextAnalyzer {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        index_pos: impl IntoIterator<Item = PartOfSpeech>,
    ) -> Self {
        Self {
            tokenizer,
            index_pos: index_pos.into_iter().collect(),
        }
    }

    /// Builds the analyzer described by `config`.
    pub fn from_config(config: &TokenizerConfig) -> anyhow::Result<Self> {
        let tokenizer = create_tokenizer(config)?;
        Ok(Self::new(tokenizer, config.index_pos_set()?))
    }

    pub fn tokenizer_name(&self) -> &str {
        self.tokenizer.name()
    }

    /// Space-joined surfaces of the tokens whose part of speech is in the
    /// index set. This is both the stored `content` and a valid query string.
    pub async fn tokenize_for_index(&self, text: &str) -> Result<String, TokenizerError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let morphemes = self.tokenizer.analyze(text).await?;
        let tokens: Vec<&str> = morphemes
            .iter()
            .filter(|m| self.index_pos.contains(&m.pos))
            .map(|m| m.surface.trim())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(tokens.join(" "))
    }

    /// Distinct nouns of at least two characters, in first-occurrence order.
    pub async fn extract_keywords(&self, text: &str) -> Result<Vec<String>, TokenizerError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let morphemes = self.tokenizer.analyze(text).await?;
        let mut seen = HashSet::new();
        let mut keywords = Vec::new();
        for m in morphemes {
            if m.pos != PartOfSpeech::Noun {
                continue;
            }
            let surface = m.surface.trim();
            // single-character nouns are mostly misclassified particles
            if surface.chars().count() < 2 {
                continue;
            }
            if seen.insert(surface.to_string()) {
                keywords.push(surface.to_string());
            }
        }
        Ok(keywords)
    }

    /// Runs a tiny analysis to find out whether the backend answers.
    pub async fn probe(&self) -> Result<(), TokenizerError> {
        self.tokenizer.analyze("検索テスト").await.map(|_| ())
    }
}

/// Creates the tokenizer named by `config.provider`.
pub fn create_tokenizer(config: &TokenizerConfig) -> anyhow::Result<Arc<dyn Tokenizer>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.provider.as_str() {
        "mecab" => Ok(Arc::new(MecabTokenizer::new(
            config.binary.clone(),
            config.args.clone(),
            timeout,
        ))),
        "remote" => {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or_else(|| anyhow::anyhow!("tokenizer.endpoint is required for 'remote'"))?;
            Ok(Arc::new(RemoteTokenizer::new(endpoint, timeout)?))
        }
        "simple" => Ok(Arc::new(SimpleTokenizer)),
        other => anyhow::bail!("Unknown tokenizer provider: {}", other),
    }
}

// ============ MeCab ============

/// MeCab's default `--input-buffer-size`; longer lines get split mid-character.
const MECAB_INPUT_BUFFER: usize = 8192;

/// Runs MeCab as a child process per analysis.
///
/// Input lines are kept; each becomes its own `EOS`-terminated block in the
/// output. Stdin is written while stdout is drained, so output size never
/// stalls the child. The child is killed if it outlives the timeout.
pub struct MecabTokenizer {
    binary: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl MecabTokenizer {
    pub fn new(binary: PathBuf, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            binary,
            args,
            timeout,
        }
    }
}

/// `--input-buffer-size` large enough for the longest line of `input`,
/// unless the configured args already set one or the default suffices.
fn input_buffer_arg(args: &[String], input: &str) -> Option<String> {
    if args
        .iter()
        .any(|a| a == "-b" || a.starts_with("--input-buffer-size"))
    {
        return None;
    }
    let longest = input.lines().map(str::len).max().unwrap_or(0);
    if longest + 1 < MECAB_INPUT_BUFFER {
        return None;
    }
    Some(format!(
        "--input-buffer-size={}",
        (longest + 1).next_power_of_two()
    ))
}

#[async_trait]
impl Tokenizer for MecabTokenizer {
    fn name(&self) -> &str {
        "mecab"
    }

    async fn analyze(&self, text: &str) -> Result<Vec<Morpheme>, TokenizerError> {
        let mut input = text.replace("\r\n", "\n").replace('\r', "\n");
        input.push('\n');

        let mut command = Command::new(&self.binary);
        command.args(&self.args);
        if let Some(arg) = input_buffer_arg(&self.args, &input) {
            command.arg(arg);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TokenizerError::Unavailable(format!(
                    "failed to start {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TokenizerError::Unavailable("mecab stdin not captured".to_string()))?;

        let write = async move {
            let written = stdin.write_all(input.as_bytes()).await;
            drop(stdin);
            written
        };
        let run = async move { tokio::join!(write, child.wait_with_output()) };

        let (written, output) = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| TokenizerError::Timeout(self.timeout.as_secs()))?;
        let output =
            output.map_err(|e| TokenizerError::Unavailable(format!("mecab i/o: {}", e)))?;

        if !output.status.success() {
            return Err(TokenizerError::Unavailable(format!(
                "mecab exited with {}",
                output.status
            )));
        }
        written.map_err(|e| TokenizerError::Unavailable(format!("mecab stdin: {}", e)))?;

        Ok(parse_mecab_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parses MeCab's default output: `surface\tPOS,sub1,...` lines, `EOS`
/// terminating each sentence.
pub fn parse_mecab_output(output: &str) -> Vec<Morpheme> {
    output
        .lines()
        .filter(|line| !line.is_empty() && *line != "EOS")
        .filter_map(|line| {
            let (surface, features) = line.split_once('\t')?;
            let tag = features.split(',').next().unwrap_or("");
            Some(Morpheme::new(surface, PartOfSpeech::from_tag(tag)))
        })
        .collect()
}

// ============ Remote ============

#[derive(Deserialize)]
struct RemoteResponse {
    tokens: Vec<RemoteToken>,
}

#[derive(Deserialize)]
struct RemoteToken {
    surface: String,
    pos: String,
}

/// Calls an HTTP analysis service.
///
/// Request: `POST {endpoint}` with `{"text": "..."}`.
/// Response: `{"tokens": [{"surface": "...", "pos": "名詞"}, ...]}`.
pub struct RemoteTokenizer {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl RemoteTokenizer {
    pub fn new(endpoint: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }
}

#[async_trait]
impl Tokenizer for RemoteTokenizer {
    fn name(&self) -> &str {
        "remote"
    }

    async fn analyze(&self, text: &str) -> Result<Vec<Morpheme>, TokenizerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TokenizerError::Timeout(self.timeout.as_secs())
                } else {
                    TokenizerError::Unavailable(format!("{}: {}", self.endpoint, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenizerError::Unavailable(format!(
                "{} returned {}",
                self.endpoint, status
            )));
        }

        let body: RemoteResponse = response
            .json()
            .await
            .map_err(|e| TokenizerError::Protocol(e.to_string()))?;

        Ok(body
            .tokens
            .into_iter()
            .map(|t| Morpheme::new(t.surface, PartOfSpeech::from_tag(&t.pos)))
            .collect())
    }
}

// ============ Simple ============

/// Splits on anything that is not alphanumeric; every token is a noun.
pub struct SimpleTokenizer;

#[async_trait]
impl Tokenizer for SimpleTokenizer {
    fn name(&self) -> &str {
        "simple"
    }

    async fn analyze(&self, text: &str) -> Result<Vec<Morpheme>, TokenizerError> {
        Ok(text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| !s.is_empty())
            .map(|s| Morpheme::new(s, PartOfSpeech::Noun))
            .collect())
    }
}
