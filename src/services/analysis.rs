//! Toxicity analysis
//!
//! A [`ToxicityAnalyzer`] turns text into a score in `[0, 1]` plus the
//! labels of the signals that fired. The built-in [`HeuristicAnalyzer`]
//! needs no network; [`HttpAnalyzer`] calls a remote scoring service and is
//! normally wrapped in a [`FallbackAnalyzer`] so an outage degrades to the
//! heuristic. [`CachedAnalyzer`] memoizes results per content digest.
//!
//! ```ignore
//! let analyzer = build_analyzer(&config.analyzer)?;
//! let analysis = analyzer.analyze("you are an idiot").await?;
//! assert!(analysis.labels.contains(&"harassment".to_string()));
//! ```

use async_trait::async_trait;
use moka::future::Cache;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AnalyzerConfig, AnalyzerProvider};

/// Result of analyzing one piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Combined toxicity, 0 = clean, 1 = certainly toxic
    pub score: f64,
    pub labels: Vec<String>,
    /// Which analyzer produced the result
    pub provider: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Analyzer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Analyzer returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ToxicityAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<Analysis, AnalysisError>;

    fn name(&self) -> &'static str;
}

// ============================================================================
// Heuristic
// ============================================================================

/// A family of related patterns contributing one partial score
struct SignalFamily {
    label: &'static str,
    pattern: &'static Lazy<Regex>,
    per_hit: f64,
    cap: f64,
}

static PROFANITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(fuck\w*|shit\w*|bitch\w*|asshole\w*|bastard\w*|dickhead\w*|crap)\b")
        .expect("profanity pattern")
});

static HARASSMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(you('re| are)( such)?( an?)? (idiot|moron|stupid|loser|pathetic|worthless|clown)|shut up|nobody (likes|cares about) you|get lost)\b",
    )
    .expect("harassment pattern")
});

static HATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(subhuman|vermin|go back to (your|their) (own )?country|(those|these) people are (animals|parasites))\b")
        .expect("hate pattern")
});

static THREAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b((i('ll| will)|gonna|going to) (kill|hurt|beat|find|destroy) you|kill yourself|you('ll| will) regret (this|it)|watch your back)\b",
    )
    .expect("threat pattern")
});

static SPAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(https?://\S+|\b(buy now|free money|click here|limited offer|work from home|crypto giveaway)\b)")
        .expect("spam pattern")
});

static FAMILIES: Lazy<Vec<SignalFamily>> = Lazy::new(|| {
    vec![
        SignalFamily { label: "profanity", pattern: &PROFANITY, per_hit: 0.3, cap: 0.6 },
        SignalFamily { label: "harassment", pattern: &HARASSMENT, per_hit: 0.5, cap: 0.75 },
        SignalFamily { label: "hate", pattern: &HATE, per_hit: 0.7, cap: 0.9 },
        SignalFamily { label: "threat", pattern: &THREAT, per_hit: 0.8, cap: 0.95 },
        // Links and sales phrases; a single link is common and cheap
        SignalFamily { label: "spam", pattern: &SPAM, per_hit: 0.15, cap: 0.6 },
    ]
});

/// Minimum number of letters before the shouting signal is considered
const SHOUTING_MIN_LETTERS: usize = 12;
const SHOUTING_RATIO: f64 = 0.7;
const SHOUTING_SCORE: f64 = 0.2;

/// Runs of one repeated character at least this long count as flooding
const FLOOD_RUN: usize = 6;
const FLOOD_SCORE: f64 = 0.15;

/// Offline analyzer combining regex signal families
#[derive(Debug, Default, Clone)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Score text synchronously.
    ///
    /// Each family yields a partial score `s_i`; the result is
    /// `1 - Π(1 - s_i)`, so independent signals reinforce each other without
    /// ever exceeding 1.
    pub fn score(&self, text: &str) -> Analysis {
        let mut partials: Vec<(&'static str, f64)> = Vec::new();

        for family in FAMILIES.iter() {
            let hits = family.pattern.find_iter(text).count();
            if hits > 0 {
                partials.push((family.label, (hits as f64 * family.per_hit).min(family.cap)));
            }
        }

        if is_shouting(text) {
            partials.push(("shouting", SHOUTING_SCORE));
        }
        if has_flooding(text) {
            partials.push(("flooding", FLOOD_SCORE));
        }

        let clean = partials.iter().fold(1.0, |acc, (_, s)| acc * (1.0 - s));
        Analysis {
            score: (1.0 - clean).clamp(0.0, 1.0),
            labels: partials.into_iter().map(|(label, _)| label.to_string()).collect(),
            provider: self.name().to_string(),
        }
    }
}

fn is_shouting(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < SHOUTING_MIN_LETTERS {
        return false;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters.len() as f64 > SHOUTING_RATIO
}

fn has_flooding(text: &str) -> bool {
    let mut run = 0usize;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if c.is_whitespace() {
            run = 0;
            prev = None;
            continue;
        }
        if prev == Some(c) {
            run += 1;
        } else {
            run = 1;
            prev = Some(c);
        }
        if run >= FLOOD_RUN {
            return true;
        }
    }
    false
}

#[async_trait]
impl ToxicityAnalyzer for HeuristicAnalyzer {
    async fn analyze(&self, text: &str) -> Result<Analysis, AnalysisError> {
        Ok(self.score(text))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

// ============================================================================
// Remote
// ============================================================================

#[derive(Serialize)]
struct ScoreRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ScoreResponse {
    score: f64,
    #[serde(default)]
    labels: Vec<String>,
}

/// Calls an HTTP scoring service: `POST {"text"}` → `{"score", "labels"}`
pub struct HttpAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpAnalyzer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl ToxicityAnalyzer for HttpAnalyzer {
    async fn analyze(&self, text: &str) -> Result<Analysis, AnalysisError> {
        let mut request = self.client.post(&self.endpoint).json(&ScoreRequest { text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: ScoreResponse = request.send().await?.error_for_status()?.json().await?;
        if !response.score.is_finite() {
            return Err(AnalysisError::InvalidResponse(format!(
                "score is not a number: {}",
                response.score
            )));
        }

        Ok(Analysis {
            score: response.score.clamp(0.0, 1.0),
            labels: response.labels,
            provider: self.name().to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

// ============================================================================
// Combinators
// ============================================================================

/// Uses `secondary` whenever `primary` fails
pub struct FallbackAnalyzer {
    primary: Arc<dyn ToxicityAnalyzer>,
    secondary: Arc<dyn ToxicityAnalyzer>,
}

impl FallbackAnalyzer {
    pub fn new(primary: Arc<dyn ToxicityAnalyzer>, secondary: Arc<dyn ToxicityAnalyzer>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl ToxicityAnalyzer for FallbackAnalyzer {
    async fn analyze(&self, text: &str) -> Result<Analysis, AnalysisError> {
        match self.primary.analyze(text).await {
            Ok(analysis) => Ok(analysis),
            Err(e) => {
                tracing::warn!(
                    primary = self.primary.name(),
                    secondary = self.secondary.name(),
                    "Analyzer failed, falling back: {}",
                    e
                );
                self.secondary.analyze(text).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

/// Memoizes analyses by MD5 digest of the text
pub struct CachedAnalyzer {
    inner: Arc<dyn ToxicityAnalyzer>,
    cache: Cache<String, Analysis>,
}

impl CachedAnalyzer {
    pub fn new(inner: Arc<dyn ToxicityAnalyzer>, capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(capacity).time_to_live(ttl).build();
        Self { inner, cache }
    }

    fn key(text: &str) -> String {
        format!("{:x}", md5::compute(text.as_bytes()))
    }
}

#[async_trait]
impl ToxicityAnalyzer for CachedAnalyzer {
    async fn analyze(&self, text: &str) -> Result<Analysis, AnalysisError> {
        let key = Self::key(text);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let analysis = self.inner.analyze(text).await?;
        self.cache.insert(key, analysis.clone()).await;
        Ok(analysis)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Build the analyzer stack described by the configuration
pub fn build_analyzer(config: &AnalyzerConfig) -> anyhow::Result<Arc<dyn ToxicityAnalyzer>> {
    let heuristic: Arc<dyn ToxicityAnalyzer> = Arc::new(HeuristicAnalyzer::new());

    let base: Arc<dyn ToxicityAnalyzer> = match config.provider {
        AnalyzerProvider::Heuristic => heuristic,
        AnalyzerProvider::Http => {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or_else(|| anyhow::anyhow!("analyzer.endpoint is required for the http provider"))?;
            let remote = HttpAnalyzer::new(
                endpoint,
                config.api_key.clone(),
                Duration::from_secs(config.timeout_secs),
            )?;
            Arc::new(FallbackAnalyzer::new(Arc::new(remote), heuristic))
        }
    };

    tracing::info!(provider = base.name(), "Toxicity analyzer ready");

    Ok(Arc::new(CachedAnalyzer::new(
        base,
        config.cache_capacity,
        Duration::from_secs(config.cache_ttl_seconds),
    )))
}
