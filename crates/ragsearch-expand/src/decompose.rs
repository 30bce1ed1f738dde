//! Query decomposition into independently searchable sub-queries.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ragsearch_cache::keys::decomposition_key;
use ragsearch_cache::TtlLru;
use ragsearch_core::config::ExpansionSettings;
use ragsearch_core::error::with_timeout;
use ragsearch_core::traits::Generator;

use crate::EXPANSION_CACHE_TTL;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecompositionStrategy {
    #[default]
    Single,
    Parallel,
    Sequential,
    Hybrid,
}

impl DecompositionStrategy {
    fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "single" => Some(Self::Single),
            "parallel" => Some(Self::Parallel),
            "sequential" => Some(Self::Sequential),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuery {
    pub id: usize,
    pub query: String,
    pub intent: String,
    pub keywords: Vec<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecomposedQuery {
    pub original_query: String,
    pub sub_queries: Vec<SubQuery>,
    pub strategy: DecompositionStrategy,
}

impl DecomposedQuery {
    /// The query itself as the only, primary sub-query.
    pub fn single(query: &str) -> Self {
        Self {
            original_query: query.to_string(),
            sub_queries: vec![SubQuery { id: 0, query: query.to_string(), intent: "lookup".into(), keywords: keywords(query), is_primary: true }],
            strategy: DecompositionStrategy::Single,
        }
    }
}

#[derive(Deserialize)]
struct RawSubQuery {
    #[serde(alias = "question")]
    query: String,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default, alias = "isPrimary", alias = "primary")]
    is_primary: bool,
}

#[derive(Deserialize)]
struct RawDecomposition {
    #[serde(alias = "subQueries", alias = "sub_questions")]
    sub_queries: Vec<RawSubQuery>,
    #[serde(default)]
    strategy: Option<String>,
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "between", "can", "difference", "does", "for", "from", "how", "into",
    "is", "of", "on", "or", "the", "their", "this", "to", "what", "when", "where", "which", "who", "why", "with",
];

fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.len() > 2 && !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// First well-formed decomposition object in `text`. Models tend to wrap
/// JSON in prose or code fences, so every `{` is tried as a start.
fn first_decomposition(text: &str) -> Option<RawDecomposition> {
    text.match_indices('{').find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<RawDecomposition>()
            .next()
            .and_then(Result::ok)
    })
}

struct Rules {
    comparison: Regex,
    between: Regex,
    versus: Regex,
    explanation: Regex,
    procedural: Regex,
    clause_split: Regex,
}

impl Rules {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            comparison: Regex::new(r"(?i)\b(compare|comparison|versus|vs\.?|difference between|differences between|differ)\b")?,
            between: Regex::new(r"(?i)\bbetween\s+(?P<a>.+?)\s+and\s+(?P<b>.+?)[?.!]*$")?,
            versus: Regex::new(r"(?i)^(?:compare\s+)?(?P<a>.+?)\s+(?:vs\.?|versus|and|with|to)\s+(?P<b>.+?)[?.!]*$")?,
            explanation: Regex::new(r"(?i)^\s*(why|explain|how does|how do|how is|what causes)\b")?,
            procedural: Regex::new(r"(?i)\b(how to|how can i|how do i|steps to|step by step|guide to|set up|install|configure)\b")?,
            clause_split: Regex::new(r"(?i)\s*(?:;|\?|\band also\b|\band then\b|\band\b)\s*")?,
        })
    }
}

pub struct QueryDecomposer {
    generator: Option<Arc<dyn Generator>>,
    settings: ExpansionSettings,
    timeout: Duration,
    cache: TtlLru<DecomposedQuery>,
    rules: Option<Rules>,
}

impl QueryDecomposer {
    pub fn new(generator: Option<Arc<dyn Generator>>, settings: ExpansionSettings, timeout: Duration) -> Self {
        let rules = match Rules::new() {
            Ok(rules) => Some(rules),
            Err(e) => { warn!(error = %e, "decomposition rules failed to compile, rule-based splitting disabled"); None }
        };
        let cache = TtlLru::new(settings.cache_capacity);
        Self { generator, settings, timeout, cache, rules }
    }

    pub fn has_generator(&self) -> bool { self.generator.is_some() }

    fn prompt(&self, query: &str) -> String {
        format!(
            "Break the search question below into at most {max} self-contained sub-questions that can be \
             searched independently. Reply with JSON only, in the form \
             {{\"strategy\": \"single|parallel|sequential|hybrid\", \"sub_queries\": \
             [{{\"query\": \"...\", \"intent\": \"...\", \"keywords\": [\"...\"], \"is_primary\": true}}]}}. \
             Mark the sub-question closest to the original as primary.\n\nQuestion: {}",
            query.trim(),
            max = self.settings.max_sub_queries,
        )
    }

    fn from_raw(&self, query: &str, raw: RawDecomposition) -> Option<DecomposedQuery> {
        let mut sub_queries: Vec<SubQuery> = raw.sub_queries.into_iter()
            .filter(|s| !s.query.trim().is_empty())
            .take(self.settings.max_sub_queries.max(1))
            .enumerate()
            .map(|(id, s)| SubQuery {
                id,
                keywords: if s.keywords.is_empty() { keywords(&s.query) } else { s.keywords },
                query: s.query.trim().to_string(),
                intent: s.intent.filter(|i| !i.trim().is_empty()).unwrap_or_else(|| "lookup".into()),
                is_primary: s.is_primary,
            })
            .collect();
        if sub_queries.is_empty() { return None; }
        if !sub_queries.iter().any(|s| s.is_primary) { sub_queries[0].is_primary = true; }
        let strategy = match raw.strategy.as_deref().and_then(DecompositionStrategy::parse) {
            Some(s) => s,
            None if sub_queries.len() == 1 => DecompositionStrategy::Single,
            None => DecompositionStrategy::Parallel,
        };
        Some(DecomposedQuery { original_query: query.to_string(), sub_queries, strategy })
    }

    /// Decompose with the generation backend. Any failure yields the query
    /// as a single sub-query; only successful decompositions are cached.
    pub async fn decompose(&self, query: &str) -> DecomposedQuery {
        let key = decomposition_key(query);
        if let Some(hit) = self.cache.get(&key) {
            debug!("decomposition cache hit");
            return hit;
        }
        let Some(generator) = &self.generator else {
            return DecomposedQuery::single(query);
        };
        let prompt = self.prompt(query);
        let call = generator.generate(&prompt, self.settings.decompose_max_tokens, self.settings.temperature);
        let text = match with_timeout(self.timeout, call).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "decomposition call failed, searching the query as is");
                return DecomposedQuery::single(query);
            }
        };
        match first_decomposition(&text).and_then(|raw| self.from_raw(query, raw)) {
            Some(decomposed) => {
                debug!(sub_queries = decomposed.sub_queries.len(), strategy = ?decomposed.strategy, "decomposed query");
                self.cache.insert(key, decomposed.clone(), EXPANSION_CACHE_TTL, &[]);
                decomposed
            }
            None => {
                warn!("decomposition response held no usable JSON, searching the query as is");
                DecomposedQuery::single(query)
            }
        }
    }

    /// Rule-based decomposition without any external call.
    ///
    /// Comparison, explanation and procedural phrasing, or a query of at
    /// least `min_words_for_split` words, is split into the original query
    /// (primary) plus its comparison sides or clauses. Anything else stays
    /// a single sub-query.
    pub fn decompose_simple(&self, query: &str) -> DecomposedQuery {
        let Some(rules) = &self.rules else { return DecomposedQuery::single(query) };
        let trimmed = query.trim();
        let words = trimmed.split_whitespace().count();
        let intent = if rules.comparison.is_match(trimmed) {
            "comparison"
        } else if rules.procedural.is_match(trimmed) {
            "procedure"
        } else if rules.explanation.is_match(trimmed) {
            "explanation"
        } else if words >= self.settings.min_words_for_split {
            "lookup"
        } else {
            return DecomposedQuery::single(query);
        };

        let parts: Vec<String> = if intent == "comparison" {
            rules.between.captures(trimmed).or_else(|| rules.versus.captures(trimmed))
                .map(|c| ["a", "b"].iter().filter_map(|n| c.name(n)).map(|m| m.as_str().trim().to_string()).collect())
                .unwrap_or_default()
        } else {
            rules.clause_split.split(trimmed).map(str::trim).filter(|p| p.split_whitespace().count() >= 2).map(str::to_string).collect()
        };

        let mut seen: HashSet<String> = HashSet::from([trimmed.to_lowercase()]);
        let mut sub_queries = vec![SubQuery { id: 0, query: trimmed.to_string(), intent: intent.to_string(), keywords: keywords(trimmed), is_primary: true }];
        for part in parts {
            if sub_queries.len() >= self.settings.max_sub_queries.max(1) { break; }
            if part.is_empty() || !seen.insert(part.to_lowercase()) { continue; }
            sub_queries.push(SubQuery { id: sub_queries.len(), keywords: keywords(&part), query: part, intent: intent.to_string(), is_primary: false });
        }
        let strategy = if sub_queries.len() > 1 { DecompositionStrategy::Parallel } else { DecompositionStrategy::Single };
        DecomposedQuery { original_query: query.to_string(), sub_queries, strategy }
    }

    pub fn clear_cache(&self) { self.cache.clear(); }
}
