//! Shared cache of parsed templates.
//!
//! Templates are parsed once and the resulting [`TemplateAst`] is shared
//! read-only across renders and threads. The map is sharded, so concurrent
//! renders never lock the whole cache.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::ast::TemplateAst;
use crate::error::SyntaxError;
use crate::grammar::Grammar;
use crate::parser::Parser;

/// Identity of a parsed template: its name plus a hash of its content and
/// the grammar it was parsed with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub content_hash: u64,
}

impl CacheKey {
    pub fn new(name: &str, source: &str, grammar: &Grammar) -> Self {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        grammar.hash(&mut hasher);
        Self {
            name: name.to_string(),
            content_hash: hasher.finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Default)]
pub struct AstCache {
    entries: DashMap<CacheKey, Arc<TemplateAst>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AstCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached AST for this template, parsing it on a miss.
    ///
    /// Templates with syntax errors are not cached. When two threads miss on
    /// the same key at once, both parse and the first insert wins; the
    /// results are equal either way.
    pub fn get_or_parse(
        &self,
        parser: &Parser,
        name: &str,
        source: &str,
    ) -> Result<Arc<TemplateAst>, Vec<SyntaxError>> {
        let key = CacheKey::new(name, source, parser.grammar());

        if let Some(ast) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("AST cache hit for {}", name);
            return Ok(Arc::clone(ast.value()));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("AST cache miss for {}", name);

        let ast = Arc::new(parser.parse(name, source)?);
        let cached = self.entries.entry(key).or_insert(ast);
        Ok(Arc::clone(cached.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> Parser {
        Parser::new(Grammar::default()).unwrap()
    }

    #[test]
    fn test_second_lookup_hits() {
        let cache = AstCache::new();
        let parser = parser();

        let first = cache.get_or_parse(&parser, "values.yaml", "a: {{ b }}").unwrap();
        let second = cache.get_or_parse(&parser, "values.yaml", "a: {{ b }}").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[test]
    fn test_changed_content_is_a_new_entry() {
        let cache = AstCache::new();
        let parser = parser();

        cache.get_or_parse(&parser, "t", "a: {{ b }}").unwrap();
        cache.get_or_parse(&parser, "t", "a: {{ c }}").unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_syntax_errors_not_cached() {
        let cache = AstCache::new();
        assert!(cache.get_or_parse(&parser(), "t", "{% if %}").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_parses_agree() {
        let cache = Arc::new(AstCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache
                        .get_or_parse(&parser(), "t", "{% if a %}{{ b }}{% endif %}")
                        .unwrap()
                })
            })
            .collect();

        let asts: Vec<Arc<TemplateAst>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(asts.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.len(), 1);
    }
}
