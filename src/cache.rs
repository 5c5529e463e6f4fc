use crate::eval::EvalError;
use crate::expr::{compile, Expr};
use sha2::{Digest, Sha256};
use std::rc::Rc;
use tracing::trace;

pub type Compiled = Rc<Result<Expr, EvalError>>;

pub struct CacheEntry {
    pub hash: String,
    pub compiled: Compiled,
}

/// Compiled form of one attribute's expression text. The entry is keyed by
/// a fingerprint of the text, so a changed attribute recompiles on the next
/// read and an unchanged one is reused.
#[derive(Default)]
pub struct ExpressionCache {
    entry: Option<CacheEntry>,
    compilations: usize,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, source: &str) -> Option<Compiled> {
        let entry = self.entry.as_ref()?;
        if entry.hash == Self::compute_hash(source) {
            Some(entry.compiled.clone())
        } else {
            None
        }
    }

    pub fn get_or_compile(&mut self, source: &str, parameter: &str) -> Compiled {
        if let Some(compiled) = self.get(source) {
            trace!("expression cache hit");
            return compiled;
        }
        let compiled: Compiled = Rc::new(compile(source, parameter));
        self.compilations += 1;
        self.entry = Some(CacheEntry {
            hash: Self::compute_hash(source),
            compiled: compiled.clone(),
        });
        compiled
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn is_warm(&self) -> bool {
        self.entry.is_some()
    }

    /// Number of times this slot has compiled text.
    pub fn compilations(&self) -> usize {
        self.compilations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_text_is_compiled_once() {
        let mut cache = ExpressionCache::new();
        let first = cache.get_or_compile("{a: 1}", "component");
        let second = cache.get_or_compile("{a: 1}", "component");
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.compilations(), 1);
    }

    #[test]
    fn test_changed_text_recompiles() {
        let mut cache = ExpressionCache::new();
        cache.get_or_compile("1", "component");
        cache.get_or_compile("2", "component");
        assert_eq!(cache.compilations(), 2);
        assert!(cache.get("1").is_none());
        assert!(cache.get("2").is_some());
    }

    #[test]
    fn test_failed_compilation_is_cached_too() {
        let mut cache = ExpressionCache::new();
        let compiled = cache.get_or_compile("not valid !!", "component");
        assert!(compiled.is_err());
        cache.get_or_compile("not valid !!", "component");
        assert_eq!(cache.compilations(), 1);

        cache.invalidate();
        assert!(!cache.is_warm());
    }
}
