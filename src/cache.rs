//! Thread-local cache of compiled tree-sitter queries.
//!
//! Compiling a query walks the grammar tables; the indexer runs the same
//! handful of queries before every edit, so compiled engines are kept per thread.
//! Cache is capped at 64 entries; it is cleared when full.

use crate::ts::{QueryEngine, TreeSitterError};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const MAX_CACHE_ENTRIES: usize = 64;

thread_local! {
    static QUERY_CACHE: RefCell<HashMap<String, Rc<QueryEngine>>> =
        RefCell::new(HashMap::new());
}

/// Get a compiled query from cache, or compile and cache it.
pub fn get_or_compile_query(query_str: &str) -> Result<Rc<QueryEngine>, TreeSitterError> {
    QUERY_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(engine) = cache.get(query_str) {
            return Ok(Rc::clone(engine));
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = Rc::new(QueryEngine::new(query_str)?);
        cache.insert(query_str.to_string(), Rc::clone(&compiled));
        Ok(compiled)
    })
}

/// Clear the query cache (mainly for testing).
pub fn clear_cache() {
    QUERY_CACHE.with(|cache| {
        cache.borrow_mut().clear();
    });
}

/// Number of compiled queries held by this thread.
pub fn cache_size() -> usize {
    QUERY_CACHE.with(|cache| cache.borrow().len())
}
