//! Map-backed Fn registry.

use oraclesig_types::{FnRegistry, OracleFn};
use std::collections::HashMap;
use std::sync::Arc;

/// An in-memory [`FnRegistry`].
///
/// Registration happens before the reactor starts; the registry is immutable
/// afterwards.
#[derive(Default)]
pub struct InMemoryFnRegistry {
    fns: HashMap<String, Arc<dyn OracleFn>>,
}

impl InMemoryFnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `oracle_fn` under `fn_id`, replacing any previous entry.
    pub fn register(&mut self, fn_id: impl Into<String>, oracle_fn: Arc<dyn OracleFn>) {
        self.fns.insert(fn_id.into(), oracle_fn);
    }
}

impl FnRegistry for InMemoryFnRegistry {
    fn get_all(&self) -> Vec<String> {
        self.fns.keys().cloned().collect()
    }

    fn get(&self, fn_id: &str) -> Option<Arc<dyn OracleFn>> {
        self.fns.get(fn_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oraclesig_types::FnError;

    struct NullFn;

    impl OracleFn for NullFn {
        fn prepare_context(&self) -> Result<Vec<u8>, FnError> {
            Ok(vec![])
        }
        fn get_message_and_signature(&self, _ctx: &[u8]) -> Result<(Vec<u8>, Vec<u8>), FnError> {
            Ok((vec![], vec![]))
        }
        fn map_message(&self, _ctx: &[u8], _hash: &[u8], _message: &[u8]) -> Result<(), FnError> {
            Ok(())
        }
        fn submit_multi_signed_message(
            &self,
            _ctx: &[u8],
            _hash: &[u8],
            _oracle_signatures: &[Option<Vec<u8>>],
        ) {
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = InMemoryFnRegistry::new();
        registry.register("price-feed", Arc::new(NullFn));
        registry.register("rate-feed", Arc::new(NullFn));

        let mut ids = registry.get_all();
        ids.sort();
        assert_eq!(ids, vec!["price-feed", "rate-feed"]);
        assert!(registry.get("price-feed").is_some());
        assert!(registry.get("unknown").is_none());
    }
}
