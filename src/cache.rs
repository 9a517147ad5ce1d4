use std::collections::HashMap;

use tracing::debug;

use crate::{backend::KernelHandle, error::Result, layer::OperatorKind};

pub type VariantKey = (OperatorKind, usize);

/// One compiled kernel per (operator kind, stride), filled on first use and
/// dropped with the run that owns it.
#[derive(Debug, Default)]
pub struct CompilationCache {
    handles: HashMap<VariantKey, KernelHandle>,
    hits: usize,
    misses: usize,
}

impl CompilationCache {
    pub fn new() -> CompilationCache {
        CompilationCache::default()
    }

    /// Returns the cached handle for `key` or compiles one with `compile`.
    /// A failed compile leaves the key empty so a later layer retries it.
    pub fn get_or_compile(
        &mut self,
        key: VariantKey,
        compile: impl FnOnce() -> Result<KernelHandle>,
    ) -> Result<KernelHandle> {
        if let Some(&handle) = self.handles.get(&key) {
            self.hits += 1;
            debug!("cache hit for {} stride {}", key.0, key.1);
            return Ok(handle);
        }

        self.misses += 1;
        debug!("cache miss for {} stride {}, compiling", key.0, key.1);
        let handle = compile()?;
        self.handles.insert(key, handle);
        Ok(handle)
    }

    pub fn get(&self, key: &VariantKey) -> Option<KernelHandle> {
        self.handles.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn compiles_once_per_variant() {
        let mut cache = CompilationCache::new();
        let mut compiled = 0;

        for key in [
            (OperatorKind::StandardConv, 1),
            (OperatorKind::StandardConv, 1),
            (OperatorKind::DepthwiseConv, 1),
            (OperatorKind::StandardConv, 1),
        ] {
            cache
                .get_or_compile(key, || {
                    compiled += 1;
                    Ok(KernelHandle(compiled))
                })
                .unwrap();
        }

        assert_eq!(compiled, 2);
        assert_eq!(cache.len(), 2);
        assert_eq!((cache.hits(), cache.misses()), (2, 2));
        assert_eq!(
            cache.get(&(OperatorKind::DepthwiseConv, 1)),
            Some(KernelHandle(2))
        );
    }

    #[test]
    fn failures_are_not_cached() {
        let mut cache = CompilationCache::new();
        let key = (OperatorKind::StandardConv, 2);

        assert!(cache
            .get_or_compile(key, || Err(Error::Unsupported("boom".into())))
            .is_err());
        assert!(cache.is_empty());
        assert_eq!(
            cache.get_or_compile(key, || Ok(KernelHandle(0))).unwrap(),
            KernelHandle(0)
        );
    }
}
