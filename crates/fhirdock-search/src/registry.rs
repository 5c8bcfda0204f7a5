//! Search parameter registry for indexing and lookup.
//!
//! Indexes [`SearchParameter`] definitions by resource type + code, by
//! canonical URL, and keeps a separate bucket of parameters common to every
//! resource type (`_id`, `_lastUpdated`, `_tag`, ...).

use std::collections::HashMap;
use std::sync::Arc;

use crate::parameters::SearchParameter;

#[derive(Debug, Default)]
pub struct SearchParameterRegistry {
    by_resource: HashMap<String, HashMap<String, Arc<SearchParameter>>>,
    by_url: HashMap<String, Arc<SearchParameter>>,
    common: HashMap<String, Arc<SearchParameter>>,
}

impl SearchParameterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, param: SearchParameter) {
        let param = Arc::new(param);
        self.by_url.insert(param.url.clone(), param.clone());

        if param.is_common() {
            self.common.insert(param.code.clone(), param.clone());
        }

        for base in &param.base {
            self.by_resource.entry(base.clone()).or_default().insert(param.code.clone(), param.clone());
        }
    }

    /// Resource-specific parameters take priority over common ones of the
    /// same code (there are none in practice, but the search order matters
    /// if a profile ever overrides a common parameter's semantics).
    #[must_use]
    pub fn get(&self, resource_type: &str, code: &str) -> Option<Arc<SearchParameter>> {
        if let Some(param) = self.by_resource.get(resource_type).and_then(|params| params.get(code)) {
            return Some(param.clone());
        }
        self.common.get(code).cloned()
    }

    #[must_use]
    pub fn get_all_for_type(&self, resource_type: &str) -> Vec<Arc<SearchParameter>> {
        let mut params: Vec<_> = self.common.values().cloned().collect();
        if let Some(type_params) = self.by_resource.get(resource_type) {
            params.extend(type_params.values().cloned());
        }
        params
    }

    #[must_use]
    pub fn get_by_url(&self, url: &str) -> Option<Arc<SearchParameter>> {
        self.by_url.get(url).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}
