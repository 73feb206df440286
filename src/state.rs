//! Shared, read-only application state handed to every handler.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Profiles;
use crate::stix::{GeneratorClient, VulnTransport};
use crate::upstream::{QueryScope, SearchTransport};

/// Default cap on uploaded keyword lists.
pub const DEFAULT_MAX_BULK_TERMS: usize = 200;
const DEFAULT_VULN_PAGE_SIZE: u32 = 500;

/// Handlers build their own driver per request; nothing here is mutable.
#[derive(Clone)]
pub struct AppState {
    /// Transport for single-term routes.
    pub search: Arc<dyn SearchTransport>,
    /// Transport for uploaded keyword lists, possibly with its own token.
    pub bulk: Arc<dyn SearchTransport>,
    pub vulns: Option<Arc<dyn VulnTransport>>,
    pub generator: Option<Arc<GeneratorClient>>,
    pub profiles: Arc<Profiles>,
    /// Fixed filters; the per-request site is layered on top.
    pub scope: QueryScope,
    pub vuln_page_size: u32,
    pub max_bulk_terms: usize,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        search: Arc<dyn SearchTransport>,
        bulk: Arc<dyn SearchTransport>,
        profiles: Profiles,
    ) -> Self {
        Self {
            search,
            bulk,
            vulns: None,
            generator: None,
            profiles: Arc::new(profiles),
            scope: QueryScope::default(),
            vuln_page_size: DEFAULT_VULN_PAGE_SIZE,
            max_bulk_terms: DEFAULT_MAX_BULK_TERMS,
            started_at: Instant::now(),
        }
    }

    pub fn with_vulns(mut self, vulns: Arc<dyn VulnTransport>, page_size: u32) -> Self {
        self.vulns = Some(vulns);
        self.vuln_page_size = page_size;
        self
    }

    pub fn with_generator(mut self, generator: GeneratorClient) -> Self {
        self.generator = Some(Arc::new(generator));
        self
    }

    pub fn with_scope(mut self, scope: QueryScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_max_bulk_terms(mut self, max: usize) -> Self {
        self.max_bulk_terms = max;
        self
    }
}
