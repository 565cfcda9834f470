//! Embedder policy adapters: operation veto and debug cookie checks.

use crate::domain::Origin;
use crate::ports::outbound::{DebugCookieChecker, OperationContext, OperationKind, OperationPolicy};
use std::collections::BTreeSet;

/// Allows every operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

impl OperationPolicy for AllowAllPolicy {
    fn is_operation_allowed(&self, _context: &OperationContext<'_>) -> bool {
        true
    }
}

/// Blocks operations that involve any listed origin, optionally only for
/// some operation kinds.
#[derive(Debug, Clone, Default)]
pub struct BlockOriginsPolicy {
    blocked: BTreeSet<Origin>,
    kinds: Option<BTreeSet<OperationKind>>,
}

impl BlockOriginsPolicy {
    pub fn new(blocked: impl IntoIterator<Item = Origin>) -> Self {
        Self {
            blocked: blocked.into_iter().collect(),
            kinds: None,
        }
    }

    /// Restricts the block to the given operation kinds.
    pub fn for_kinds(mut self, kinds: impl IntoIterator<Item = OperationKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }
}

impl OperationPolicy for BlockOriginsPolicy {
    fn is_operation_allowed(&self, context: &OperationContext<'_>) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&context.kind) {
                return true;
            }
        }
        let involved = [
            context.source_origin,
            context.destination_origin,
            Some(context.reporting_origin),
        ];
        !involved
            .into_iter()
            .flatten()
            .any(|origin| self.blocked.contains(origin))
    }
}

/// Debug cookie checker backed by a fixed origin set.
#[derive(Debug, Clone, Default)]
pub struct StaticDebugCookieChecker {
    origins: BTreeSet<Origin>,
    all: bool,
}

impl StaticDebugCookieChecker {
    /// No origin has the cookie.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every origin has the cookie.
    pub fn all() -> Self {
        Self {
            origins: BTreeSet::new(),
            all: true,
        }
    }

    pub fn with_origins(origins: impl IntoIterator<Item = Origin>) -> Self {
        Self {
            origins: origins.into_iter().collect(),
            all: false,
        }
    }
}

impl DebugCookieChecker for StaticDebugCookieChecker {
    fn is_debug_cookie_set(&self, reporting_origin: &Origin) -> bool {
        self.all || self.origins.contains(reporting_origin)
    }
}
