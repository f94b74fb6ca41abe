// 🎯 Resolution Façade
//
// entity id (identity) → raw values + declared type (store) → typed values
// (materialize). Each call checks out its own session; the session guard
// returns the connection on every exit path.

use crate::error::{AttributeError, AttributeResult, Status};
use crate::identity::{resolve_entity_id, DesignatorKind, EvaluationContext};
use crate::materialize::{materialize, TypedAttributeValue};
use crate::store::{AttributeStore, RawAttributeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, error, info, info_span};

/// Name of the span wrapping every store round trip.
pub const FETCH_SPAN: &str = "database.fetch";

// ============================================================================
// HOST-FACING TYPES
// ============================================================================

/// A designator request exactly as the policy engine hands it over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindAttributeRequest {
    pub attribute_type: String,
    pub attribute_id: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub subject_category: Option<String>,
    /// Raw host designator target code.
    pub designator_type: i32,
}

/// Outcome handed back to the policy engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvaluationResult {
    /// Zero or more values; an empty bag means "unknown for this entity".
    Bag {
        attribute_type: String,
        values: Vec<TypedAttributeValue>,
    },
    Indeterminate(Status),
}

impl EvaluationResult {
    pub fn empty_bag(attribute_type: impl Into<String>) -> Self {
        EvaluationResult::Bag {
            attribute_type: attribute_type.into(),
            values: Vec::new(),
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        matches!(self, EvaluationResult::Indeterminate(_))
    }

    pub fn values(&self) -> &[TypedAttributeValue] {
        match self {
            EvaluationResult::Bag { values, .. } => values,
            EvaluationResult::Indeterminate(_) => &[],
        }
    }
}

// ============================================================================
// FAÇADE
// ============================================================================

/// AttributeResolver - what the policy engine talks to
///
/// `Send + Sync` and cheap to clone; share one per process.
#[derive(Clone)]
pub struct AttributeResolver {
    store: AttributeStore,
}

impl AttributeResolver {
    pub fn new(store: AttributeStore) -> Self {
        AttributeResolver { store }
    }

    pub fn store(&self) -> &AttributeStore {
        &self.store
    }

    // ========================================================================
    // CAPABILITIES
    // ========================================================================

    /// Only designators are supported, not selectors.
    pub fn is_designator_supported(&self) -> bool {
        true
    }

    pub fn supported_designator_kinds(&self) -> BTreeSet<DesignatorKind> {
        DesignatorKind::ALL.into_iter().collect()
    }

    pub fn supported_identifiers(&self) -> AttributeResult<BTreeSet<String>> {
        let session = self.store.open(true)?;
        let ids = session.supported_identifiers()?;
        let _cleanup = session.close();
        Ok(ids)
    }

    pub fn supports_id(&self, attribute_id: &str) -> AttributeResult<bool> {
        Ok(self.supported_identifiers()?.contains(attribute_id))
    }

    // ========================================================================
    // RESOLUTION
    // ========================================================================

    /// Typed values of `attribute_id` for the entity the designator refers to.
    pub fn resolve(
        &self,
        attribute_id: &str,
        kind: DesignatorKind,
        context: &dyn EvaluationContext,
    ) -> AttributeResult<Vec<TypedAttributeValue>> {
        self.resolve_with(attribute_id, kind, context, None, None)
    }

    /// [`resolve`](Self::resolve) with the issuer and subject category the
    /// host passes along to the context lookup.
    pub fn resolve_with(
        &self,
        attribute_id: &str,
        kind: DesignatorKind,
        context: &dyn EvaluationContext,
        issuer: Option<&str>,
        subject_category: Option<&str>,
    ) -> AttributeResult<Vec<TypedAttributeValue>> {
        info!("Fetching attribute {} ({})", attribute_id, kind);

        let entity_id = resolve_entity_id(kind, context, issuer, subject_category)?;
        let raw = self.fetch(&entity_id, attribute_id)?;
        let values = materialize(&raw)?;

        if values.is_empty() {
            info!("No values received from the db for attribute #{}", attribute_id);
        }
        Ok(values)
    }

    /// Store round trip for one (entity, attribute) pair, timed in its own span.
    fn fetch(&self, entity_id: &str, attribute_id: &str) -> AttributeResult<RawAttributeResult> {
        let span = info_span!(FETCH_SPAN, attribute = attribute_id, entity = entity_id);
        let _enter = span.enter();
        let started = Instant::now();

        let session = self.store.open(true).map_err(|e| {
            error!("Cannot open session: {}", e);
            AttributeError::from(e)
        })?;
        let result = session.fetch_raw_values(entity_id, attribute_id);
        let _cleanup = session.close();

        debug!(elapsed_us = started.elapsed().as_micros() as u64, "Store round trip finished");
        result.map_err(AttributeError::from)
    }

    /// Host-shaped entry point: never fails, failures become indeterminate.
    pub fn find_attribute(
        &self,
        request: &FindAttributeRequest,
        context: &dyn EvaluationContext,
    ) -> EvaluationResult {
        let outcome = DesignatorKind::try_from(request.designator_type).and_then(|kind| {
            self.resolve_with(
                &request.attribute_id,
                kind,
                context,
                request.issuer.as_deref(),
                request.subject_category.as_deref(),
            )
        });

        match outcome {
            Ok(values) => EvaluationResult::Bag {
                attribute_type: request.attribute_type.clone(),
                values,
            },
            Err(err) => {
                error!("Cannot resolve {}: {}", request.attribute_id, err);
                EvaluationResult::Indeterminate(err.to_status())
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
