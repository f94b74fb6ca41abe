// 🪪 Entity Identity Resolver
// Works out which entity a designator refers to: the subject or resource whose
// identifier the evaluation context carries, or the fixed environment entity.

use crate::error::{AttributeError, AttributeResult, Status};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Identity attribute the context carries for a subject.
pub const SUBJECT_ID_ATTRIBUTE: &str = "subject:id";

/// Identity attribute the context carries for a resource.
pub const RESOURCE_ID_ATTRIBUTE: &str = "object:id";

/// Entity id used for every environment attribute.
pub const ENVIRONMENT_ENTITY_ID: &str = "environment";

// ============================================================================
// DESIGNATOR KINDS
// ============================================================================

/// Host designator target codes.
pub const SUBJECT_TARGET: i32 = 0;
pub const RESOURCE_TARGET: i32 = 1;
pub const ACTION_TARGET: i32 = 2;
pub const ENVIRONMENT_TARGET: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesignatorKind {
    Subject,
    Resource,
    Environment,
}

impl DesignatorKind {
    pub const ALL: [DesignatorKind; 3] = [
        DesignatorKind::Subject,
        DesignatorKind::Resource,
        DesignatorKind::Environment,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DesignatorKind::Subject => "subject",
            DesignatorKind::Resource => "resource",
            DesignatorKind::Environment => "environment",
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            DesignatorKind::Subject => SUBJECT_TARGET,
            DesignatorKind::Resource => RESOURCE_TARGET,
            DesignatorKind::Environment => ENVIRONMENT_TARGET,
        }
    }

    /// The context attribute that names the entity, if the kind has one.
    pub fn identity_attribute(&self) -> Option<&'static str> {
        match self {
            DesignatorKind::Subject => Some(SUBJECT_ID_ATTRIBUTE),
            DesignatorKind::Resource => Some(RESOURCE_ID_ATTRIBUTE),
            DesignatorKind::Environment => None,
        }
    }
}

impl fmt::Display for DesignatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for DesignatorKind {
    type Error = AttributeError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            SUBJECT_TARGET => Ok(DesignatorKind::Subject),
            RESOURCE_TARGET => Ok(DesignatorKind::Resource),
            ENVIRONMENT_TARGET => Ok(DesignatorKind::Environment),
            ACTION_TARGET => Err(AttributeError::UnsupportedDesignatorKind("action".into())),
            other => Err(AttributeError::UnsupportedDesignatorKind(other.to_string())),
        }
    }
}

impl FromStr for DesignatorKind {
    type Err = AttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "subject" => Ok(DesignatorKind::Subject),
            "resource" | "object" => Ok(DesignatorKind::Resource),
            "environment" => Ok(DesignatorKind::Environment),
            _ => Err(AttributeError::UnsupportedDesignatorKind(s.to_string())),
        }
    }
}

// ============================================================================
// EVALUATION CONTEXT
// ============================================================================

/// The host engine's view of the request being evaluated.
pub trait EvaluationContext {
    /// Values of `attribute_id` for the given category. `Err` means the
    /// lookup itself is indeterminate; its status is passed on unchanged.
    fn identity_values(
        &self,
        kind: DesignatorKind,
        attribute_id: &str,
        issuer: Option<&str>,
        subject_category: Option<&str>,
    ) -> Result<Vec<String>, Status>;
}

/// In-memory context: a fixed set of identity values per category.
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    values: HashMap<DesignatorKind, Vec<String>>,
    failure: Option<Status>,
}

impl StaticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, id: impl Into<String>) -> Self {
        self.values.entry(DesignatorKind::Subject).or_default().push(id.into());
        self
    }

    pub fn with_resource(mut self, id: impl Into<String>) -> Self {
        self.values.entry(DesignatorKind::Resource).or_default().push(id.into());
        self
    }

    /// Every lookup reports this status instead of values.
    pub fn indeterminate(status: Status) -> Self {
        StaticContext {
            values: HashMap::new(),
            failure: Some(status),
        }
    }
}

impl EvaluationContext for StaticContext {
    fn identity_values(
        &self,
        kind: DesignatorKind,
        _attribute_id: &str,
        _issuer: Option<&str>,
        _subject_category: Option<&str>,
    ) -> Result<Vec<String>, Status> {
        if let Some(status) = &self.failure {
            return Err(status.clone());
        }
        Ok(self.values.get(&kind).cloned().unwrap_or_default())
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Entity id the designator refers to.
pub fn resolve_entity_id(
    kind: DesignatorKind,
    context: &dyn EvaluationContext,
    issuer: Option<&str>,
    subject_category: Option<&str>,
) -> AttributeResult<String> {
    let Some(attribute_id) = kind.identity_attribute() else {
        return Ok(ENVIRONMENT_ENTITY_ID.to_string());
    };

    let mut values = context
        .identity_values(kind, attribute_id, issuer, subject_category)
        .map_err(AttributeError::Indeterminate)?;

    match values.len() {
        0 => {
            warn!("Missing {} identifier in evaluation context", kind);
            Err(AttributeError::MissingIdentifier(kind))
        }
        1 => {
            let id = values.remove(0);
            debug!("{} identifier: {}", kind, id);
            Ok(id)
        }
        n => {
            warn!("{} {} identifiers in evaluation context", n, kind);
            Err(AttributeError::AmbiguousIdentifier(kind))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Counts how often the resolver consults it.
    struct UntouchableContext {
        calls: Cell<usize>,
    }

    impl EvaluationContext for UntouchableContext {
        fn identity_values(
            &self,
            _: DesignatorKind,
            _: &str,
            _: Option<&str>,
            _: Option<&str>,
        ) -> Result<Vec<String>, Status> {
            self.calls.set(self.calls.get() + 1);
            Ok(vec!["1".into()])
        }
    }

    /// Records which identity attribute was requested.
    struct RecordingContext {
        requested: std::cell::RefCell<Vec<String>>,
    }

    impl EvaluationContext for RecordingContext {
        fn identity_values(
            &self,
            _: DesignatorKind,
            attribute_id: &str,
            _: Option<&str>,
            _: Option<&str>,
        ) -> Result<Vec<String>, Status> {
            self.requested.borrow_mut().push(attribute_id.to_string());
            Ok(vec!["7".into()])
        }
    }

    #[test]
    fn test_environment_never_consults_context() {
        let ctx = UntouchableContext { calls: Cell::new(0) };
        let id = resolve_entity_id(DesignatorKind::Environment, &ctx, None, None).unwrap();
        assert_eq!(id, ENVIRONMENT_ENTITY_ID);
        assert_eq!(ctx.calls.get(), 0);
    }

    #[test]
    fn test_single_subject_identifier() {
        let ctx = StaticContext::new().with_subject("17");
        let id = resolve_entity_id(DesignatorKind::Subject, &ctx, None, None).unwrap();
        assert_eq!(id, "17");
    }

    #[test]
    fn test_missing_subject_identifier() {
        let ctx = StaticContext::new().with_resource("3");
        let err = resolve_entity_id(DesignatorKind::Subject, &ctx, None, None).unwrap_err();
        assert!(matches!(err, AttributeError::MissingIdentifier(DesignatorKind::Subject)));
    }

    #[test]
    fn test_ambiguous_resource_identifier() {
        let ctx = StaticContext::new().with_resource("3").with_resource("4");
        let err = resolve_entity_id(DesignatorKind::Resource, &ctx, None, None).unwrap_err();
        assert!(matches!(err, AttributeError::AmbiguousIdentifier(DesignatorKind::Resource)));
    }

    #[test]
    fn test_indeterminate_context_is_passed_through() {
        let status = Status::processing_error("attribute finder crashed");
        let ctx = StaticContext::indeterminate(status.clone());
        let err = resolve_entity_id(DesignatorKind::Resource, &ctx, None, None).unwrap_err();
        match err {
            AttributeError::Indeterminate(s) => assert_eq!(s, status),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_requests_kind_specific_identity_attribute() {
        let ctx = RecordingContext {
            requested: Default::default(),
        };
        resolve_entity_id(DesignatorKind::Subject, &ctx, None, None).unwrap();
        resolve_entity_id(DesignatorKind::Resource, &ctx, None, None).unwrap();
        assert_eq!(
            *ctx.requested.borrow(),
            vec![SUBJECT_ID_ATTRIBUTE.to_string(), RESOURCE_ID_ATTRIBUTE.to_string()]
        );
    }

    #[test]
    fn test_designator_codes() {
        assert_eq!(DesignatorKind::try_from(0).unwrap(), DesignatorKind::Subject);
        assert_eq!(DesignatorKind::try_from(3).unwrap(), DesignatorKind::Environment);
        assert!(matches!(
            DesignatorKind::try_from(ACTION_TARGET),
            Err(AttributeError::UnsupportedDesignatorKind(_))
        ));
        assert!(DesignatorKind::try_from(42).is_err());
        for kind in DesignatorKind::ALL {
            assert_eq!(DesignatorKind::try_from(kind.code()).unwrap(), kind);
        }
    }

    #[test]
    fn test_designator_names() {
        assert_eq!("Subject".parse::<DesignatorKind>().unwrap(), DesignatorKind::Subject);
        assert_eq!("object".parse::<DesignatorKind>().unwrap(), DesignatorKind::Resource);
        assert!("action".parse::<DesignatorKind>().is_err());
    }
}
