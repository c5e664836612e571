use thiserror::Error;

use crate::eligibility::store::StoreError;
use crate::flows::{CheckpointError, SessionError, SessionTransitionError};
use crate::rules::EvaluationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    SessionTransition(#[from] SessionTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<EvaluationError> for ApplicationError {
    fn from(value: EvaluationError) -> Self {
        Self::Domain(DomainError::Evaluation(value))
    }
}

impl From<SessionError> for ApplicationError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::Transition(error) => Self::Domain(DomainError::SessionTransition(error)),
            SessionError::Checkpoint(CheckpointError::NotFound(id)) => {
                Self::NotFound { entity: "checkpoint", id: id.to_string() }
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The information provided could not be processed. Check your answers and try again."
            }
            Self::NotFound { .. } => {
                "Some of the information needed for this check is missing. Please review your profile."
            }
            Self::ServiceUnavailable { .. } => {
                "Eligibility could not be checked right now. Please try again shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            error @ ApplicationError::NotFound { .. } => Self::NotFound {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use crate::eligibility::store::StoreError;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::flows::{
        CheckpointError, SessionError, SessionEvent, SessionState, SessionTransitionError,
    };
    use crate::rules::EvaluationError;

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvariantViolation(
            "rule has no logic".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn evaluation_errors_lift_into_domain_errors() {
        let error = ApplicationError::from(EvaluationError::UnknownOperator("frobnicate".to_owned()));
        assert!(matches!(error, ApplicationError::Domain(DomainError::Evaluation(_))));

        assert_eq!(error.to_string(), "unknown operator `frobnicate`");
        assert_eq!(
            error.into_interface("req-2").user_message(),
            "The information provided could not be processed. Check your answers and try again."
        );
    }

    #[test]
    fn session_errors_split_into_domain_and_not_found() {
        let rejected = ApplicationError::from(SessionError::Transition(
            SessionTransitionError::InvalidTransition {
                state: SessionState::Completed,
                event: SessionEvent::Resume,
            },
        ));
        assert!(matches!(
            rejected,
            ApplicationError::Domain(DomainError::SessionTransition(_))
        ));
        assert!(matches!(rejected.into_interface("req-6"), InterfaceError::BadRequest { .. }));

        let id = Uuid::nil();
        let missing = ApplicationError::from(SessionError::Checkpoint(CheckpointError::NotFound(id)));
        assert_eq!(
            missing,
            ApplicationError::NotFound { entity: "checkpoint", id: id.to_string() }
        );
    }

    #[test]
    fn not_found_keeps_entity_and_id() {
        let interface = ApplicationError::NotFound { entity: "profile", id: "p-9".to_owned() }
            .into_interface("req-3");

        assert!(matches!(
            interface,
            InterfaceError::NotFound { ref message, .. } if message == "profile `p-9` was not found"
        ));
    }

    #[test]
    fn store_error_maps_to_service_unavailable() {
        let interface = ApplicationError::from(StoreError::Unavailable("lock poisoned".to_owned()))
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "Eligibility could not be checked right now. Please try again shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("max_depth out of range".to_owned()).into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
