//! Recoverable dispatch faults and their mapping to reply statuses.
use std::any::Any;

use crate::{
    identity::Identity, request::RequestDescriptor, status::DispatchStatus, wire::WireError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFailedKind {
    ObjectNotExist,
    FacetNotExist,
    OperationNotExist,
}

impl From<RequestFailedKind> for DispatchStatus {
    fn from(kind: RequestFailedKind) -> Self {
        match kind {
            RequestFailedKind::ObjectNotExist => DispatchStatus::ObjectNotExist,
            RequestFailedKind::FacetNotExist => DispatchStatus::FacetNotExist,
            RequestFailedKind::OperationNotExist => DispatchStatus::OperationNotExist,
        }
    }
}

/// A routing failure. Fields left empty are taken from the request being dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailed {
    pub kind: RequestFailedKind,
    pub id: Option<Identity>,
    pub facet: Option<String>,
    pub operation: Option<String>,
}

impl RequestFailed {
    pub fn new(kind: RequestFailedKind) -> Self {
        RequestFailed {
            kind,
            id: None,
            facet: None,
            operation: None,
        }
    }
}

impl std::fmt::Display for RequestFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", DispatchStatus::from(self.kind))?;
        if let Some(id) = &self.id {
            write!(f, ": identity `{id}`")?;
        }
        if let Some(facet) = self.facet.as_deref().filter(|f| !f.is_empty()) {
            write!(f, " facet `{facet}`")?;
        }
        if let Some(operation) = &self.operation {
            write!(f, " operation `{operation}`")?;
        }
        Ok(())
    }
}

/// Fault raised while resolving or running a servant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchFault {
    #[error("{0}")]
    RequestFailed(RequestFailed),
    /// Infrastructure failure inside the server, decode errors included.
    #[error("local exception: {0}")]
    Local(String),
    /// Application error that the operation does not declare.
    #[error("user exception: {0}")]
    User(String),
    #[error("unknown exception: {0}")]
    Unknown(String),
}

impl DispatchFault {
    pub fn object_not_exist() -> Self {
        DispatchFault::RequestFailed(RequestFailed::new(RequestFailedKind::ObjectNotExist))
    }

    pub fn facet_not_exist() -> Self {
        DispatchFault::RequestFailed(RequestFailed::new(RequestFailedKind::FacetNotExist))
    }

    pub fn operation_not_exist() -> Self {
        DispatchFault::RequestFailed(RequestFailed::new(RequestFailedKind::OperationNotExist))
    }

    pub fn local(diag: impl std::fmt::Display) -> Self {
        DispatchFault::Local(diag.to_string())
    }

    pub fn user(diag: impl std::fmt::Display) -> Self {
        DispatchFault::User(diag.to_string())
    }

    pub fn unknown(diag: impl std::fmt::Display) -> Self {
        DispatchFault::Unknown(diag.to_string())
    }

    /// Turn a caught panic payload into an unclassified fault.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let diag = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "servant panicked".to_owned()
        };
        DispatchFault::Unknown(diag)
    }
}

impl From<WireError> for DispatchFault {
    fn from(e: WireError) -> Self {
        DispatchFault::Local(e.to_string())
    }
}

impl From<RequestFailed> for DispatchFault {
    fn from(e: RequestFailed) -> Self {
        DispatchFault::RequestFailed(e)
    }
}

/// What follows the status byte in a fault reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultBody {
    Routing {
        id: Identity,
        facet: String,
        operation: String,
    },
    Diagnostic(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub status: DispatchStatus,
    pub body: FaultBody,
}

/// Map a fault to its reply status and body, back-filling routing fields from `current`.
pub fn classify(fault: DispatchFault, current: &RequestDescriptor) -> Classified {
    match fault {
        DispatchFault::RequestFailed(rf) => Classified {
            status: rf.kind.into(),
            body: FaultBody::Routing {
                id: rf.id.unwrap_or_else(|| current.id.clone()),
                facet: rf.facet.unwrap_or_else(|| current.facet.clone()),
                operation: rf
                    .operation
                    .filter(|op| !op.is_empty())
                    .unwrap_or_else(|| current.operation.clone()),
            },
        },
        DispatchFault::Local(diag) => Classified {
            status: DispatchStatus::UnknownLocalException,
            body: FaultBody::Diagnostic(diag),
        },
        DispatchFault::User(diag) => Classified {
            status: DispatchStatus::UnknownUserException,
            body: FaultBody::Diagnostic(diag),
        },
        DispatchFault::Unknown(diag) => Classified {
            status: DispatchStatus::UnknownException,
            body: FaultBody::Diagnostic(diag),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current() -> RequestDescriptor {
        RequestDescriptor::new(Identity::new("a", "c"), "op").with_facet("f")
    }

    #[test]
    fn test_routing_fault_backfills_missing_fields() {
        let classified = classify(DispatchFault::operation_not_exist(), &current());
        assert_eq!(classified.status, DispatchStatus::OperationNotExist);
        assert_eq!(
            classified.body,
            FaultBody::Routing {
                id: Identity::new("a", "c"),
                facet: "f".to_owned(),
                operation: "op".to_owned(),
            }
        );
    }

    #[test]
    fn test_routing_fault_keeps_explicit_fields() {
        let mut rf = RequestFailed::new(RequestFailedKind::ObjectNotExist);
        rf.id = Some(Identity::named("other"));
        let classified = classify(rf.into(), &current());
        match classified.body {
            FaultBody::Routing { id, operation, .. } => {
                assert_eq!(id, Identity::named("other"));
                assert_eq!(operation, "op");
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_empty_operation_is_backfilled() {
        let mut rf = RequestFailed::new(RequestFailedKind::OperationNotExist);
        rf.operation = Some(String::new());
        rf.facet = Some(String::new());
        match classify(rf.into(), &current()).body {
            FaultBody::Routing {
                facet, operation, ..
            } => {
                assert_eq!(operation, "op");
                // an explicit empty facet names the default facet and is kept
                assert_eq!(facet, "");
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_unknown_classes() {
        let cases = [
            (DispatchFault::local("db"), DispatchStatus::UnknownLocalException),
            (DispatchFault::user("bad"), DispatchStatus::UnknownUserException),
            (DispatchFault::unknown("x"), DispatchStatus::UnknownException),
        ];
        for (fault, status) in cases {
            let classified = classify(fault, &current());
            assert_eq!(classified.status, status);
            assert!(matches!(classified.body, FaultBody::Diagnostic(_)));
        }
    }

    #[test]
    fn test_wire_error_is_local() {
        let fault: DispatchFault = WireError::NoEncapsulation.into();
        assert_eq!(fault, DispatchFault::Local("no encapsulation is open".to_owned()));
    }

    #[test]
    fn test_panic_payloads() {
        assert_eq!(
            DispatchFault::from_panic(Box::new("boom")),
            DispatchFault::Unknown("boom".to_owned())
        );
        assert_eq!(
            DispatchFault::from_panic(Box::new(String::from("bang"))),
            DispatchFault::Unknown("bang".to_owned())
        );
        assert_eq!(
            DispatchFault::from_panic(Box::new(3u8)),
            DispatchFault::Unknown("servant panicked".to_owned())
        );
    }
}
