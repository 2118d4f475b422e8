//! Procedure routing: (service, procedure) to handler spec.

use std::collections::HashMap;
use std::fmt;

use crate::errors::Status;
use crate::handler::HandlerSpec;
use crate::request::Request;

/// One registration triple handed to [`MapRouter::register`].
pub struct Procedure {
    /// Service scope; `None` falls back to the router's default service.
    pub service: Option<String>,
    /// Procedure name.
    pub name: String,
    /// The handler to bind.
    pub spec: HandlerSpec,
}

impl Procedure {
    /// A procedure under the router's default service.
    pub fn unary(name: impl Into<String>, spec: HandlerSpec) -> Self {
        Self {
            service: None,
            name: name.into(),
            spec,
        }
    }

    /// A procedure under an explicit service.
    pub fn for_service(
        service: impl Into<String>,
        name: impl Into<String>,
        spec: HandlerSpec,
    ) -> Self {
        Self {
            service: Some(service.into()),
            name: name.into(),
            spec,
        }
    }
}

/// Registration failure.
#[derive(Debug)]
pub enum RegisterError {
    /// The (service, procedure) pair is already bound.
    AlreadyRegistered { service: String, procedure: String },
    /// A procedure was registered with an empty name.
    EmptyProcedureName,
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::AlreadyRegistered { service, procedure } => write!(
                f,
                "procedure {procedure:?} of service {service:?} is already registered"
            ),
            RegisterError::EmptyProcedureName => f.write_str("procedure name must not be empty"),
        }
    }
}

impl std::error::Error for RegisterError {}

/// Chooses a handler for an inbound request.
///
/// `choose` must be safe for concurrent invocation from many tasks; the
/// reference implementation is an immutable table shared behind `Arc`, so
/// reads take no locks.
pub trait Router: Send + Sync {
    /// Look up the handler bound to (request.service, request.procedure).
    ///
    /// Misses report [`crate::Code::Unimplemented`] naming the service and
    /// procedure.
    fn choose(&self, request: &Request) -> Result<HandlerSpec, Status>;

    /// Enumerate registrations, sorted by (service, procedure).
    fn procedures(&self) -> Vec<(String, String)>;
}

/// Hash-table router, populated at startup and read-only afterwards.
///
/// Registration takes `&mut self`; sharing the router with an inbound
/// (behind `Arc`) freezes it, so the populate-then-freeze discipline is
/// enforced by the borrow rules rather than a runtime flag.
pub struct MapRouter {
    default_service: String,
    table: HashMap<(String, String), HandlerSpec>,
}

impl MapRouter {
    /// Create a router whose procedures default to `default_service`.
    pub fn new(default_service: impl Into<String>) -> Self {
        Self {
            default_service: default_service.into(),
            table: HashMap::new(),
        }
    }

    /// Insert registrations, failing on duplicates and empty names.
    ///
    /// On error the router keeps the registrations that preceded the
    /// offending entry.
    pub fn register(
        &mut self,
        procedures: impl IntoIterator<Item = Procedure>,
    ) -> Result<(), RegisterError> {
        for procedure in procedures {
            if procedure.name.is_empty() {
                return Err(RegisterError::EmptyProcedureName);
            }
            let service = procedure
                .service
                .unwrap_or_else(|| self.default_service.clone());
            let key = (service, procedure.name);
            if self.table.contains_key(&key) {
                return Err(RegisterError::AlreadyRegistered {
                    service: key.0,
                    procedure: key.1,
                });
            }
            self.table.insert(key, procedure.spec);
        }
        Ok(())
    }
}

impl Router for MapRouter {
    fn choose(&self, request: &Request) -> Result<HandlerSpec, Status> {
        let key = (request.service.clone(), request.procedure.clone());
        match self.table.get(&key) {
            Some(spec) => Ok(spec.clone()),
            None => Err(Status::unimplemented(format!(
                "unrecognized procedure {:?} for service {:?}",
                request.procedure, request.service
            ))),
        }
    }

    fn procedures(&self) -> Vec<(String, String)> {
        let mut names: Vec<_> = self.table.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::context::CallContext;
    use crate::handler::{BoxFuture, ResponseWriter, UnaryHandler};
    use crate::headers::Headers;
    use crate::request::{encodings, Encoding};

    struct NoopHandler;

    impl UnaryHandler for NoopHandler {
        fn handle<'a>(
            &'a self,
            _ctx: &'a CallContext,
            _request: Request,
            _response: &'a mut dyn ResponseWriter,
        ) -> BoxFuture<'a, Result<(), Status>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn request(service: &str, procedure: &str) -> Request {
        Request {
            caller: "caller".to_owned(),
            service: service.to_owned(),
            transport: "http",
            encoding: Encoding::from(encodings::RAW),
            procedure: procedure.to_owned(),
            headers: Headers::new(),
            shard_key: None,
            routing_key: None,
            routing_delegate: None,
            body: Body::empty(),
        }
    }

    #[test]
    fn choose_finds_registered_procedures() {
        let mut router = MapRouter::new("svc");
        router
            .register([
                Procedure::unary("echo", HandlerSpec::unary(NoopHandler)),
                Procedure::for_service("other", "ping", HandlerSpec::unary(NoopHandler)),
            ])
            .unwrap();

        assert!(router.choose(&request("svc", "echo")).is_ok());
        assert!(router.choose(&request("other", "ping")).is_ok());
    }

    #[test]
    fn choose_miss_is_unimplemented_and_names_the_target() {
        let router = MapRouter::new("svc");
        let status = router.choose(&request("svc", "nope")).unwrap_err();
        assert_eq!(status.code(), crate::Code::Unimplemented);
        assert!(status.message().contains("\"nope\""));
        assert!(status.message().contains("\"svc\""));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut router = MapRouter::new("svc");
        router
            .register([Procedure::unary("echo", HandlerSpec::unary(NoopHandler))])
            .unwrap();
        let err = router
            .register([Procedure::unary("echo", HandlerSpec::unary(NoopHandler))])
            .unwrap_err();
        assert!(matches!(err, RegisterError::AlreadyRegistered { .. }));
    }

    #[test]
    fn empty_procedure_name_is_rejected() {
        let mut router = MapRouter::new("svc");
        let err = router
            .register([Procedure::unary("", HandlerSpec::unary(NoopHandler))])
            .unwrap_err();
        assert!(matches!(err, RegisterError::EmptyProcedureName));
    }

    #[test]
    fn procedures_enumerates_sorted() {
        let mut router = MapRouter::new("svc");
        router
            .register([
                Procedure::unary("zeta", HandlerSpec::unary(NoopHandler)),
                Procedure::unary("alpha", HandlerSpec::unary(NoopHandler)),
                Procedure::for_service("aaa", "proc", HandlerSpec::unary(NoopHandler)),
            ])
            .unwrap();
        assert_eq!(
            router.procedures(),
            vec![
                ("aaa".to_owned(), "proc".to_owned()),
                ("svc".to_owned(), "alpha".to_owned()),
                ("svc".to_owned(), "zeta".to_owned()),
            ]
        );
    }
}
