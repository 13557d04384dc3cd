//! Service registry: registration, lookup, and method resolution.
//!
//! Registration is a startup-time contract check: each method is supplied
//! as an explicit function value whose signature *is* the callable-method
//! shape (one argument value, one mutable reply destination, one
//! error-or-nil return), plus argument/reply type tags for diagnostics.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use hostlink_core::envelope::{MalformedIdentifier, MethodId};

use crate::dispatch::CallError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error returned synchronously to the registering caller.
///
/// Registration happens at startup, so fail-fast is appropriate; a failed
/// registration leaves the registry untouched.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// No service name was derived or supplied, or a method name is empty.
    #[error("empty service or method name for receiver {receiver}")]
    EmptyName {
        /// Type identity of the offending receiver.
        receiver: &'static str,
    },
    /// The derived name does not satisfy the exported naming convention.
    /// Forcing an explicit name via [`ServiceBuilder::named`] bypasses this.
    #[error("service name {name:?} is not exported (first character must be uppercase)")]
    NotExported {
        /// The rejected name.
        name: String,
    },
    /// A service or method name contains a dot. Dots are reserved for the
    /// identifier separator; allowing them would make the last-dot split of
    /// `"Service.Method"` ambiguous.
    #[error("name {name:?} must not contain '.'")]
    DottedName {
        /// The rejected name.
        name: String,
    },
    /// A service with this name is already registered. The first
    /// registration is retained.
    #[error("service already defined: {name}")]
    DuplicateService {
        /// The duplicated name.
        name: String,
    },
    /// The builder carried no methods; an empty service is unroutable.
    #[error("service {name} has no methods of suitable shape")]
    NoSuitableMethods {
        /// The service that would have been registered.
        name: String,
    },
}

/// Error resolving a `"Service.Method"` identifier.
///
/// The three outcomes are distinct for logging and diagnostics; none is
/// fatal to the process -- each aborts handling of one envelope only.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The identifier has no dot, or an empty service/method half.
    #[error(transparent)]
    MalformedIdentifier(#[from] MalformedIdentifier),
    /// No service is registered under the identifier's service name.
    #[error("can't find service for {id:?}")]
    ServiceNotFound {
        /// The identifier as received.
        id: String,
    },
    /// The service exists but has no method under the identifier's method name.
    #[error("can't find method for {id:?}")]
    MethodNotFound {
        /// The identifier as received.
        id: String,
    },
}

// ---------------------------------------------------------------------------
// MethodEntry
// ---------------------------------------------------------------------------

/// Outcome of running one handler body: the populated reply value (when the
/// arguments decoded) and the error indicator. Both are retained so the
/// reply-sending collaborator can take them once that path exists.
#[derive(Debug)]
pub struct InvokeOutcome {
    /// Serialized reply destination, absent when the arguments never decoded.
    pub reply: Option<rmpv::Value>,
    /// Error indicator from argument decoding, the handler, or reply encoding.
    pub error: Option<CallError>,
}

type InvokeFn = Box<dyn Fn(Vec<rmpv::Value>) -> InvokeOutcome + Send + Sync>;

/// One registered method: a type-erased invoke closure plus diagnostic state.
///
/// Immutable after registration except for the call counter.
pub struct MethodEntry {
    invoke: InvokeFn,
    arg_type: &'static str,
    reply_type: &'static str,
    calls: AtomicU64,
}

impl MethodEntry {
    /// Type tag of the handler's argument value.
    #[must_use]
    pub fn arg_type(&self) -> &'static str {
        self.arg_type
    }

    /// Type tag of the handler's reply destination.
    #[must_use]
    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }

    /// Number of dispatches so far. Diagnostic only; never used for routing
    /// or to serialize calls.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn run(&self, args: Vec<rmpv::Value>) -> InvokeOutcome {
        (self.invoke)(args)
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("arg_type", &self.arg_type)
            .field("reply_type", &self.reply_type)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ServiceEntry
// ---------------------------------------------------------------------------

/// One registered service: a named group of methods backed by one receiver.
///
/// Immutable after insertion into the registry, so method-table lookups need
/// no lock of their own.
#[derive(Debug)]
pub struct ServiceEntry {
    name: String,
    receiver_type: &'static str,
    methods: HashMap<String, Arc<MethodEntry>>,
}

impl ServiceEntry {
    /// The service name clients address.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type identity of the receiver backing this service.
    #[must_use]
    pub fn receiver_type(&self) -> &'static str {
        self.receiver_type
    }

    /// Looks up a method by name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<Arc<MethodEntry>> {
        self.methods.get(name).cloned()
    }

    /// Names of all registered methods, in no particular order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// ServiceBuilder
// ---------------------------------------------------------------------------

/// Collects the methods of one receiver before registration.
///
/// The handler shape is fixed by the `method` signature:
/// `Fn(&S, Args, &mut Reply) -> anyhow::Result<()>` -- positional arguments
/// decode into `Args`, the reply destination is a fresh `Reply::default()`
/// per call, and the return value is the error-or-nil indicator.
pub struct ServiceBuilder<S> {
    receiver: Arc<S>,
    name: String,
    explicit_name: bool,
    methods: HashMap<String, Arc<MethodEntry>>,
}

impl<S: Send + Sync + 'static> ServiceBuilder<S> {
    /// Starts a builder with the service name derived from the receiver's
    /// type name (last path segment).
    #[must_use]
    pub fn new(receiver: S) -> Self {
        let full = std::any::type_name::<S>();
        let name = full.rsplit("::").next().unwrap_or(full).to_string();
        Self {
            receiver: Arc::new(receiver),
            name,
            explicit_name: false,
            methods: HashMap::new(),
        }
    }

    /// Starts a builder with an explicitly forced service name, bypassing
    /// the exported naming convention (but not the other name checks).
    #[must_use]
    pub fn named(receiver: S, name: impl Into<String>) -> Self {
        Self {
            receiver: Arc::new(receiver),
            name: name.into(),
            explicit_name: true,
            methods: HashMap::new(),
        }
    }

    /// Adds one method. Registering the same name twice replaces the
    /// earlier entry.
    #[must_use]
    pub fn method<Args, Reply, F>(mut self, name: &str, handler: F) -> Self
    where
        Args: DeserializeOwned + Send + 'static,
        Reply: Serialize + Default + Send + 'static,
        F: Fn(&S, Args, &mut Reply) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let receiver = Arc::clone(&self.receiver);
        let invoke: InvokeFn = Box::new(move |args| {
            let decoded: Args = match rmpv::ext::from_value(rmpv::Value::Array(args)) {
                Ok(value) => value,
                Err(err) => {
                    return InvokeOutcome {
                        reply: None,
                        error: Some(CallError::ArgumentMismatch(err.to_string())),
                    }
                }
            };
            // Fresh zero-valued reply destination for every call; never
            // shared between concurrent invocations.
            let mut reply = Reply::default();
            let result = handler(&receiver, decoded, &mut reply);
            let (reply_value, encode_error) = match rmpv::ext::to_value(&reply) {
                Ok(value) => (Some(value), None),
                Err(err) => (None, Some(CallError::ReplyEncode(err.to_string()))),
            };
            let error = match result {
                Ok(()) => encode_error,
                Err(err) => Some(CallError::Handler(err.to_string())),
            };
            InvokeOutcome {
                reply: reply_value,
                error,
            }
        });
        self.methods.insert(
            name.to_string(),
            Arc::new(MethodEntry {
                invoke,
                arg_type: std::any::type_name::<Args>(),
                reply_type: std::any::type_name::<Reply>(),
                calls: AtomicU64::new(0),
            }),
        );
        self
    }

    fn into_entry(self) -> Result<ServiceEntry, RegistrationError> {
        let receiver_type = std::any::type_name::<S>();
        if self.name.is_empty() {
            return Err(RegistrationError::EmptyName {
                receiver: receiver_type,
            });
        }
        if !self.explicit_name && !is_exported(&self.name) {
            return Err(RegistrationError::NotExported { name: self.name });
        }
        if self.name.contains('.') {
            return Err(RegistrationError::DottedName { name: self.name });
        }
        for method_name in self.methods.keys() {
            if method_name.is_empty() {
                return Err(RegistrationError::EmptyName {
                    receiver: receiver_type,
                });
            }
            if method_name.contains('.') {
                return Err(RegistrationError::DottedName {
                    name: method_name.clone(),
                });
            }
        }
        if self.methods.is_empty() {
            return Err(RegistrationError::NoSuitableMethods { name: self.name });
        }
        Ok(ServiceEntry {
            name: self.name,
            receiver_type,
            methods: self.methods,
        })
    }
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Mapping from service name to [`ServiceEntry`].
///
/// Read-mostly: lookups take the shared lock, registration takes the
/// exclusive lock and is expected at startup, not under load. Constructed
/// explicitly and threaded through initialization; there is no process-wide
/// singleton.
#[derive(Debug, Default)]
pub struct Registry {
    services: RwLock<HashMap<String, Arc<ServiceEntry>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the built service and inserts it atomically.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistrationError`] for an empty, non-exported, or dotted
    /// name, an empty method table, or a name already present. The registry
    /// is unchanged on error.
    pub fn register<S: Send + Sync + 'static>(
        &self,
        builder: ServiceBuilder<S>,
    ) -> Result<(), RegistrationError> {
        let entry = builder.into_entry()?;
        let mut services = self.services.write();
        if services.contains_key(entry.name()) {
            return Err(RegistrationError::DuplicateService {
                name: entry.name().to_string(),
            });
        }
        services.insert(entry.name().to_string(), Arc::new(entry));
        Ok(())
    }

    /// Resolves a `"Service.Method"` identifier to its registered entries.
    ///
    /// The identifier is split on its last dot; the service lookup takes the
    /// shared lock, the method lookup needs none (the method table is
    /// immutable after registration).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::MalformedIdentifier`], `ServiceNotFound`, or
    /// `MethodNotFound`; the three are distinguishable for diagnostics.
    pub fn resolve(&self, id: &str) -> Result<(Arc<ServiceEntry>, Arc<MethodEntry>), ResolveError> {
        let method_id = MethodId::parse(id)?;
        let service = {
            let services = self.services.read();
            services.get(method_id.service).cloned()
        }
        .ok_or_else(|| ResolveError::ServiceNotFound { id: id.to_string() })?;
        let method = service
            .method(method_id.method)
            .ok_or_else(|| ResolveError::MethodNotFound { id: id.to_string() })?;
        Ok((service, method))
    }

    /// Looks up a service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<Arc<ServiceEntry>> {
        self.services.read().get(name).cloned()
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Whether no service is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Math;

    fn math_builder() -> ServiceBuilder<Math> {
        ServiceBuilder::new(Math).method("Add", |_math, args: Vec<i64>, reply: &mut i64| {
            *reply = args.iter().sum();
            Ok(())
        })
    }

    #[test]
    fn resolve_before_registration_is_service_not_found() {
        let registry = Registry::new();
        assert!(matches!(
            registry.resolve("Foo.Bar"),
            Err(ResolveError::ServiceNotFound { .. })
        ));
    }

    #[test]
    fn resolve_after_registration_succeeds() {
        let registry = Registry::new();
        registry.register(math_builder()).unwrap();

        let (service, method) = registry.resolve("Math.Add").unwrap();
        assert_eq!(service.name(), "Math");
        assert!(service.receiver_type().contains("Math"));
        assert_eq!(service.method_names().collect::<Vec<_>>(), vec!["Add"]);
        assert_eq!(method.calls(), 0);
        assert!(method.arg_type().contains("Vec<i64>"));
        assert!(method.reply_type().contains("i64"));
    }

    #[test]
    fn resolve_unknown_method_is_method_not_found() {
        let registry = Registry::new();
        registry.register(math_builder()).unwrap();
        assert!(matches!(
            registry.resolve("Math.Sub"),
            Err(ResolveError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn resolve_without_dot_is_malformed() {
        let registry = Registry::new();
        assert!(matches!(
            registry.resolve("NoDotHere"),
            Err(ResolveError::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn duplicate_registration_retains_first_entry() {
        let registry = Registry::new();
        registry.register(math_builder()).unwrap();

        let second = ServiceBuilder::new(Math).method(
            "Sub",
            |_math, args: Vec<i64>, reply: &mut i64| {
                *reply = args.iter().fold(0, |acc, n| acc - n);
                Ok(())
            },
        );
        assert!(matches!(
            registry.register(second),
            Err(RegistrationError::DuplicateService { .. })
        ));

        // The first registration still routes; the second never landed.
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("Math.Add").is_ok());
        assert!(registry.resolve("Math.Sub").is_err());
    }

    #[test]
    fn zero_methods_is_no_suitable_methods() {
        let registry = Registry::new();
        let err = registry.register(ServiceBuilder::new(Math)).unwrap_err();
        assert!(matches!(err, RegistrationError::NoSuitableMethods { .. }));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn derived_name_is_last_type_path_segment() {
        let builder = math_builder();
        assert_eq!(builder.name, "Math");
    }

    #[test]
    fn lowercase_derived_name_is_rejected() {
        #[allow(non_camel_case_types)]
        struct lowercase;

        let registry = Registry::new();
        let builder = ServiceBuilder::new(lowercase).method(
            "Noop",
            |_recv, _args: Vec<i64>, _reply: &mut i64| Ok(()),
        );
        assert!(matches!(
            registry.register(builder),
            Err(RegistrationError::NotExported { .. })
        ));
    }

    #[test]
    fn explicit_name_bypasses_exported_check() {
        struct Backing;

        let registry = Registry::new();
        let builder = ServiceBuilder::named(Backing, "leaf").method(
            "Noop",
            |_recv, _args: Vec<i64>, _reply: &mut i64| Ok(()),
        );
        registry.register(builder).unwrap();
        assert!(registry.resolve("leaf.Noop").is_ok());
    }

    #[test]
    fn empty_explicit_name_is_rejected() {
        struct Backing;

        let registry = Registry::new();
        let builder = ServiceBuilder::named(Backing, "").method(
            "Noop",
            |_recv, _args: Vec<i64>, _reply: &mut i64| Ok(()),
        );
        assert!(matches!(
            registry.register(builder),
            Err(RegistrationError::EmptyName { .. })
        ));
    }

    #[test]
    fn dotted_service_name_is_rejected() {
        struct Backing;

        let registry = Registry::new();
        let builder = ServiceBuilder::named(Backing, "Outer.Inner").method(
            "Noop",
            |_recv, _args: Vec<i64>, _reply: &mut i64| Ok(()),
        );
        assert!(matches!(
            registry.register(builder),
            Err(RegistrationError::DottedName { .. })
        ));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn dotted_method_name_is_rejected() {
        let registry = Registry::new();
        let builder = ServiceBuilder::new(Math).method(
            "Add.Extra",
            |_math, _args: Vec<i64>, _reply: &mut i64| Ok(()),
        );
        assert!(matches!(
            registry.register(builder),
            Err(RegistrationError::DottedName { .. })
        ));
    }

    #[test]
    fn invoke_decodes_args_and_populates_reply() {
        let registry = Registry::new();
        registry.register(math_builder()).unwrap();

        let (_, method) = registry.resolve("Math.Add").unwrap();
        let outcome = method.run(vec![rmpv::Value::from(2), rmpv::Value::from(3)]);
        assert_eq!(outcome.reply, Some(rmpv::Value::from(5)));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn invoke_reports_argument_mismatch() {
        let registry = Registry::new();
        registry.register(math_builder()).unwrap();

        let (_, method) = registry.resolve("Math.Add").unwrap();
        let outcome = method.run(vec![rmpv::Value::String("two".into())]);
        assert!(outcome.reply.is_none());
        assert!(matches!(outcome.error, Some(CallError::ArgumentMismatch(_))));
    }

    #[test]
    fn invoke_retains_reply_alongside_handler_error() {
        struct Flaky;

        let registry = Registry::new();
        let builder = ServiceBuilder::new(Flaky).method(
            "Try",
            |_flaky, _args: Vec<i64>, reply: &mut String| {
                "partial".clone_into(reply);
                Err(anyhow::anyhow!("boom"))
            },
        );
        registry.register(builder).unwrap();

        let (_, method) = registry.resolve("Flaky.Try").unwrap();
        let outcome = method.run(vec![]);
        assert_eq!(outcome.reply, Some(rmpv::Value::String("partial".into())));
        match outcome.error {
            Some(CallError::Handler(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected handler error, got {other:?}"),
        }
    }
}
