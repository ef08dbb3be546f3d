//! Role-based authorization for docgate.
//!
//! Rules are compiled from predicate text into [`Predicate`] trees, grouped
//! per role in an immutable [`AclRegistry`] and published through
//! [`AclStore`]. Predicate text may reference request variables
//! (`@user.name`, `@request.body.owner`, `@qparams['x']`), which the
//! [`interpolate`] module resolves per request before evaluation.

pub mod authorizer;
pub mod errors;
pub mod interpolate;
pub mod loader;
pub mod model;
pub mod predicate;
pub mod prelude;
pub mod registry;

pub use authorizer::{AclAuthorizer, Authorizer, AuthzRequest, Decision};
pub use errors::AclError;
pub use interpolate::{BindingContext, RequestSummary};
pub use model::{AclRule, Effect, PermissionSpec};
pub use predicate::{Predicate, PredicateParser};
pub use registry::{AclRegistry, AclStore};
