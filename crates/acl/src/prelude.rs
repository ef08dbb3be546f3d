pub use crate::authorizer::{AclAuthorizer, Authorizer, AuthzRequest, Decision};
pub use crate::errors::AclError;
pub use crate::interpolate::{
    interpolate_document, interpolate_predicate, BindingContext, RequestSummary,
};
pub use crate::loader::{compile_acl_file, load_acl_file, parse_acl_yaml, reload_into};
pub use crate::model::{AclFile, AclRule, Effect, PermissionSpec};
pub use crate::predicate::{
    CustomPredicate, DocumentView, Operand, PathMatcher, Predicate, PredicateParseError,
    PredicateParser, RequestView,
};
pub use crate::registry::{AclRegistry, AclStore};
