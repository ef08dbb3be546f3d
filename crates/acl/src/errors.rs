use docgate_errors::prelude::*;
use thiserror::Error;

use crate::predicate::PredicateParseError;

#[derive(Debug, Error)]
#[error("{0:?}")]
pub struct AclError(pub ErrorObj);

impl AclError {
    pub fn into_inner(self) -> ErrorObj {
        self.0
    }
}

pub fn unauthenticated(msg: &str) -> AclError {
    AclError(
        ErrorBuilder::new(codes::AUTH_UNAUTHENTICATED)
            .dev_msg(msg)
            .build(),
    )
}

pub fn forbidden(msg: &str) -> AclError {
    AclError(
        ErrorBuilder::new(codes::AUTH_FORBIDDEN)
            .dev_msg(msg)
            .build(),
    )
}

pub fn invalid_rules(msg: &str) -> AclError {
    AclError(
        ErrorBuilder::new(codes::CONFIG_INVALID)
            .user_msg("ACL configuration is invalid.")
            .dev_msg(msg)
            .build(),
    )
}

impl From<PredicateParseError> for AclError {
    fn from(err: PredicateParseError) -> Self {
        invalid_rules(&err.to_string())
    }
}
