//! Shared primitives: accounts, resource addressing, query parameters,
//! document identifiers and document flattening.

pub mod account;
pub mod flatten;
pub mod id;
pub mod oid;
pub mod query;
pub mod resource;

use thiserror::Error;

pub use account::{effective_roles, Account, UNAUTHENTICATED_ROLE};
pub use flatten::{flatten, get_path, FlatDocument};
pub use id::{id_to_path_segment, DocIdType};
pub use oid::ObjectId;
pub use query::QueryParams;
pub use resource::{Method, ResourcePath, ResourceType};

/// Parse failures for the primitives in this crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),
    #[error("invalid id_type: {0}")]
    InvalidIdType(String),
    #[error("id '{id}' is not valid for id type {id_type}")]
    IdNotValidForType { id: String, id_type: String },
    #[error("invalid resource path: {0}")]
    InvalidPath(String),
}
