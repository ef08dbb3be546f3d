pub use crate::{
    code::{codes, spec_of, CodeSpec, ErrorCode, REGISTRY},
    kind::ErrorKind,
    labels::labels,
    model::{CauseEntry, ErrorBuilder, ErrorObj},
    render::{reason_phrase, PublicErrorView},
    severity::Severity,
};
