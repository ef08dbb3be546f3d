#[cfg(feature = "with-axum")]
pub mod axum;
