mod router;
mod state;

pub use router::{build_router, cors_layer, LIVE_PATH, READY_PATH};
pub use state::{ServeHealth, ServeHealthSnapshot, ServeState};
