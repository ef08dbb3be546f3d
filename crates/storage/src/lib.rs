pub mod errors;
pub mod filter;
pub mod memory;
pub mod model;
pub mod native;
pub mod observe;
pub mod prelude;
pub mod spi;
pub mod update;

pub use errors::StorageError;
pub use memory::MemoryStore;
pub use model::*;
pub use native::NativeError;
pub use spi::DocumentStore;
