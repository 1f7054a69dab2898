//! Service layer: the backend client, the local store and what is built on
//! top of them (offline queue, exports, challans).

pub mod backend;
pub mod challan;
pub mod export;
pub mod offline;
pub mod store;

pub use backend::{BackendClient, CallContext};
pub use challan::Challans;
pub use offline::OfflineQueue;
pub use store::LocalStore;
