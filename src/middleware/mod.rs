pub mod request_id;

pub use request_id::{request_id, RequestIdLayers, X_REQUEST_ID};
