//! API response types and pagination utilities

pub mod pagination;
pub mod response;

pub use pagination::{Paginated, PaginationMeta, PaginationParams};
pub use response::{Accepted, Created, DataResponse, Download, NoContent};
