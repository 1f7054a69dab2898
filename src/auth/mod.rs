pub mod claims;
pub mod context;
pub mod middleware;

pub use claims::Claims;
pub use context::AuthContext;
pub use middleware::RequireAuth;
