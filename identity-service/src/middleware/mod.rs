pub mod auth;
pub mod client_ip;
pub mod rate_limit;

pub use auth::{auth_middleware, role_gate_middleware, CurrentUser, RoleGate};
pub use client_ip::ClientIp;
pub use rate_limit::{rate_limit_middleware, RateLimitGate};
