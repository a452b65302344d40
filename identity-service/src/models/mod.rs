pub mod audit;
pub mod invite;
pub mod user;

pub use audit::AuditEvent;
pub use invite::{Invite, InviteResponse};
pub use user::{User, UserResponse};
