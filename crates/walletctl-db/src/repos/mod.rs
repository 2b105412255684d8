//! Repository implementations

pub mod app;
pub mod permission;
pub mod request_event;
pub mod spend;

pub use app::AppRepo;
pub use permission::PermissionRepo;
pub use request_event::RequestEventRepo;
pub use spend::SpendRepo;
