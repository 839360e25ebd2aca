//! Cross-cutting services: audit trail, APM export, email delivery.

pub mod apm;
pub mod audit;
pub mod email;

pub use apm::ApmService;
pub use audit::AuditService;
pub use email::EmailService;
