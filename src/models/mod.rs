//! Data model types shared across the service.

pub mod approval;
pub mod status;
pub mod webhook;

pub use approval::ApprovalSnapshot;
pub use status::MergeStatus;
pub use webhook::WebhookEvent;
