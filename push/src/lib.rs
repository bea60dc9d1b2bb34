//! Web-push plumbing for the loyalty client: the foreground subscription
//! manager and the background notification worker.

pub mod api;
pub mod error;
pub mod manager;
pub mod message;
pub mod payload;
pub mod platform;
pub mod worker;

pub use error::PushError;
pub use manager::PushSubscriptionManager;
pub use message::WorkerMessage;
pub use payload::{NotificationData, NotificationPayload};
pub use worker::{NotificationWorker, WorkerEvent, WorkerHost};
