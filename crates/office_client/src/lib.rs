//! HTTP clients for the services around the presence engine: the office
//! tracker (read and assert a day's state) and the notification webhook.

mod notify;
mod tracker;

pub use notify::WebhookNotifier;
pub use tracker::{OfficeTrackerClient, OfficeTrackerConfig};
