//! Outbound notifications to messenger chats.
//!
//! [`Dispatcher`] owns the delivery rules: per-user preferences,
//! quiet hours, a shared [`RateLimiter`] and retry categories taken from
//! [`TransportError`](crate::error::TransportError). Message texts live in
//! [`messages`].

pub mod category;
pub mod dispatcher;
pub mod messages;
pub mod preferences;
pub mod rate_limit;
pub mod transport;

pub use category::NotificationCategory;
pub use dispatcher::{
    DispatchError, DispatchOutcome, Dispatcher, DueReport, NotificationRequest,
    NotificationRetryPolicy,
};
pub use preferences::{CategoryPreference, Delivery, DropReason, NotificationPreferences, QuietHours};
pub use rate_limit::RateLimiter;
pub use transport::{BotIdentity, RecordingTransport, TelegramTransport, Transport};
