/// Inline query, chosen result and command handlers
pub mod handlers;
/// Resilient wrappers around Telegram API operations
pub mod resilient;
/// Per-user download throttling
pub mod throttle;
