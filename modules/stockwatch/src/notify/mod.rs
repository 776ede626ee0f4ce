pub mod backend;
pub mod dispatcher;
pub mod format;
pub mod log;
pub mod telegram;

pub use backend::NotifyBackend;
pub use dispatcher::{Delivery, Notifier};
pub use log::LogBackend;
pub use telegram::TelegramBackend;
