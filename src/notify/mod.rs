pub mod format;
pub mod telegram;

pub use format::{format_report, format_signal};
pub use telegram::TelegramNotifier;

use async_trait::async_trait;

use crate::error::NotifyError;
use crate::models::{CandleSeries, Signal};

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub text: String,
    /// PNG bytes sent alongside the text.
    pub image: Option<Vec<u8>>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: Option<Vec<u8>>) -> Self {
        self.image = image;
        self
    }
}

/// Delivery to the alert channel. Implementations enforce their own timeout.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, msg: &OutgoingMessage) -> Result<(), NotifyError>;
}

/// Chart rendering lives outside this crate; the bot only asks for bytes.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, signal: &Signal, candles: &CandleSeries) -> Option<Vec<u8>>;
}
