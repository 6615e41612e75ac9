//! WhatsApp messaging.
//!
//! No provider is wired up yet; [`LogMessenger`] records the message and
//! reports success.

use async_trait::async_trait;

use super::{IntegrationError, Messenger};

#[derive(Debug, Default)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send_whatsapp(&self, phone: &str, text: &str) -> Result<(), IntegrationError> {
        if phone.trim().is_empty() {
            return Err(IntegrationError::Rejected("recipient phone is empty".into()));
        }
        tracing::info!(phone = %mask_phone(phone), chars = text.len(), "WhatsApp message queued");
        Ok(())
    }
}

/// Keep only the last four digits for logs.
fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("***{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+91 98000 01234"), "***1234");
        assert_eq!(mask_phone("12"), "***12");
    }

    #[tokio::test]
    async fn test_empty_phone_rejected() {
        let messenger = LogMessenger;
        assert!(messenger.send_whatsapp(" ", "hi").await.is_err());
        assert!(messenger.send_whatsapp("+919800001234", "hi").await.is_ok());
    }
}
