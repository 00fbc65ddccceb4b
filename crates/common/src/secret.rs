//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports types from the [`secrecy`] crate. Use these for every value
//! that must never show up in a `Debug` impl or a log line: meeting auth
//! tokens, registry URLs with embedded credentials, callback bearer tokens.
//!
//! `SecretString` zeroizes on drop and redacts its `Debug` output, so a
//! struct that derives `Debug` while holding one gets safe logging for free.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("tok-123");
        assert_eq!(secret.expose_secret(), "tok-123");
    }

    #[test]
    fn test_struct_with_secret_is_safe() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct BotToken {
            connection_id: String,
            token: SecretString,
        }

        let creds = BotToken {
            connection_id: "conn-1".to_string(),
            token: SecretString::from("super-secret"),
        };

        let debug_str = format!("{creds:?}");
        assert!(debug_str.contains("conn-1"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("super-secret"));
    }
}
