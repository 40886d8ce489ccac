//! Action tokens carried in inline-button `callback_data`.
//!
//! Format: `"<action>:<order_id>"`, e.g. `approve:42`. The token is the whole
//! protocol between the rendered message and the webhook, so parsing fails
//! closed: anything that is not exactly one known action, one `:` and one
//! positive decimal id is refused.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::types::Action;

/// Reserved delimiter between the action and the order id.
pub const DELIMITER: char = ':';

/// Telegram limits `callback_data` to 64 bytes.
pub const MAX_TOKEN_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is empty or longer than {} bytes", MAX_TOKEN_LEN)]
    Length,
    #[error("token has no '{}' delimiter", DELIMITER)]
    MissingDelimiter,
    #[error("unknown action {0:?}")]
    UnknownAction(String),
    #[error("invalid order id {0:?}")]
    InvalidOrderId(String),
}

/// A decoded `(action, order_id)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionToken {
    pub action: Action,
    pub order_id: i64,
}

impl ActionToken {
    pub fn new(action: Action, order_id: i64) -> Self {
        Self { action, order_id }
    }

    /// Encoded form used as `callback_data`.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.action, DELIMITER, self.order_id)
    }
}

impl FromStr for ActionToken {
    type Err = TokenError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() || raw.len() > MAX_TOKEN_LEN {
            return Err(TokenError::Length);
        }

        let (action, id) = raw.split_once(DELIMITER).ok_or(TokenError::MissingDelimiter)?;
        let action = Action::from_str(action).map_err(|_| TokenError::UnknownAction(action.to_string()))?;

        // Digits only: rejects signs, whitespace and a second delimiter.
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::InvalidOrderId(id.to_string()));
        }
        let order_id = id
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| TokenError::InvalidOrderId(id.to_string()))?;

        Ok(Self { action, order_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(ActionToken::new(Action::Approve, 42).encode(), "approve:42");
        assert_eq!(ActionToken::new(Action::SubmitReceipt, 7).encode(), "submit_receipt:7");
    }

    #[test]
    fn test_parse_all_actions() {
        use strum::IntoEnumIterator;
        for action in Action::iter() {
            let token = ActionToken::new(action, 15);
            assert_eq!(token.encode().parse::<ActionToken>(), Ok(token));
        }
    }

    #[test]
    fn test_parse_without_delimiter_fails() {
        assert_eq!("approve42".parse::<ActionToken>(), Err(TokenError::MissingDelimiter));
        assert_eq!("".parse::<ActionToken>(), Err(TokenError::Length));
    }

    #[test]
    fn test_parse_rejects_unknown_action() {
        // Legacy button names are not accepted
        assert!(matches!(
            "accept:1".parse::<ActionToken>(),
            Err(TokenError::UnknownAction(a)) if a == "accept"
        ));
        assert!(matches!("APPROVE:1".parse::<ActionToken>(), Err(TokenError::UnknownAction(_))));
    }

    #[test]
    fn test_parse_rejects_bad_ids() {
        for raw in ["approve:", "approve:abc", "approve:-1", "approve:0", "approve: 1", "approve:1:2", "approve:+3"] {
            assert!(
                matches!(raw.parse::<ActionToken>(), Err(TokenError::InvalidOrderId(_))),
                "{} should be rejected",
                raw
            );
        }
        assert!(matches!(
            "ship:99999999999999999999".parse::<ActionToken>(),
            Err(TokenError::InvalidOrderId(_))
        ));
    }

    #[test]
    fn test_parse_rejects_oversized_token() {
        let raw = format!("approve:{}", "1".repeat(80));
        assert_eq!(raw.parse::<ActionToken>(), Err(TokenError::Length));
    }
}
