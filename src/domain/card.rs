use serde::{Deserialize, Serialize};
use std::fmt;

/// Format marker that precedes the primary account number on track one.
pub const FORMAT_MARKER: &str = "%B";

/// Separates the account number field from the cardholder name field.
pub const FIELD_DELIMITER: char = '^';

/// A card number extracted from magnetic-stripe track data.
///
/// Only the last four digits are ever meant to leave the kiosk, so the
/// `Display` impl prints the masked form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardNumber(String);

impl CardNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final four characters, or the whole number when it is shorter.
    pub fn last_four(&self) -> &str {
        let start = self
            .0
            .char_indices()
            .rev()
            .nth(3)
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        &self.0[start..]
    }

    pub fn masked(&self) -> String {
        format!("**{}", self.last_four())
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Extracts the card number from raw swipe data such as
/// `%B4111111111111111^DOE/JOHN^...`.
///
/// Absence is the only failure signal: empty input, a missing delimiter, an
/// empty name field or a missing format marker all yield `None`.
pub fn parse_card_number(raw: Option<&str>) -> Option<CardNumber> {
    let raw = raw.filter(|r| !r.is_empty())?;

    let mut fields = raw.split(FIELD_DELIMITER);
    let account_field = fields.next().filter(|f| !f.is_empty())?;
    fields.next().filter(|f| !f.is_empty())?;

    let (_, after_marker) = account_field.split_once(FORMAT_MARKER)?;
    let number = after_marker
        .split(FORMAT_MARKER)
        .next()
        .filter(|n| !n.is_empty())?;

    Some(CardNumber(number.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWIPE: &str = "%B4111111111111111^DOE/JOHN^2512101000000000000000000000000";

    #[test]
    fn test_parse_standard_track() {
        let number = parse_card_number(Some(SWIPE)).unwrap();
        assert_eq!(number.as_str(), "4111111111111111");
        assert_eq!(number.masked(), "**1111");
    }

    #[test]
    fn test_parse_absent_or_empty() {
        assert!(parse_card_number(None).is_none());
        assert!(parse_card_number(Some("")).is_none());
    }

    #[test]
    fn test_parse_requires_both_fields() {
        assert!(parse_card_number(Some("%B4111111111111111")).is_none());
        assert!(parse_card_number(Some("%B4111111111111111^")).is_none());
        assert!(parse_card_number(Some("^DOE/JOHN^")).is_none());
    }

    #[test]
    fn test_parse_requires_marker() {
        assert!(parse_card_number(Some("4111111111111111^DOE/JOHN^")).is_none());
        assert!(parse_card_number(Some("garbage")).is_none());
        assert!(parse_card_number(Some("%B^DOE/JOHN^")).is_none());
    }

    #[test]
    fn test_parse_tolerates_leading_noise() {
        // Keystroke capture sometimes delivers a stray character before the sentinel.
        let number = parse_card_number(Some("x%B5500000000000004^DOE/JANE^")).unwrap();
        assert_eq!(number.as_str(), "5500000000000004");
    }

    #[test]
    fn test_partial_swipe_is_not_enough() {
        // Data trickles in one keystroke at a time while the card is swiped.
        assert!(parse_card_number(Some(&SWIPE[..17])).is_none());
        assert!(parse_card_number(Some(&SWIPE[..18])).is_none());
        assert!(parse_card_number(Some(&SWIPE[..19])).is_none());
        assert!(parse_card_number(Some(&SWIPE[..20])).is_some());
    }

    #[test]
    fn test_last_four_of_short_number() {
        let number = parse_card_number(Some("%B123^X")).unwrap();
        assert_eq!(number.last_four(), "123");
        assert_eq!(number.to_string(), "**123");
    }
}
