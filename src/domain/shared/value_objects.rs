//! Shared value objects used across multiple bounded contexts

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of physical line keys on the phone
pub const LINE_COUNT: usize = 3;

/// Session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// BLF subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transfer record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(Uuid);

impl TransferId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical line number (1..=3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct LineNumber(u8);

impl LineNumber {
    pub fn new(number: u8) -> Result<Self, String> {
        if number == 0 || number as usize > LINE_COUNT {
            return Err(format!("Line number must be 1..={}, got {}", LINE_COUNT, number));
        }
        Ok(Self(number))
    }

    /// All line numbers in key order
    pub fn all() -> impl Iterator<Item = LineNumber> {
        (1..=LINE_COUNT as u8).map(LineNumber)
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        (self.0 - 1) as usize
    }
}

impl Default for LineNumber {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for LineNumber {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LineNumber> for u8 {
    fn from(line: LineNumber) -> Self {
        line.0
    }
}

impl fmt::Display for LineNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque call handle issued by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportHandle(String);

impl TransportHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque presence dialog handle issued by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle(String);

impl SubscriptionHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote party identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteParty {
    number: String,
    display_name: Option<String>,
}

impl RemoteParty {
    pub fn new(number: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            number: number.into(),
            display_name,
        }
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Name to show on a line key, falling back to the number
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.number)
    }
}

/// A single DTMF tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub struct DtmfTone(char);

impl DtmfTone {
    pub fn new(tone: char) -> Result<Self, String> {
        let tone = tone.to_ascii_uppercase();
        match tone {
            '0'..='9' | '*' | '#' | 'A'..='D' => Ok(Self(tone)),
            other => Err(format!("Invalid DTMF tone: {:?}", other)),
        }
    }

    pub fn as_char(&self) -> char {
        self.0
    }
}

impl TryFrom<char> for DtmfTone {
    type Error = String;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DtmfTone> for char {
    fn from(tone: DtmfTone) -> Self {
        tone.0
    }
}

impl fmt::Display for DtmfTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_number_bounds() {
        assert!(LineNumber::new(0).is_err());
        assert!(LineNumber::new(4).is_err());
        assert_eq!(LineNumber::new(3).unwrap().get(), 3);
        assert_eq!(LineNumber::all().count(), LINE_COUNT);
    }

    #[test]
    fn test_remote_party_label() {
        let named = RemoteParty::new("101", Some("Alice".to_string()));
        assert_eq!(named.label(), "Alice");

        let blank = RemoteParty::new("102", Some("  ".to_string()));
        assert_eq!(blank.label(), "102");

        let anonymous = RemoteParty::new("103", None);
        assert_eq!(anonymous.label(), "103");
    }

    #[test]
    fn test_dtmf_tone_validation() {
        assert_eq!(DtmfTone::new('5').unwrap().as_char(), '5');
        assert_eq!(DtmfTone::new('a').unwrap().as_char(), 'A');
        assert!(DtmfTone::new('#').is_ok());
        assert!(DtmfTone::new('x').is_err());
    }
}
