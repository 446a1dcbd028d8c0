use {
    super::error::InitiationError,
    serde::{Serialize, Serializer},
    std::fmt,
};

/// Whole Kenyan shillings. Daraja only accepts integral amounts and expects
/// them as decimal strings on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(u64);

impl Amount {
    pub fn new(shillings: u64) -> Result<Self, InitiationError> {
        if shillings == 0 {
            return Err(InitiationError::Protocol(
                "amount must be at least 1 shilling".into(),
            ));
        }
        Ok(Self(shillings))
    }

    pub fn shillings(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}
