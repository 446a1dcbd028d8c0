use {
    super::callback::MetadataItem,
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// STK push / M-Pesa Express.
    PushToPay,
    /// B2C payment request.
    Disbursement,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PushToPay => "push_to_pay",
            Self::Disbursement => "disbursement",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of one logical transaction. The discriminants are stored in an
/// `AtomicU8` by the correlator, so they must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TransactionState {
    Created = 0,
    AwaitingCallback = 1,
    Completed = 2,
    Failed = 3,
    TimedOut = 4,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AwaitingCallback => "awaiting_callback",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Created),
            1 => Some(Self::AwaitingCallback),
            2 => Some(Self::Completed),
            3 => Some(Self::Failed),
            4 => Some(Self::TimedOut),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    /// `Created -> Failed` covers a transaction whose registration never
    /// succeeded. Terminal states have no outgoing edges.
    pub fn can_transition_to(&self, next: &TransactionState) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::AwaitingCallback)
                | (Self::Created, Self::Failed)
                | (Self::AwaitingCallback, Self::Completed)
                | (Self::AwaitingCallback, Self::Failed)
                | (Self::AwaitingCallback, Self::TimedOut)
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result fields common to both callback kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackResult {
    pub result_code: i64,
    pub description: String,
    pub metadata: Vec<MetadataItem>,
}

impl CallbackResult {
    pub fn metadata_value(&self, name: &str) -> Option<&super::callback::MetadataValue> {
        self.metadata
            .iter()
            .find(|item| item.name == name)
            .map(|item| &item.value)
    }
}

/// Terminal value of a transaction, written once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionOutcome {
    Success(CallbackResult),
    Failure { result_code: i64, description: String },
    RegistrationFailed { reason: String },
    TimedOut,
}

impl TransactionOutcome {
    pub fn terminal_state(&self) -> TransactionState {
        match self {
            Self::Success(_) => TransactionState::Completed,
            Self::Failure { .. } | Self::RegistrationFailed { .. } => TransactionState::Failed,
            Self::TimedOut => TransactionState::TimedOut,
        }
    }

    pub fn result_code(&self) -> Option<i64> {
        match self {
            Self::Success(result) => Some(result.result_code),
            Self::Failure { result_code, .. } => Some(*result_code),
            Self::RegistrationFailed { .. } | Self::TimedOut => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
