use serde::{Deserialize, Serialize};

/// Status carried on peer-to-peer replies. Ordered: anything below `Ok`
/// means the sender refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PopStatus {
    WrongHash = 0,
    NoAttendees = 1,
    MergeError = 2,
    MergeNonFinalized = 3,
    Ok = 4,
}

impl PopStatus {
    pub fn is_ok(&self) -> bool {
        *self >= PopStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusals_order_below_ok() {
        assert!(PopStatus::WrongHash < PopStatus::Ok);
        assert!(PopStatus::MergeNonFinalized < PopStatus::Ok);
        assert!(PopStatus::Ok.is_ok());
        assert!(!PopStatus::MergeError.is_ok());
    }
}
