//! Conflict resolution choices.

use serde::{Deserialize, Serialize};

/// What to do with an incoming change that conflicts with a newer local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConflictResolution {
    /// Keep the local row; drop the incoming change.
    #[default]
    Skip,
    /// Apply the incoming change regardless of the local version.
    ForceWrite,
}

impl ConflictResolution {
    /// Converts to a numeric code.
    pub fn to_code(&self) -> u8 {
        match self {
            ConflictResolution::Skip => 0,
            ConflictResolution::ForceWrite => 1,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ConflictResolution::Skip),
            1 => Some(ConflictResolution::ForceWrite),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_codes() {
        assert_eq!(ConflictResolution::from_code(0), Some(ConflictResolution::Skip));
        assert_eq!(
            ConflictResolution::from_code(ConflictResolution::ForceWrite.to_code()),
            Some(ConflictResolution::ForceWrite)
        );
        assert_eq!(ConflictResolution::from_code(2), None);
        assert_eq!(ConflictResolution::default(), ConflictResolution::Skip);
    }
}
