//! Synchronization direction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which way changes flow for a table or a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SyncDirection {
    /// Local changes are pushed; remote changes are not pulled.
    UploadOnly,
    /// Remote changes are pulled; local changes are not pushed.
    DownloadOnly,
    /// Both ways.
    #[default]
    UploadAndDownload,
}

impl SyncDirection {
    /// Returns true if a table configured with `self` takes part in a
    /// collection requested for `requested`.
    pub fn includes(&self, requested: SyncDirection) -> bool {
        *self == SyncDirection::UploadAndDownload
            || requested == SyncDirection::UploadAndDownload
            || *self == requested
    }

    /// True if this direction pushes local changes.
    pub fn uploads(&self) -> bool {
        matches!(self, SyncDirection::UploadOnly | SyncDirection::UploadAndDownload)
    }

    /// True if this direction pulls remote changes.
    pub fn downloads(&self) -> bool {
        matches!(self, SyncDirection::DownloadOnly | SyncDirection::UploadAndDownload)
    }

    /// Name used in query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::UploadOnly => "UploadOnly",
            SyncDirection::DownloadOnly => "DownloadOnly",
            SyncDirection::UploadAndDownload => "UploadAndDownload",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UploadOnly" => Ok(SyncDirection::UploadOnly),
            "DownloadOnly" => Ok(SyncDirection::DownloadOnly),
            "UploadAndDownload" => Ok(SyncDirection::UploadAndDownload),
            other => Err(format!("unknown sync direction: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SyncDirection::*;

    #[test]
    fn table_inclusion() {
        assert!(UploadOnly.includes(UploadOnly));
        assert!(!UploadOnly.includes(DownloadOnly));
        assert!(UploadOnly.includes(UploadAndDownload));
        assert!(UploadAndDownload.includes(DownloadOnly));
        assert!(!DownloadOnly.includes(UploadOnly));
    }

    #[test]
    fn parse() {
        for d in [UploadOnly, DownloadOnly, UploadAndDownload] {
            assert_eq!(d.as_str().parse::<SyncDirection>().unwrap(), d);
        }
        assert!("both".parse::<SyncDirection>().is_err());
    }
}
