//! Packaging targets served by the repository.
//!
//! The platform set is fixed at compile time. Parsing a [`Platform`] from a
//! request is the only validation step, so an unknown platform is rejected
//! before any directory is created or any remote call is made.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A conda packaging target (OS/architecture pair, or `noarch`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "noarch")]
    Noarch,
    #[serde(rename = "linux-64")]
    Linux64,
    #[serde(rename = "win-64")]
    Win64,
    #[serde(rename = "osx-64")]
    Osx64,
    #[serde(rename = "linux-ppc64le")]
    LinuxPpc64le,
}

impl Platform {
    /// Every platform, in the order they are shown on the landing page.
    pub const ALL: [Platform; 5] = [
        Platform::Noarch,
        Platform::Linux64,
        Platform::Win64,
        Platform::Osx64,
        Platform::LinuxPpc64le,
    ];

    /// Directory name and URL segment for this platform.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Noarch => "noarch",
            Platform::Linux64 => "linux-64",
            Platform::Win64 => "win-64",
            Platform::Osx64 => "osx-64",
            Platform::LinuxPpc64le => "linux-ppc64le",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                tracing::warn!(platform = %s, "Rejected unknown platform");
                AppError::InvalidPlatform(s.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_platform() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
    }

    #[test]
    fn rejects_unknown_platform() {
        let err = "bogus-arch".parse::<Platform>().unwrap_err();
        assert!(matches!(err, AppError::InvalidPlatform(ref p) if p == "bogus-arch"));
    }

    #[test]
    fn parsing_is_case_sensitive() {
        assert!("Linux-64".parse::<Platform>().is_err());
        assert!("".parse::<Platform>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Platform::LinuxPpc64le).unwrap();
        assert_eq!(json, "\"linux-ppc64le\"");
        let back: Platform = serde_json::from_str("\"osx-64\"").unwrap();
        assert_eq!(back, Platform::Osx64);
    }
}
