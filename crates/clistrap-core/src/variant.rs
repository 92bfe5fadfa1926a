use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Player,
    Studio,
}

impl Variant {
    /// Short name used for settings files and command-line arguments.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Studio => "studio",
        }
    }

    /// Binary type understood by the client settings service.
    pub fn binary_type(self) -> &'static str {
        match self {
            Self::Player => "WindowsPlayer",
            Self::Studio => "WindowsStudio64",
        }
    }

    /// Deploy type as it appears in `DeployHistory.txt`.
    pub fn deploy_type(self) -> &'static str {
        match self {
            Self::Player => "WindowsPlayer",
            Self::Studio => "Studio64",
        }
    }

    pub fn versions_folder(self) -> &'static str {
        match self {
            Self::Player => "PlayerVersions",
            Self::Studio => "StudioVersions",
        }
    }

    pub fn executable_name(self) -> &'static str {
        match self {
            Self::Player => "RobloxPlayerBeta.exe",
            Self::Studio => "RobloxStudioBeta.exe",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
