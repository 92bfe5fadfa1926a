#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Zip,
    Exe,
}

impl PackageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Exe => "exe",
        }
    }

    pub fn is_archive(self) -> bool {
        matches!(self, Self::Zip)
    }

    /// Infers the kind from a manifest file name. Anything that is neither
    /// an archive nor an executable is not actionable.
    pub fn infer_from_file_name(file_name: &str) -> Option<Self> {
        let lower = file_name.trim().to_ascii_lowercase();
        if lower.ends_with(".zip") {
            return Some(Self::Zip);
        }
        if lower.ends_with(".exe") {
            return Some(Self::Exe);
        }
        None
    }
}
