use std::fmt;

use anyhow::{anyhow, Result};

pub const KEY_SEPARATOR: char = '\\';

/// Name of a value inside a key. The unnamed value every key carries is
/// [`ValueName::Default`]; stores translate it to their own convention.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueName {
    Named(String),
    Default,
}

impl ValueName {
    pub fn new(name: &str) -> Self {
        if name.is_empty() {
            Self::Default
        } else {
            Self::Named(name.to_string())
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// Value names compare case-insensitively.
    pub fn matches(&self, other: &ValueName) -> bool {
        match (self, other) {
            (Self::Default, Self::Default) => true,
            (Self::Named(left), Self::Named(right)) => left.eq_ignore_ascii_case(right),
            _ => false,
        }
    }
}

impl fmt::Display for ValueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Default => f.write_str("(Default)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Type of the unnamed value; always paired with [`ValueName::Default`].
    Default,
    Sz,
    ExpandSz,
    MultiSz,
    Dword,
    Qword,
    Binary,
    None,
}

impl ValueType {
    /// Native type tag. The unnamed value is stored as a string.
    pub fn native_tag(self) -> &'static str {
        match self {
            Self::Default | Self::Sz => "REG_SZ",
            Self::ExpandSz => "REG_EXPAND_SZ",
            Self::MultiSz => "REG_MULTI_SZ",
            Self::Dword => "REG_DWORD",
            Self::Qword => "REG_QWORD",
            Self::Binary => "REG_BINARY",
            Self::None => "REG_NONE",
        }
    }

    pub fn parse_native(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "REG_SZ" => Ok(Self::Sz),
            "REG_EXPAND_SZ" => Ok(Self::ExpandSz),
            "REG_MULTI_SZ" => Ok(Self::MultiSz),
            "REG_DWORD" => Ok(Self::Dword),
            "REG_QWORD" => Ok(Self::Qword),
            "REG_BINARY" => Ok(Self::Binary),
            "REG_NONE" => Ok(Self::None),
            "REG_DEFAULT" => Ok(Self::Default),
            other => Err(anyhow!("unsupported value type '{other}'")),
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Dword | Self::Qword)
    }
}

/// Reads numeric value data written either in decimal or as `0x`-prefixed hex.
pub fn parse_numeric_data(data: &str) -> Option<u64> {
    let data = data.trim();
    match data
        .strip_prefix("0x")
        .or_else(|| data.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => data.parse().ok(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue {
    pub name: ValueName,
    pub data: String,
    pub value_type: ValueType,
    pub exists: bool,
}

impl ConfigValue {
    /// The key's unnamed value.
    pub fn default_value(data: impl Into<String>) -> Self {
        Self {
            name: ValueName::Default,
            data: data.into(),
            value_type: ValueType::Default,
            exists: true,
        }
    }

    /// A named value. An empty name yields the unnamed value, whose type is
    /// always [`ValueType::Default`] whatever `value_type` says.
    pub fn named(name: &str, data: impl Into<String>, value_type: ValueType) -> Self {
        let name = ValueName::new(name);
        let value_type = if name.is_default() {
            ValueType::Default
        } else {
            value_type
        };
        Self {
            name,
            data: data.into(),
            value_type,
            exists: true,
        }
    }

    pub fn string(name: &str, data: impl Into<String>) -> Self {
        Self::named(name, data, ValueType::Sz)
    }

    /// Same name, identical type, and equal data: numeric types compare by
    /// value, everything else ignoring ASCII case.
    pub fn matches(&self, other: &ConfigValue) -> bool {
        self.name.matches(&other.name)
            && self.value_type == other.value_type
            && self.data_matches(other)
    }

    fn data_matches(&self, other: &ConfigValue) -> bool {
        if self.value_type.is_numeric() {
            if let (Some(left), Some(right)) = (
                parse_numeric_data(&self.data),
                parse_numeric_data(&other.data),
            ) {
                return left == right;
            }
        }
        self.data.eq_ignore_ascii_case(&other.data)
    }
}

/// Backslash-delimited path of a key, e.g. `HKCU\Software\Classes\roblox`.
/// Stored trimmed with empty segments removed; compared case-insensitively
/// through [`KeyPath::identity`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyPath(String);

impl KeyPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<&str> = raw
            .split(KEY_SEPARATOR)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.is_empty() {
            return Err(anyhow!("key path must not be empty"));
        }
        Ok(Self(segments.join("\\")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn join(&self, child: &str) -> Result<Self> {
        Self::parse(&format!("{}{KEY_SEPARATOR}{child}", self.0))
    }

    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once(KEY_SEPARATOR)
            .map(|(parent, _)| Self(parent.to_string()))
    }

    pub fn identity(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    pub fn is_same(&self, other: &KeyPath) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current state of one key as reported by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyState {
    pub path: KeyPath,
    pub exists: bool,
    pub values: Vec<ConfigValue>,
}

impl KeyState {
    pub fn missing(path: KeyPath) -> Self {
        Self {
            path,
            exists: false,
            values: Vec::new(),
        }
    }

    pub fn value(&self, name: &ValueName) -> Option<&ConfigValue> {
        self.values.iter().find(|value| value.name.matches(name))
    }
}
