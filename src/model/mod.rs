//! Domain model for organization-scoped packages
//!
//! A [`Package`] and its [`Version`]s are produced by the catalog fetch and are
//! treated as immutable for the rest of the run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of package types the engine knows how to validate and transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Container,
    Npm,
    Maven,
    NuGet,
    RubyGems,
}

impl PackageType {
    pub const ALL: [PackageType; 5] = [
        PackageType::Container,
        PackageType::Npm,
        PackageType::Maven,
        PackageType::NuGet,
        PackageType::RubyGems,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Container => "container",
            PackageType::Npm => "npm",
            PackageType::Maven => "maven",
            PackageType::NuGet => "nuget",
            PackageType::RubyGems => "rubygems",
        }
    }

    /// Value of the `PackageType` enum in the catalog query
    pub fn graphql_name(&self) -> &'static str {
        match self {
            PackageType::Container => "DOCKER",
            PackageType::Npm => "NPM",
            PackageType::Maven => "MAVEN",
            PackageType::NuGet => "NUGET",
            PackageType::RubyGems => "RUBYGEMS",
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "container" | "docker" => Ok(PackageType::Container),
            "npm" => Ok(PackageType::Npm),
            "maven" => Ok(PackageType::Maven),
            "nuget" => Ok(PackageType::NuGet),
            "rubygems" => Ok(PackageType::RubyGems),
            other => Err(format!(
                "unknown package type '{}' (expected one of: container, npm, maven, nuget, rubygems)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Internal,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Internal => "internal",
        }
    }

    /// Parse a registry-reported value, `None` for anything unrecognized
    pub fn from_api(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            "internal" => Some(Visibility::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub downloads_total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub name: String,
    pub size: u64,
    pub sha256: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub name: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub files: Vec<File>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Version {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn has_file_named(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.name == name)
    }

    pub fn has_file_with_suffix(&self, suffix: &str) -> bool {
        self.files.iter().any(|f| f.name.ends_with(suffix))
    }
}

/// Downloaded bytes of one [`File`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    /// Raw type label as reported by the source registry
    pub package_type: String,
    /// `None` until a registry reports it
    pub visibility: Option<Visibility>,
    pub repository: Option<Repository>,
    pub statistics: Statistics,
    pub versions: Vec<Version>,
}

impl Package {
    /// Typed package kind, failing for labels outside the supported set
    pub fn kind(&self) -> crate::error::Result<PackageType> {
        self.package_type
            .parse()
            .map_err(|_| crate::error::SyncError::UnsupportedPackageType(self.package_type.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_type_parses_catalog_and_cli_spellings() {
        assert_eq!("NPM".parse::<PackageType>(), Ok(PackageType::Npm));
        assert_eq!("docker".parse::<PackageType>(), Ok(PackageType::Container));
        assert_eq!("RubyGems".parse::<PackageType>(), Ok(PackageType::RubyGems));
        assert!("pypi".parse::<PackageType>().is_err());
    }

    #[test]
    fn unknown_label_is_unsupported() {
        let pkg = Package {
            id: "1".to_string(),
            name: "tool".to_string(),
            package_type: "PYPI".to_string(),
            visibility: None,
            repository: None,
            statistics: Statistics::default(),
            versions: Vec::new(),
        };
        assert!(matches!(
            pkg.kind(),
            Err(crate::error::SyncError::UnsupportedPackageType(label)) if label == "PYPI"
        ));
    }

    #[test]
    fn visibility_is_never_guessed() {
        assert_eq!(Visibility::from_api("PUBLIC"), Some(Visibility::Public));
        assert_eq!(Visibility::from_api("internal"), Some(Visibility::Internal));
        assert_eq!(Visibility::from_api("weird"), None);
        assert_eq!(Visibility::from_api(""), None);
    }
}
