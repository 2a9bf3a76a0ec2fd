//! Per-type structural validation of packages and versions
//!
//! Each [`PackageType`] maps to exactly one static [`ValidationRules`] record.
//! Adding a package type means extending the enum and this table.

use crate::error::ValidationError;
use crate::model::{Package, PackageType, Version};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Characters NuGet rejects in package identifiers
const NUGET_FORBIDDEN: &str = "!@#$%^&*()+=[]{}|\\:;\"'<>?,/";

const RUBYGEMS_METADATA_LIMIT: u64 = 2 * MIB;

type PackageRule = fn(&str) -> std::result::Result<(), String>;
type VersionRule = fn(&Version) -> std::result::Result<(), String>;

/// Fixed validation record for one package type
pub struct ValidationRules {
    pub max_file_size: u64,
    pub required_file_markers: &'static [&'static str],
    package_rule: PackageRule,
    version_rule: VersionRule,
}

static CONTAINER_RULES: ValidationRules = ValidationRules {
    max_file_size: 10 * GIB,
    required_file_markers: &["manifest.json", "config.json"],
    package_rule: container_package,
    version_rule: container_version,
};

static NPM_RULES: ValidationRules = ValidationRules {
    max_file_size: 256 * MIB,
    required_file_markers: &["package.json"],
    package_rule: npm_package,
    version_rule: npm_version,
};

static MAVEN_RULES: ValidationRules = ValidationRules {
    max_file_size: GIB,
    required_file_markers: &["pom.xml"],
    package_rule: maven_package,
    version_rule: maven_version,
};

static NUGET_RULES: ValidationRules = ValidationRules {
    max_file_size: 250 * MIB,
    required_file_markers: &[".nupkg", ".nuspec"],
    package_rule: nuget_package,
    version_rule: nuget_version,
};

static RUBYGEMS_RULES: ValidationRules = ValidationRules {
    max_file_size: 512 * MIB,
    required_file_markers: &[".gem", ".gemspec"],
    package_rule: rubygems_package,
    version_rule: rubygems_version,
};

impl PackageType {
    pub fn rules(&self) -> &'static ValidationRules {
        match self {
            PackageType::Container => &CONTAINER_RULES,
            PackageType::Npm => &NPM_RULES,
            PackageType::Maven => &MAVEN_RULES,
            PackageType::NuGet => &NUGET_RULES,
            PackageType::RubyGems => &RUBYGEMS_RULES,
        }
    }
}

/// Validator bound to one package type
#[derive(Debug, Clone, Copy)]
pub struct PackageValidator {
    package_type: PackageType,
}

impl PackageValidator {
    pub fn new(package_type: PackageType) -> Self {
        Self { package_type }
    }

    pub fn package_type(&self) -> PackageType {
        self.package_type
    }

    pub fn max_file_size(&self) -> u64 {
        self.package_type.rules().max_file_size
    }

    pub fn required_file_markers(&self) -> &'static [&'static str] {
        self.package_type.rules().required_file_markers
    }

    /// Package-level naming rule
    pub fn validate_package(&self, package: &Package) -> std::result::Result<(), ValidationError> {
        (self.package_type.rules().package_rule)(&package.name)
            .map_err(|msg| ValidationError::package(self.package_type, &package.name, msg))
    }

    /// Version-level structure rule plus the type's file size ceiling
    pub fn validate_version(&self, version: &Version) -> std::result::Result<(), ValidationError> {
        let rules = self.package_type.rules();
        (rules.version_rule)(version)
            .and_then(|_| check_file_sizes(version, rules.max_file_size))
            .map_err(|msg| ValidationError::version(self.package_type, &version.name, msg))
    }
}

fn check_file_sizes(version: &Version, max: u64) -> std::result::Result<(), String> {
    match version.files.iter().find(|f| f.size > max) {
        Some(file) => Err(format!(
            "file {} ({} bytes) exceeds maximum size of {} bytes",
            file.name, file.size, max
        )),
        None => Ok(()),
    }
}

fn require_named(version: &Version, name: &str) -> std::result::Result<(), String> {
    if version.has_file_named(name) {
        Ok(())
    } else {
        Err(format!("missing required {} file", name))
    }
}

fn require_suffix(version: &Version, suffix: &str) -> std::result::Result<(), String> {
    if version.has_file_with_suffix(suffix) {
        Ok(())
    } else {
        Err(format!("missing required {} file", suffix))
    }
}

fn container_package(name: &str) -> std::result::Result<(), String> {
    if name.contains(':') {
        return Err("container name cannot contain ':' character".to_string());
    }
    Ok(())
}

fn container_version(version: &Version) -> std::result::Result<(), String> {
    match version.files.iter().find(|f| f.size > CONTAINER_RULES.max_file_size) {
        Some(file) => Err(format!("file {} exceeds 10GB layer limit", file.name)),
        None => Ok(()),
    }
}

fn npm_package(name: &str) -> std::result::Result<(), String> {
    if !name.starts_with('@') {
        return Err("npm package name must start with '@' for scoped packages".to_string());
    }
    Ok(())
}

fn npm_version(version: &Version) -> std::result::Result<(), String> {
    require_named(version, "package.json")
}

fn maven_package(name: &str) -> std::result::Result<(), String> {
    let parts: Vec<&str> = name.split(':').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return Err("maven package name must be in format 'groupId:artifactId'".to_string());
    }
    Ok(())
}

fn maven_version(version: &Version) -> std::result::Result<(), String> {
    require_named(version, "pom.xml")
}

fn nuget_package(name: &str) -> std::result::Result<(), String> {
    if name.chars().any(|c| NUGET_FORBIDDEN.contains(c)) {
        return Err("invalid package name: must follow .NET namespace conventions".to_string());
    }
    Ok(())
}

fn nuget_version(version: &Version) -> std::result::Result<(), String> {
    require_suffix(version, ".nupkg")?;
    require_suffix(version, ".nuspec")
}

fn rubygems_package(name: &str) -> std::result::Result<(), String> {
    if name.chars().any(|c| c == ' ' || NUGET_FORBIDDEN.contains(c)) {
        return Err(
            "invalid package name: can only contain alphanumeric characters, dashes, and underscores"
                .to_string(),
        );
    }
    if name.to_lowercase() != name {
        return Err("package name must be lowercase".to_string());
    }
    Ok(())
}

fn rubygems_version(version: &Version) -> std::result::Result<(), String> {
    require_suffix(version, ".gem")?;
    require_suffix(version, ".gemspec")?;
    let oversized = version
        .files
        .iter()
        .any(|f| f.name.ends_with("metadata.gz") && f.size > RUBYGEMS_METADATA_LIMIT);
    if oversized {
        return Err("metadata.gz file must be less than 2MB".to_string());
    }
    Ok(())
}
