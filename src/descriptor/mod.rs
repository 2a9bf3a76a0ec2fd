//! Identity and declared version extraction from package descriptors
//!
//! Supports npm `package.json`, Maven POMs, NuGet `.nuspec` (inside the
//! `.nupkg` or loose) and the RubyGems specification inside a `.gem`.

pub mod xml;

use crate::error::{Result, SyncError};
use crate::model::{LocalFile, PackageType};
use flate2::read::GzDecoder;
use std::io::{Cursor, Read};

/// Gem specifications larger than this are rejected
pub const GEM_METADATA_LIMIT: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub version: String,
}

impl Descriptor {
    /// Fails unless the declared version equals `expected`
    pub fn ensure_version(&self, expected: &str) -> Result<()> {
        if self.version == expected {
            Ok(())
        } else {
            Err(SyncError::Descriptor(format!(
                "descriptor for {} declares version {} but version {} is being transferred",
                self.name, self.version, expected
            )))
        }
    }
}

/// Parse the descriptor of a downloaded version
pub fn parse(kind: PackageType, files: &[LocalFile]) -> Result<Descriptor> {
    match kind {
        PackageType::Npm => {
            let file = find_named(files, "package.json")?;
            parse_package_json(&file.data)
        }
        PackageType::Maven => {
            let file = files
                .iter()
                .find(|f| f.name == "pom.xml")
                .or_else(|| files.iter().find(|f| f.name.ends_with(".pom")))
                .ok_or_else(|| missing("pom.xml"))?;
            parse_pom(&file.data)
        }
        PackageType::NuGet => {
            if let Some(nupkg) = files.iter().find(|f| f.name.ends_with(".nupkg")) {
                if let Some(nuspec) = nuspec_from_nupkg(&nupkg.data)? {
                    return parse_nuspec(&nuspec);
                }
            }
            let loose = find_suffix(files, ".nuspec")?;
            parse_nuspec(&loose.data)
        }
        PackageType::RubyGems => {
            let gem = find_suffix(files, ".gem")?;
            parse_gem(&gem.data)
        }
        PackageType::Container => Err(SyncError::Descriptor(
            "container images have no package descriptor".to_string(),
        )),
    }
}

pub fn parse_package_json(data: &[u8]) -> Result<Descriptor> {
    let value: serde_json::Value = serde_json::from_slice(data)
        .map_err(|e| SyncError::Descriptor(format!("invalid package.json: {}", e)))?;
    let field = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SyncError::Descriptor(format!("package.json missing {}", key)))
    };
    Ok(Descriptor {
        name: field("name")?,
        version: field("version")?,
    })
}

/// Maven name is `groupId:artifactId`; group and version fall back to `<parent>`
pub fn parse_pom(data: &[u8]) -> Result<Descriptor> {
    let texts = xml::leaf_texts(&utf8(data, "pom.xml")?)?;
    let lookup = |key: &str| {
        xml::element_text(&texts, &format!("project/{}", key))
            .or_else(|| xml::element_text(&texts, &format!("project/parent/{}", key)))
    };

    let group_id = lookup("groupId").ok_or_else(|| missing_field("pom.xml", "groupId"))?;
    let artifact_id = xml::element_text(&texts, "project/artifactId")
        .ok_or_else(|| missing_field("pom.xml", "artifactId"))?;
    let version = lookup("version").ok_or_else(|| missing_field("pom.xml", "version"))?;

    Ok(Descriptor {
        name: format!("{}:{}", group_id, artifact_id),
        version,
    })
}

pub fn parse_nuspec(data: &[u8]) -> Result<Descriptor> {
    let texts = xml::leaf_texts(&utf8(data, ".nuspec")?)?;
    let id = xml::element_text(&texts, "package/metadata/id")
        .ok_or_else(|| missing_field(".nuspec", "id"))?;
    let version = xml::element_text(&texts, "package/metadata/version")
        .ok_or_else(|| missing_field(".nuspec", "version"))?;
    Ok(Descriptor { name: id, version })
}

/// The `.nuspec` entry at the root of a `.nupkg` archive, if any
pub fn nuspec_from_nupkg(data: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    let entry_name = archive
        .file_names()
        .find(|name| name.ends_with(".nuspec") && !name.contains('/'))
        .map(str::to_string);

    match entry_name {
        Some(name) => {
            let mut entry = archive.by_name(&name)?;
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            Ok(Some(buf))
        }
        None => Ok(None),
    }
}

/// Read `metadata.gz` from a gem tarball and extract name and version
pub fn parse_gem(data: &[u8]) -> Result<Descriptor> {
    let mut archive = tar::Archive::new(Cursor::new(data));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let is_metadata = entry
            .path()
            .map(|p| p.to_string_lossy() == "metadata.gz")
            .unwrap_or(false);
        if !is_metadata {
            continue;
        }
        if entry.size() > GEM_METADATA_LIMIT {
            return Err(SyncError::Descriptor(
                "metadata.gz exceeds size limit of 2MB".to_string(),
            ));
        }

        let mut compressed = Vec::new();
        entry.read_to_end(&mut compressed)?;
        let mut yaml = String::new();
        GzDecoder::new(compressed.as_slice())
            .take(4 * GEM_METADATA_LIMIT)
            .read_to_string(&mut yaml)
            .map_err(|e| SyncError::Descriptor(format!("unreadable metadata.gz: {}", e)))?;
        return parse_gem_spec(&yaml);
    }
    Err(missing("metadata.gz"))
}

/// Scan the YAML gem specification for top-level `name` and `version`
pub fn parse_gem_spec(yaml: &str) -> Result<Descriptor> {
    let mut name = None;
    let mut version = None;
    let mut in_version_object = false;

    for line in yaml.lines() {
        let indented = line.starts_with(' ');
        let trimmed = line.trim();

        if in_version_object {
            if indented {
                if let Some(value) = trimmed.strip_prefix("version:") {
                    version = Some(unquote(value));
                    in_version_object = false;
                }
                continue;
            }
            in_version_object = false;
        }
        if indented {
            continue;
        }

        if let Some(value) = trimmed.strip_prefix("name:") {
            name.get_or_insert_with(|| unquote(value));
        } else if let Some(value) = trimmed.strip_prefix("version:") {
            let value = value.trim();
            if value.is_empty() || value.starts_with('!') {
                in_version_object = true;
            } else {
                version.get_or_insert_with(|| unquote(value));
            }
        }
    }

    match (name, version) {
        (Some(name), Some(version)) if !name.is_empty() && !version.is_empty() => {
            Ok(Descriptor { name, version })
        }
        (None, _) => Err(missing_field("gem specification", "name")),
        _ => Err(missing_field("gem specification", "version")),
    }
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches(|c| c == '"' || c == '\'').to_string()
}

fn utf8(data: &[u8], what: &str) -> Result<String> {
    String::from_utf8(data.to_vec())
        .map(|s| s.trim_start_matches('\u{feff}').to_string())
        .map_err(|_| SyncError::Descriptor(format!("{} is not valid UTF-8", what)))
}

fn find_named<'a>(files: &'a [LocalFile], name: &str) -> Result<&'a LocalFile> {
    files.iter().find(|f| f.name == name).ok_or_else(|| missing(name))
}

fn find_suffix<'a>(files: &'a [LocalFile], suffix: &str) -> Result<&'a LocalFile> {
    files
        .iter()
        .find(|f| f.name.ends_with(suffix))
        .ok_or_else(|| missing(suffix))
}

fn missing(what: &str) -> SyncError {
    SyncError::Descriptor(format!("no {} file in downloaded version", what))
}

fn missing_field(what: &str, field: &str) -> SyncError {
    SyncError::Descriptor(format!("{} missing required field: {}", what, field))
}
