//! `release bump`: increments the version recorded in the project manifest.
//!
//! `Cargo.toml` is edited in place with `toml_edit` so comments and layout
//! survive. Without a Cargo manifest, `package.json` (and `package-lock.json`
//! when present) are rewritten instead.

use std::path::{Path, PathBuf};

use semver::Version;
use serde_json::Value as Json;
use toml_edit::DocumentMut;

use crate::error::{Error, Result};
use crate::version::{parse_version, Bump};

/// Result of a successful bump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpOutcome {
    pub previous: Version,
    pub version: Version,
    /// Every file that was rewritten.
    pub files: Vec<PathBuf>,
}

fn bump_error(path: &Path, reason: impl Into<String>) -> Error {
    Error::Bump {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| bump_error(path, e.to_string()))
}

fn write(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|e| bump_error(path, e.to_string()))
}

fn next_version(path: &Path, current: &str, kind: Bump) -> Result<(Version, Version)> {
    let previous = parse_version(current)
        .ok_or_else(|| bump_error(path, format!("`{}` is not a semantic version", current)))?;
    let version = kind.apply(&previous)?;
    Ok((previous, version))
}

/// Bumps the manifest found in `dir` by `kind`.
pub fn bump_version(dir: &Path, kind: Bump) -> Result<BumpOutcome> {
    let cargo = dir.join("Cargo.toml");
    if cargo.is_file() {
        return bump_cargo(&cargo, kind);
    }

    let package = dir.join("package.json");
    if package.is_file() {
        return bump_package_json(dir, &package, kind);
    }

    Err(bump_error(
        dir,
        "no Cargo.toml or package.json found in this directory",
    ))
}

fn bump_cargo(path: &Path, kind: Bump) -> Result<BumpOutcome> {
    let content = read(path)?;
    let mut doc = content
        .parse::<DocumentMut>()
        .map_err(|e| bump_error(path, e.to_string()))?;

    let item = doc
        .get_mut("package")
        .and_then(|package| package.get_mut("version"))
        .ok_or_else(|| bump_error(path, "[package] has no version"))?;

    if item.is_table_like() {
        return Err(bump_error(
            path,
            "the version is inherited from the workspace; bump the workspace manifest instead",
        ));
    }

    let value = item
        .as_value_mut()
        .ok_or_else(|| bump_error(path, "[package].version is not a value"))?;
    let current = value
        .as_str()
        .ok_or_else(|| bump_error(path, "[package].version is not a string"))?
        .to_string();

    let (previous, version) = next_version(path, &current, kind)?;

    let decor = value.decor().clone();
    *value = toml_edit::Value::from(version.to_string());
    *value.decor_mut() = decor;

    write(path, &doc.to_string())?;
    tracing::debug!(path = %path.display(), %previous, %version, "bumped Cargo manifest");

    Ok(BumpOutcome {
        previous,
        version,
        files: vec![path.to_path_buf()],
    })
}

fn read_json(path: &Path) -> Result<Json> {
    serde_json::from_str(&read(path)?).map_err(|e| bump_error(path, e.to_string()))
}

fn write_json(path: &Path, json: &Json) -> Result<()> {
    let mut text = serde_json::to_string_pretty(json).map_err(|e| bump_error(path, e.to_string()))?;
    text.push('\n');
    write(path, &text)
}

fn bump_package_json(dir: &Path, path: &Path, kind: Bump) -> Result<BumpOutcome> {
    let mut package = read_json(path)?;
    let current = package
        .get("version")
        .and_then(Json::as_str)
        .ok_or_else(|| bump_error(path, "no \"version\" field"))?
        .to_string();

    let (previous, version) = next_version(path, &current, kind)?;
    package["version"] = Json::String(version.to_string());
    write_json(path, &package)?;

    let mut files = vec![path.to_path_buf()];

    let lock = dir.join("package-lock.json");
    if lock.is_file() {
        let mut lockfile = read_json(&lock)?;
        if let Some(object) = lockfile.as_object_mut() {
            object.insert("version".to_string(), Json::String(version.to_string()));
        }
        if let Some(root) = lockfile
            .get_mut("packages")
            .and_then(|packages| packages.get_mut(""))
            .and_then(Json::as_object_mut)
        {
            root.insert("version".to_string(), Json::String(version.to_string()));
        }
        write_json(&lock, &lockfile)?;
        files.push(lock);
    }

    tracing::debug!(path = %path.display(), %previous, %version, "bumped package.json");

    Ok(BumpOutcome {
        previous,
        version,
        files,
    })
}
