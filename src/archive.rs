//! ZIP extraction restricted to an allow-list of members.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{Error, Result};

/// Substring allow-list applied to lower-cased member names
#[derive(Debug, Clone)]
pub struct MemberFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl MemberFilter {
    pub fn new(include: &[&str], exclude: &[&str]) -> Self {
        Self {
            include: include.iter().map(|s| s.to_lowercase()).collect(),
            exclude: exclude.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// Consolidated CVM statements and reference-form tables
    pub fn cvm() -> Self {
        Self::new(
            &["_bpa_", "_bpp_", "_dfc_", "_dre_", "_dva_", "fre_"],
            &["_ind_"],
        )
    }

    /// Share distribution table of the reference form
    pub fn reference_form() -> Self {
        Self::new(&["distribuicao_capital"], &[])
    }

    /// B3 daily quote text file
    pub fn cotahist() -> Self {
        Self::new(&["cotahist"], &[])
    }

    /// Sector classification workbook (`.xls` or `.xlsx`)
    pub fn spreadsheet() -> Self {
        Self::new(&[".xls"], &[])
    }

    pub fn accepts(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.include.iter().any(|token| lower.contains(token))
            && !self.exclude.iter().any(|token| lower.contains(token))
    }
}

/// Join `name` under `dest` after lexical cleaning; `None` when the result
/// would leave `dest`
pub fn safe_join(dest: &Path, name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut cleaned = PathBuf::new();
    let mut depth = 0usize;

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => {
                cleaned.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                cleaned.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if depth == 0 {
        return None;
    }
    Some(dest.join(cleaned))
}

/// Extract the members of `zip_path` accepted by `filter` into `dest`.
///
/// Any member escaping `dest` fails the whole archive. Files written before a
/// failure stay on disk; callers extract into a [`ScratchDir`].
pub fn extract(zip_path: &Path, dest: &Path, filter: &MemberFilter) -> Result<Vec<PathBuf>> {
    let file = File::open(zip_path).map_err(|e| Error::io(zip_path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::CorruptArchive(format!("{}: {}", zip_path.display(), e)))?;

    std::fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;

    let mut produced = Vec::new();
    for index in 0..archive.len() {
        let mut member = archive
            .by_index(index)
            .map_err(|e| Error::CorruptArchive(format!("{}: {}", zip_path.display(), e)))?;
        let name = member.name().to_string();

        let Some(target) = safe_join(dest, &name) else {
            warn!("🚫 zip slip em {}: {}", zip_path.display(), name);
            return Err(Error::CorruptArchive(format!("membro fora do destino: {}", name)));
        };

        if member.is_dir() || !filter.accepts(&name) {
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| Error::io(&target, e))?;
        std::io::copy(&mut member, &mut out).map_err(|e| Error::io(&target, e))?;

        debug!("extraído {}", target.display());
        produced.push(target);
    }

    Ok(produced)
}

/// Hex SHA-256 of an in-memory body
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex SHA-256 of a file's content
pub fn digest_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Directory removed with everything inside it when dropped
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("não foi possível remover {}: {}", self.path.display(), e);
            }
        }
    }
}
