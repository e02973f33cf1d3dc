//! Packaged workbook handling.
//!
//! A packaged document (`.twbx`, `.tdsx`) is a zip archive holding exactly one
//! top-level markup file (`.twb`, `.tds`) next to extracts and images.

use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

use crate::error::{BridgeError, BridgeResult};

/// A document as downloaded from the workbook platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl DownloadedDocument {
    pub fn is_packaged(&self) -> bool {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.len() > 1 && ext.to_ascii_lowercase().ends_with('x'))
            .unwrap_or(false)
    }

    /// The markup text, unpacking the archive when needed.
    pub fn markup(&self) -> BridgeResult<String> {
        if self.is_packaged() {
            let (_, content) = unpack_markup(&self.bytes, &self.filename)?;
            Ok(content)
        } else {
            String::from_utf8(self.bytes.clone())
                .map_err(|e| BridgeError::parse(format!("{} is not UTF-8: {}", self.filename, e)))
        }
    }
}

/// Filename from a `Content-Disposition` header, defaulting to `unknown.twb`.
pub fn filename_from_disposition(header: Option<&str>) -> String {
    header
        .and_then(|h| h.split_once("filename="))
        .map(|(_, name)| name.trim().trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown.twb".to_string())
}

/// Extract the single top-level markup file from a packaged document.
///
/// The wanted extension is the package extension without its trailing `x`.
/// Zero or several top-level matches are both errors.
pub fn unpack_markup(bytes: &[u8], package_name: &str) -> BridgeResult<(String, String)> {
    let package_ext = package_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .ok_or_else(|| BridgeError::parse(format!("{} has no extension", package_name)))?;
    let mut stem = package_ext.chars();
    stem.next_back();
    let wanted = format!(".{}", stem.as_str());

    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| BridgeError::parse(format!("Failed to open archive {}: {}", package_name, e)))?;

    let candidates: Vec<String> = archive
        .file_names()
        .filter(|name| !name.contains('/') && name.ends_with(wanted.as_str()))
        .map(str::to_string)
        .collect();

    let name = match candidates.as_slice() {
        [single] => single.clone(),
        [] => {
            return Err(BridgeError::NotFound(format!(
                "no top-level {} file in {}",
                wanted, package_name
            )))
        }
        _ => {
            return Err(BridgeError::parse(format!(
                "{} top-level {} files in {}, expected one",
                candidates.len(),
                wanted,
                package_name
            )))
        }
    };

    let mut file = archive
        .by_name(&name)
        .map_err(|e| BridgeError::parse(format!("Failed to read {}: {}", name, e)))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| BridgeError::parse(format!("Failed to read {}: {}", name, e)))?;

    debug!(package = package_name, file = %name, "Unpacked markup");
    Ok((name, content))
}
