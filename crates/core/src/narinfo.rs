//! The narinfo text record.
//!
//! A narinfo describes one NAR: where it is stored, its hashes and sizes, the
//! store paths it references and a signature. The text form is a list of
//! `Key: value` lines:
//!
//! ```text
//! StorePath: /nix/store/xcp9cav49dmsjbwdjlmkjxj10gkpx553-hello-2.10
//! URL: nar/0nqgf15qfiacfxrgm2wkw0gwwncjqqzzalj8rs14w9srkydkjsk9.nar.xz
//! Compression: xz
//! FileHash: sha256:0nqgf15qfiacfxrgm2wkw0gwwncjqqzzalj8rs14w9srkydkjsk9
//! FileSize: 41104
//! NarHash: sha256:16mvl7v0ylzcg2n3xzjn41qhzbmgcn5iyarx16nn5l2r36n2kqci
//! NarSize: 206104
//! References: 563528481rvhc5kxwipjmg6rqrl95mdx-glibc-2.33-56 xcp9cav49dmsjbwdjlmkjxj10gkpx553-hello-2.10
//! Deriver: vvb4wxmnjixmrkhmj2xb75z62hrr41i7-hello-2.10.drv
//! Sig: cache.nixos.org-1:lo9EfNIL4eGRuNh7DTbAAffWPpI2SlYC/8uP7JnhgmfRIUNGhSbFe8qEaKN0mFS02TuhPpXFPNtRkFcCp0hGAQ==
//! ```
//!
//! [`NarInfo::parse`] is lenient: unknown keys and lines without a colon are
//! skipped, so records written by newer tools still load.

use std::fmt;

use crate::signing::build_fingerprint;

/// Content type served for narinfo documents.
pub const NARINFO_CONTENT_TYPE: &str = "text/x-nix-narinfo";

/// `Deriver` value Nix writes when the deriver is not known.
pub const UNKNOWN_DERIVER: &str = "unknown-deriver";

/// Compression used when a record does not name one.
pub const DEFAULT_COMPRESSION: &str = "none";

/// A parsed narinfo record.
///
/// References are stored as written in the record, normally base names
/// without the store directory. Optional fields are `None` when the line is
/// missing or empty, never `Some("")`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NarInfo {
    /// Full store path.
    pub store_path: String,
    /// Location of the NAR relative to the cache root.
    pub url: String,
    /// Compression of the file at `url`.
    pub compression: String,
    /// Hash of the file at `url`.
    pub file_hash: String,
    /// Size of the file at `url`.
    pub file_size: u64,
    /// Hash of the uncompressed NAR.
    pub nar_hash: String,
    /// Size of the uncompressed NAR.
    pub nar_size: u64,
    /// Referenced store paths, in record order.
    pub references: Vec<String>,
    /// Signature, `{key name}:{base64}`.
    pub sig: String,
    /// Derivation that produced the path.
    pub deriver: Option<String>,
    /// Platform the path was built for.
    pub system: Option<String>,
    /// Content-address assertion.
    pub ca: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

impl NarInfo {
    /// Parses a narinfo document.
    ///
    /// Each line is split at its first `:` and both halves are trimmed. When a
    /// key repeats, the last occurrence wins. Missing `Compression` defaults to
    /// `none`; sizes that do not parse become 0; `Deriver: unknown-deriver`
    /// becomes `None`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut info = Self { compression: DEFAULT_COMPRESSION.to_owned(), ..Self::default() };

        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "StorePath" => info.store_path = value.to_owned(),
                "URL" => info.url = value.to_owned(),
                "Compression" => {
                    info.compression =
                        non_empty(value).unwrap_or_else(|| DEFAULT_COMPRESSION.to_owned());
                },
                "FileHash" => info.file_hash = value.to_owned(),
                "FileSize" => info.file_size = value.parse().unwrap_or(0),
                "NarHash" => info.nar_hash = value.to_owned(),
                "NarSize" => info.nar_size = value.parse().unwrap_or(0),
                "References" => {
                    info.references = value.split_whitespace().map(str::to_owned).collect();
                },
                "Sig" => info.sig = value.to_owned(),
                "Deriver" => info.deriver = non_empty(value).filter(|d| d != UNKNOWN_DERIVER),
                "System" => info.system = non_empty(value),
                "CA" => info.ca = non_empty(value),
                _ => {},
            }
        }

        info
    }

    /// Renders the record; same as `to_string()`.
    #[must_use]
    pub fn generate(&self) -> String {
        self.to_string()
    }

    /// Signing fingerprint of this record.
    ///
    /// References written as base names are expanded to full paths under
    /// `store_dir` first, since signatures cover full paths.
    #[must_use]
    pub fn fingerprint(&self, store_dir: &str) -> String {
        let store_dir = store_dir.trim_end_matches('/');
        let references: Vec<String> = self
            .references
            .iter()
            .map(|r| if r.starts_with('/') { r.clone() } else { format!("{store_dir}/{r}") })
            .collect();
        build_fingerprint(&self.store_path, &self.nar_hash, self.nar_size, &references)
    }
}

impl fmt::Display for NarInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "StorePath: {}", self.store_path)?;
        writeln!(f, "URL: {}", self.url)?;
        writeln!(f, "Compression: {}", self.compression)?;
        writeln!(f, "FileHash: {}", self.file_hash)?;
        writeln!(f, "FileSize: {}", self.file_size)?;
        writeln!(f, "NarHash: {}", self.nar_hash)?;
        writeln!(f, "NarSize: {}", self.nar_size)?;
        writeln!(f, "References: {}", self.references.join(" "))?;
        if let Some(deriver) = &self.deriver {
            writeln!(f, "Deriver: {deriver}")?;
        }
        if let Some(system) = &self.system {
            writeln!(f, "System: {system}")?;
        }
        writeln!(f, "Sig: {}", self.sig)?;
        if let Some(ca) = &self.ca {
            writeln!(f, "CA: {ca}")?;
        }
        Ok(())
    }
}
