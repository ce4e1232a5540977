use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;
use serde::Serialize;

use crate::{domain::ChatId, errors::Error, Result};

const MAX_FILENAME_CHARS: usize = 100;

/// On-disk layout of everything the manager exports.
///
/// ```text
/// <root>/groups_list.json
/// <root>/chat_list.json
/// <root>/full_exports/<Name>_<ID>/{metadata,messages,participants}.json
/// <root>/full_exports/<Name>_<ID>/media/*
/// <root>/<Name>_<ID>/[<Topic>/]<kind>/*     organized media download
/// <root>/<Name>_<ID>/download_log.json
/// ```
#[derive(Clone, Debug)]
pub struct ExportStore {
    root: PathBuf,
}

impl ExportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn groups_list_path(&self) -> PathBuf {
        self.root.join("groups_list.json")
    }

    pub fn chat_list_path(&self) -> PathBuf {
        self.root.join("chat_list.json")
    }

    pub fn group_export_dir(&self, title: &str, id: ChatId) -> PathBuf {
        self.root
            .join("full_exports")
            .join(format!("{}_{}", sanitize_filename(title), id.0))
    }

    /// Base directory of the organized media download of one chat.
    pub fn media_dir(&self, title: &str, id: ChatId) -> PathBuf {
        self.root
            .join(format!("{}_{}", sanitize_filename(title), id.0))
    }

    /// Write `value` as pretty UTF-8 JSON, creating parent directories.
    ///
    /// The file is written next to its final name and renamed into place so a
    /// crash never leaves a truncated export behind.
    pub fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        if !path.starts_with(&self.root) {
            return Err(Error::InvalidPath {
                path: path.to_path_buf(),
                reason: format!("outside export root {}", self.root.display()),
            });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut body = serde_json::to_vec_pretty(value)?;
        body.push(b'\n');

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f\x7f]"#).expect("static regex"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Make a chat title safe to use as a path component on every platform.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = unsafe_chars().replace_all(name, "_");
    let collapsed = whitespace_runs().replace_all(&replaced, " ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let capped: String = trimmed.chars().take(MAX_FILENAME_CHARS).collect();
    let capped = capped.trim_end_matches(|c: char| c == '.' || c.is_whitespace());
    if capped.is_empty() {
        "unnamed".to_string()
    } else {
        capped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("tab\there\nnewline"), "tab_here_newline");
    }

    #[test]
    fn sanitize_trims_and_collapses() {
        assert_eq!(sanitize_filename("  ..My   Group..  "), "My Group");
        assert_eq!(sanitize_filename("..."), "unnamed");
        assert_eq!(sanitize_filename(""), "unnamed");
    }

    #[test]
    fn sanitize_keeps_unicode_and_caps_length() {
        assert_eq!(sanitize_filename("Grupo 🚀 Ação"), "Grupo 🚀 Ação");
        let long = "é".repeat(150);
        assert_eq!(sanitize_filename(&long).chars().count(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn export_dir_layout() {
        let store = ExportStore::new("exports");
        assert_eq!(
            store.group_export_dir("Rust / Brasil", ChatId(42)),
            PathBuf::from("exports/full_exports/Rust _ Brasil_42")
        );
        assert_eq!(
            store.media_dir("Fotos: 2024", ChatId(7)),
            PathBuf::from("exports/Fotos_ 2024_7")
        );
        assert_eq!(
            store.groups_list_path(),
            PathBuf::from("exports/groups_list.json")
        );
    }

    #[test]
    fn write_json_creates_dirs_and_rejects_foreign_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExportStore::new(dir.path());
        let path = store.group_export_dir("G", ChatId(1)).join("metadata.json");
        store
            .write_json(&path, &serde_json::json!({"name": "Ação"}))
            .unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"name\": \"Ação\""));
        assert!(!path.with_extension("json.tmp").exists());

        let err = store
            .write_json(Path::new("/elsewhere/x.json"), &1)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }
}
