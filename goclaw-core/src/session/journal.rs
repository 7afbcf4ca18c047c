//! Crash-safe JSONL journal I/O.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Message, Session, SessionMetadataHeader};

const RENAME_RETRIES: u32 = 4;
const RENAME_RETRY_DELAY: Duration = Duration::from_millis(25);

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed journal line: {0}")]
    Malformed(String),
    #[error("rename failed after {0} retries: {1}")]
    RenameFailed(u32, std::io::Error),
}

/// Replaces filesystem-hostile characters in a session key with `_`.
pub fn sanitize_filename(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

/// Serializes `session` as metadata-header-then-messages JSONL and writes it
/// atomically: write to `<name>.tmp`, fsync, close, rename, retrying the rename
/// up to [`RENAME_RETRIES`] times at [`RENAME_RETRY_DELAY`] intervals.
pub fn save(dir: &Path, filename: &str, session: &Session) -> Result<(), JournalError> {
    std::fs::create_dir_all(dir)?;
    let final_path = dir.join(filename);
    let tmp_path = dir.join(format!("{filename}.tmp"));

    {
        let mut file = std::fs::File::create(&tmp_path)?;
        let header = SessionMetadataHeader {
            type_tag: "metadata".to_string(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            metadata: session.metadata.clone(),
        };
        serde_json::to_writer(&mut file, &header).map_err(|e| JournalError::Malformed(e.to_string()))?;
        file.write_all(b"\n")?;
        for message in &session.messages {
            serde_json::to_writer(&mut file, message).map_err(|e| JournalError::Malformed(e.to_string()))?;
            file.write_all(b"\n")?;
        }
        file.sync_all()?;
    }

    rename_with_retries(&tmp_path, &final_path)
}

fn rename_with_retries(from: &Path, to: &Path) -> Result<(), JournalError> {
    let mut last_err = None;
    for attempt in 0..=RENAME_RETRIES {
        match std::fs::rename(from, to) {
            Ok(()) => return Ok(()),
            Err(e) => {
                last_err = Some(e);
                if attempt < RENAME_RETRIES {
                    std::thread::sleep(RENAME_RETRY_DELAY);
                }
            }
        }
    }
    Err(JournalError::RenameFailed(
        RENAME_RETRIES,
        last_err.expect("loop always sets last_err before exhausting retries"),
    ))
}

/// Loads a session from its journal file. `key` is the original (unsanitized) key to
/// restore onto the in-memory `Session`, since the filename is lossy.
pub fn load(path: &Path, key: &str) -> Result<Session, JournalError> {
    let contents = std::fs::read_to_string(path)?;
    let mut lines = contents.lines();

    let header_line = lines
        .next()
        .ok_or_else(|| JournalError::Malformed("empty journal".to_string()))?;
    let header: SessionMetadataHeader =
        serde_json::from_str(header_line).map_err(|e| JournalError::Malformed(e.to_string()))?;

    let mut messages = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let message: Message = serde_json::from_str(line).map_err(|e| JournalError::Malformed(e.to_string()))?;
        messages.push(message);
    }

    Ok(Session {
        key: key.to_string(),
        messages,
        created_at: header.created_at,
        updated_at: header.updated_at,
        metadata: header.metadata,
        generation: 0,
    })
}

/// Lists finalized journal filenames in `dir`, promoting any orphaned `<name>.tmp`
/// files (interrupted saves) by rename before listing.
pub fn list_recovering(dir: &Path) -> Result<Vec<String>, JournalError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    let mut names = Vec::new();
    let mut finalized = std::collections::HashSet::new();
    for path in &entries {
        if path.extension().and_then(|e| e.to_str()) != Some("tmp") {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                finalized.insert(name.to_string());
            }
        }
    }
    for path in &entries {
        if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
            let stem_name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            if !finalized.contains(&stem_name) {
                let target = dir.join(&stem_name);
                if rename_with_retries(path, &target).is_ok() {
                    finalized.insert(stem_name);
                }
            }
        }
    }
    for name in finalized {
        if name == "index.json" {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Inverse filename→key heuristic for diagnostics/fallback when no
/// `index.json` sidecar entry exists: a best-effort pass that reconstructs
/// `agent:<id>:<rest>` prefixes.
pub fn best_effort_key_from_filename(filename: &str) -> String {
    filename.replacen('_', ":", 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitizes_hostile_characters() {
        assert_eq!(sanitize_filename("agent:a1:telegram:group:42"), "agent_a1_telegram_group_42");
        assert_eq!(sanitize_filename(r#"a/b\c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn save_then_load_round_trips_messages_and_metadata() {
        let dir = tempdir().unwrap();
        let mut session = Session::new("agent:a1:main");
        session.add_message(Message::user("hi"));
        session.add_message(Message::assistant("hello"));
        session.metadata.insert("lang".into(), serde_json::json!("en"));

        let filename = sanitize_filename(&session.key);
        save(dir.path(), &filename, &session).unwrap();

        let loaded = load(&dir.path().join(&filename), &session.key).unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].content, "hi");
        assert_eq!(loaded.metadata.get("lang"), Some(&serde_json::json!("en")));
        assert_eq!(loaded.key, session.key);
    }

    #[test]
    fn save_does_not_leave_tmp_file_behind() {
        let dir = tempdir().unwrap();
        let session = Session::new("k");
        save(dir.path(), "k", &session).unwrap();
        assert!(!dir.path().join("k.tmp").exists());
        assert!(dir.path().join("k").exists());
    }

    #[test]
    fn list_recovering_promotes_orphaned_tmp_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join("orphan.tmp"), "{}\n").unwrap();

        let names = list_recovering(dir.path()).unwrap();
        assert_eq!(names, vec!["orphan".to_string()]);
        assert!(dir.path().join("orphan").exists());
        assert!(!dir.path().join("orphan.tmp").exists());
    }

    #[test]
    fn list_recovering_does_not_duplicate_already_finalized_entries() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("k"), "{}\n").unwrap();
        std::fs::write(dir.path().join("k.tmp"), "{}\n").unwrap();

        let names = list_recovering(dir.path()).unwrap();
        assert_eq!(names, vec!["k".to_string()]);
    }

    #[test]
    fn list_recovering_on_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert_eq!(list_recovering(&missing).unwrap(), Vec::<String>::new());
    }
}
