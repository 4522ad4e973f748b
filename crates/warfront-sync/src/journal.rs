//! JSON-lines persistence for event logs.
//!
//! One file per game, one [`StateEvent`] per line, appended in sequence
//! order. A line is written and flushed before the event becomes visible
//! to subscribers, so anything a client has seen survives a restart.
//!
//! The file never keeps a partial line past a failed append or a reopen:
//! it is cut back to the end of the last complete line, so the next append
//! starts on a clean line.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use warfront_protocol::StateEvent;

use crate::SyncError;

/// An open journal file.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    sync_writes: bool,
    /// Length of the file up to the end of the last complete line.
    committed: u64,
}

impl Journal {
    /// Creates a new, empty journal. Fails if the file already exists so a
    /// game's history is never silently overwritten.
    pub async fn create(path: impl Into<PathBuf>, sync_writes: bool) -> Result<Self, SyncError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file,
            sync_writes,
            committed: 0,
        })
    }

    /// Opens an existing journal for appending. A torn final line (see
    /// [`Journal::replay`]) is cut off first.
    pub async fn open(path: impl Into<PathBuf>, sync_writes: bool) -> Result<Self, SyncError> {
        let path = path.into();
        let bytes = tokio::fs::read(&path).await?;
        let committed = bytes
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |last| last as u64 + 1);
        let file = OpenOptions::new().append(true).open(&path).await?;
        if committed < bytes.len() as u64 {
            tracing::warn!(
                path = %path.display(),
                dropped = bytes.len() as u64 - committed,
                "truncating torn journal tail"
            );
            file.set_len(committed).await?;
        }
        Ok(Self {
            path,
            file,
            sync_writes,
            committed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one event as a line.
    ///
    /// On failure whatever part of the line reached the file is truncated
    /// away, so the journal still ends on a complete line.
    pub async fn append(&mut self, event: &StateEvent) -> Result<(), SyncError> {
        let mut line = serde_json::to_vec(event).map_err(SyncError::Encode)?;
        line.push(b'\n');
        match self.write_line(&line).await {
            Ok(()) => {
                self.committed += line.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.rollback().await;
                Err(e.into())
            }
        }
    }

    async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line).await?;
        self.file.flush().await?;
        if self.sync_writes {
            self.file.sync_data().await?;
        }
        Ok(())
    }

    /// Cuts the file back to the last committed line.
    pub(crate) async fn rollback(&mut self) {
        if let Err(e) = self.file.set_len(self.committed).await {
            tracing::error!(
                path = %self.path.display(),
                committed = self.committed,
                error = %e,
                "could not truncate partial journal line"
            );
        }
    }

    /// Reads every event in a journal.
    ///
    /// A final line without its newline is a write torn by a crash; it was
    /// never acknowledged, so it is dropped with a warning. Anything else
    /// that fails to parse, or breaks the `1, 2, 3, ...` sequence, is
    /// reported as corruption.
    pub async fn replay(path: impl AsRef<Path>) -> Result<Vec<StateEvent>, SyncError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let complete = text.ends_with('\n');
        let lines: Vec<&str> = text.lines().collect();

        let mut events = Vec::with_capacity(lines.len());
        for (index, raw) in lines.iter().enumerate() {
            let line = index + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let event: StateEvent = match serde_json::from_str(raw) {
                Ok(event) => event,
                Err(e) if line == lines.len() && !complete => {
                    tracing::warn!(path = %path.display(), line, error = %e, "dropping torn journal tail");
                    break;
                }
                Err(e) => {
                    return Err(SyncError::CorruptJournal {
                        path: path.to_path_buf(),
                        line,
                        reason: e.to_string(),
                    });
                }
            };
            let expected = events.len() as u64 + 1;
            if event.sequence != expected {
                return Err(SyncError::CorruptJournal {
                    path: path.to_path_buf(),
                    line,
                    reason: format!("expected sequence {expected}, found {}", event.sequence),
                });
            }
            events.push(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use warfront_protocol::{EventKind, IdentityId};

    use super::*;

    fn event(sequence: u64) -> StateEvent {
        StateEvent {
            sequence,
            kind: EventKind::ParticipantLeft {
                identity_id: IdentityId(sequence),
            },
        }
    }

    #[tokio::test]
    async fn test_append_then_replay_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game-1.jsonl");

        let mut journal = Journal::create(&path, false).await.unwrap();
        for seq in 1..=5 {
            journal.append(&event(seq)).await.unwrap();
        }
        drop(journal);

        let events = Journal::replay(&path).await.unwrap();
        assert_eq!(events, (1..=5).map(event).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game-1.jsonl");
        Journal::create(&path, false).await.unwrap();

        assert!(matches!(
            Journal::create(&path, false).await,
            Err(SyncError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_open_appends_after_existing_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game-1.jsonl");
        let mut journal = Journal::create(&path, true).await.unwrap();
        journal.append(&event(1)).await.unwrap();
        drop(journal);

        let mut reopened = Journal::open(&path, false).await.unwrap();
        reopened.append(&event(2)).await.unwrap();

        assert_eq!(Journal::replay(&path).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replay_drops_torn_final_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game-1.jsonl");
        let good = serde_json::to_string(&event(1)).unwrap();
        tokio::fs::write(&path, format!("{good}\n{{\"sequence\":2,\"ki"))
            .await
            .unwrap();

        let events = Journal::replay(&path).await.unwrap();
        assert_eq!(events, vec![event(1)]);
    }

    #[tokio::test]
    async fn test_open_cuts_torn_tail_before_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game-1.jsonl");
        let good = serde_json::to_string(&event(1)).unwrap();
        tokio::fs::write(&path, format!("{good}\n{{\"sequence\":2,\"ki"))
            .await
            .unwrap();

        let mut journal = Journal::open(&path, false).await.unwrap();
        journal.append(&event(2)).await.unwrap();

        assert_eq!(Journal::replay(&path).await.unwrap(), vec![event(1), event(2)]);
    }

    #[tokio::test]
    async fn test_rollback_drops_partial_line_from_failed_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game-1.jsonl");
        let mut journal = Journal::create(&path, false).await.unwrap();
        journal.append(&event(1)).await.unwrap();

        // What a write cut short by a full disk leaves behind.
        let mut raw = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        std::io::Write::write_all(&mut raw, b"{\"sequence\":2,\"ki").unwrap();
        drop(raw);

        journal.rollback().await;
        journal.append(&event(2)).await.unwrap();
        journal.append(&event(3)).await.unwrap();

        assert_eq!(
            Journal::replay(&path).await.unwrap(),
            vec![event(1), event(2), event(3)]
        );
    }

    #[tokio::test]
    async fn test_replay_rejects_sequence_gap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game-1.jsonl");
        let lines = [event(1), event(3)]
            .iter()
            .map(|e| serde_json::to_string(e).unwrap() + "\n")
            .collect::<String>();
        tokio::fs::write(&path, lines).await.unwrap();

        let result = Journal::replay(&path).await;
        assert!(matches!(
            result,
            Err(SyncError::CorruptJournal { line: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_replay_rejects_garbage_in_the_middle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game-1.jsonl");
        let good = serde_json::to_string(&event(1)).unwrap();
        tokio::fs::write(&path, format!("garbage\n{good}\n")).await.unwrap();

        assert!(matches!(
            Journal::replay(&path).await,
            Err(SyncError::CorruptJournal { line: 1, .. })
        ));
    }
}
