//! Attachment handling.
//!
//! Uploads arrive as in-memory batches. Each accepted file gets a
//! collision-free storage name derived from its task id, lands in the
//! blob store with execute permission stripped, and is recorded as a
//! metadata row plus one audit event. Blob placement is not part of
//! the database transaction: a stored file without its row (or the
//! reverse) is a tolerated inconsistency, not a failure.

use crate::error::Result;
use crate::model::Attachment;
use crate::perms::PermissionGate;
use crate::storage::sqlite::{insert_attachment, storage_name_taken};
use crate::storage::{EventType, TaskStore};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Platform-reported state of one uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// Transfer completed; the bytes are usable.
    Ok,
    /// Transfer failed or was truncated; skip the file.
    Failed,
}

/// One file in an upload batch.
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Name the uploader gave the file.
    pub orig_name: String,
    /// MIME type the uploader declared.
    pub declared_type: String,
    pub bytes: Vec<u8>,
    pub status: UploadStatus,
}

impl FileUpload {
    /// A successfully transferred file.
    #[must_use]
    pub fn ok(orig_name: &str, declared_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            orig_name: orig_name.to_string(),
            declared_type: declared_type.to_string(),
            bytes,
            status: UploadStatus::Ok,
        }
    }
}

/// Blob storage collaborator.
///
/// Implementations own durability; callers only name destinations.
pub trait BlobStore {
    /// Whether a stored file occupies this name.
    fn exists(&self, name: &str) -> bool;

    /// Store bytes under a name.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes could not be stored.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Strip execute permission from a stored file.
    ///
    /// # Errors
    ///
    /// Returns an error if permissions could not be changed.
    fn strip_exec(&self, name: &str) -> Result<()>;

    /// Remove a stored file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but could not be removed.
    fn remove(&self, name: &str) -> Result<()>;
}

/// Blob store over one flat directory.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl BlobStore for DiskStore {
    fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.path_for(name), bytes)?;
        Ok(())
    }

    fn strip_exec(&self, name: &str) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let path = self.path_for(name);
            let mut perms = fs::metadata(&path)?.permissions();
            perms.set_mode(perms.mode() & !0o111);
            fs::set_permissions(&path, perms)?;
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Stores upload batches and links them to tasks and comments.
pub struct AttachmentManager {
    blobs: Box<dyn BlobStore>,
    mime_overrides: HashMap<String, String>,
}

impl AttachmentManager {
    /// `mime_overrides` maps lowercase file extensions to the MIME
    /// type to record instead of the uploader's declared one.
    #[must_use]
    pub fn new(blobs: Box<dyn BlobStore>, mime_overrides: HashMap<String, String>) -> Self {
        Self {
            blobs,
            mime_overrides,
        }
    }

    /// Store an upload batch against a task (and optionally one
    /// comment; 0 links to the task itself).
    ///
    /// Denied actors and batches with no usable file both yield
    /// `Ok(false)`. Files whose transfer failed, or whose blob
    /// placement fails, are skipped, not fatal. Returns true when at
    /// least one file was stored and recorded.
    ///
    /// # Errors
    ///
    /// Returns an error only if recording the metadata rows fails.
    pub fn upload(
        &self,
        store: &mut TaskStore,
        gate: &PermissionGate,
        actor_id: i64,
        task_id: i64,
        comment_id: i64,
        files: Vec<FileUpload>,
    ) -> Result<bool> {
        if !gate.can_create_attachments() {
            tracing::debug!(task_id, "attachment upload denied");
            return Ok(false);
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut placed: Vec<Attachment> = Vec::new();

        for file in files {
            if file.status != UploadStatus::Ok {
                tracing::debug!(name = %file.orig_name, "skipping failed upload");
                continue;
            }

            let file_name = self.unique_name(store.conn(), task_id)?;

            if let Err(err) = self.blobs.put(&file_name, &file.bytes) {
                tracing::warn!(name = %file.orig_name, error = %err, "could not store upload");
                continue;
            }
            if let Err(err) = self.blobs.strip_exec(&file_name) {
                tracing::warn!(name = %file_name, error = %err, "could not strip permissions");
            }

            placed.push(Attachment {
                attachment_id: 0,
                task_id,
                comment_id,
                file_type: self.resolve_type(&file.orig_name, &file.declared_type),
                file_size: file.bytes.len() as i64,
                orig_name: file.orig_name,
                file_name,
                added_by: actor_id,
                date_added: now,
            });
        }

        if placed.is_empty() {
            return Ok(false);
        }

        store.mutate("attach_files", actor_id, |tx, ctx| {
            for att in &placed {
                insert_attachment(tx, att)?;
                ctx.record_change(
                    task_id,
                    EventType::AttachmentAdded,
                    None,
                    Some(att.orig_name.clone()),
                );
            }
            Ok(())
        })?;

        Ok(true)
    }

    /// Remove a stored blob, tolerating a file that is already gone.
    pub fn remove_blob(&self, name: &str) {
        if let Err(err) = self.blobs.remove(name) {
            tracing::warn!(name = %name, error = %err, "could not remove stored file");
        }
    }

    /// Generate a storage name no stored or recorded file occupies.
    fn unique_name(&self, conn: &rusqlite::Connection, task_id: i64) -> Result<String> {
        loop {
            let suffix = Uuid::new_v4().simple().to_string();
            let name = format!("{task_id}_{}", &suffix[..15]);
            if !self.blobs.exists(&name) && !storage_name_taken(conn, &name)? {
                return Ok(name);
            }
        }
    }

    fn resolve_type(&self, orig_name: &str, declared: &str) -> String {
        let ext = Path::new(orig_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        if let Some(mapped) = ext.and_then(|e| self.mime_overrides.get(&e)) {
            return mapped.clone();
        }
        if declared.is_empty() {
            return "application/octet-stream".to_string();
        }
        declared.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use crate::model::task::STATUS_UNCONFIRMED;
    use crate::perms::{Actor, Capability, CapabilitySet};
    use crate::storage::sqlite::insert_task;
    use tempfile::TempDir;

    fn seed_task(store: &TaskStore, id: i64) {
        let task = Task {
            task_id: id,
            project_id: 1,
            task_type: 1,
            item_summary: "s".to_string(),
            detailed_desc: "d".to_string(),
            item_status: STATUS_UNCONFIRMED,
            task_severity: 2,
            priority: 2,
            product_category: 0,
            product_version: 0,
            closedby_version: 0,
            operating_system: 0,
            percent_complete: 0,
            opened_by: 1,
            date_opened: 1000,
            last_edited_time: 1000,
            last_edited_by: 1,
            due_date: None,
            is_closed: false,
            date_closed: None,
            closed_by: 0,
            resolution_reason: None,
            closure_comment: None,
            task_token: None,
            anon_email: None,
        };
        insert_task(store.conn(), &task).unwrap();
    }

    fn manager(dir: &TempDir) -> AttachmentManager {
        let mut overrides = HashMap::new();
        overrides.insert("log".to_string(), "text/plain".to_string());
        AttachmentManager::new(Box::new(DiskStore::new(dir.path().to_path_buf())), overrides)
    }

    #[test]
    fn test_batch_skips_failed_files() {
        let dir = TempDir::new().unwrap();
        let mut store = TaskStore::open_memory().unwrap();
        seed_task(&store, 1);

        let actor = Actor::user(2);
        let caps = CapabilitySet::from_caps([Capability::CreateAttachments]);
        let gate = PermissionGate::new(&actor, &caps);

        let mut broken = FileUpload::ok("trace.log", "", b"x".to_vec());
        broken.status = UploadStatus::Failed;
        let files = vec![
            FileUpload::ok("report.txt", "text/plain", b"one".to_vec()),
            broken,
            FileUpload::ok("data.bin", "application/octet-stream", b"three".to_vec()),
        ];

        let stored = manager(&dir)
            .upload(&mut store, &gate, 2, 1, 0, files)
            .unwrap();
        assert!(stored);

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM attachments WHERE task_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);

        let events = crate::storage::events::get_events(store.conn(), 1, None).unwrap();
        let added: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == EventType::AttachmentAdded)
            .collect();
        assert_eq!(added.len(), 2);
        assert_eq!(added[0].new_value.as_deref(), Some("report.txt"));
    }

    #[test]
    fn test_denied_upload_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut store = TaskStore::open_memory().unwrap();
        seed_task(&store, 1);

        let actor = Actor::user(2);
        let caps = CapabilitySet::empty();
        let gate = PermissionGate::new(&actor, &caps);

        let stored = manager(&dir)
            .upload(
                &mut store,
                &gate,
                2,
                1,
                0,
                vec![FileUpload::ok("report.txt", "text/plain", b"one".to_vec())],
            )
            .unwrap();
        assert!(!stored);

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM attachments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_all_failed_batch_returns_false() {
        let dir = TempDir::new().unwrap();
        let mut store = TaskStore::open_memory().unwrap();
        seed_task(&store, 1);

        let actor = Actor::user(2);
        let caps = CapabilitySet::from_caps([Capability::CreateAttachments]);
        let gate = PermissionGate::new(&actor, &caps);

        let mut broken = FileUpload::ok("a", "", Vec::new());
        broken.status = UploadStatus::Failed;
        let stored = manager(&dir)
            .upload(&mut store, &gate, 2, 1, 0, vec![broken])
            .unwrap();
        assert!(!stored);
    }

    #[test]
    fn test_mime_override_and_fallback() {
        let dir = TempDir::new().unwrap();
        let mut store = TaskStore::open_memory().unwrap();
        seed_task(&store, 1);

        let actor = Actor::user(2);
        let caps = CapabilitySet::from_caps([Capability::CreateAttachments]);
        let gate = PermissionGate::new(&actor, &caps);

        let files = vec![
            FileUpload::ok("server.LOG", "application/x-evil", b"a".to_vec()),
            FileUpload::ok("noext", "", b"b".to_vec()),
            FileUpload::ok("photo.png", "image/png", b"c".to_vec()),
        ];
        manager(&dir).upload(&mut store, &gate, 2, 1, 0, files).unwrap();

        let types: Vec<String> = {
            let mut stmt = store
                .conn()
                .prepare("SELECT file_type FROM attachments ORDER BY attachment_id")
                .unwrap();
            let rows = stmt.query_map([], |r| r.get(0)).unwrap();
            rows.collect::<rusqlite::Result<_>>().unwrap()
        };
        assert_eq!(types, vec!["text/plain", "application/octet-stream", "image/png"]);
    }

    #[test]
    fn test_storage_names_carry_task_id_and_blobs_land() {
        let dir = TempDir::new().unwrap();
        let mut store = TaskStore::open_memory().unwrap();
        seed_task(&store, 42);

        let actor = Actor::user(2);
        let caps = CapabilitySet::from_caps([Capability::CreateAttachments]);
        let gate = PermissionGate::new(&actor, &caps);

        manager(&dir)
            .upload(
                &mut store,
                &gate,
                2,
                42,
                0,
                vec![FileUpload::ok("a.txt", "text/plain", b"hello".to_vec())],
            )
            .unwrap();

        let name: String = store
            .conn()
            .query_row("SELECT file_name FROM attachments", [], |r| r.get(0))
            .unwrap();
        assert!(name.starts_with("42_"));
        assert!(dir.path().join(&name).exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dir.path().join(&name))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0);
        }
    }

    #[test]
    fn test_disk_store_remove_is_tolerant() {
        let dir = TempDir::new().unwrap();
        let blobs = DiskStore::new(dir.path().to_path_buf());
        blobs.put("1_abc", b"x").unwrap();
        assert!(blobs.exists("1_abc"));
        blobs.remove("1_abc").unwrap();
        assert!(!blobs.exists("1_abc"));
        // Removing a missing file is fine.
        blobs.remove("1_abc").unwrap();
    }
}
