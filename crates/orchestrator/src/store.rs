//! Persisted job state
//!
//! One JSON document per job under `<root>/jobs/`. Writes go through a
//! temp-file-plus-rename so a polling reader never observes a partially
//! written record, and a store-level mutex serializes read-modify-write
//! cycles. Terminal states are final: updates against a SUCCESS or
//! FAILURE record are dropped with a warning.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use splat_common::{JobRecord, JobStatus, PipelineError, Result};

/// Filesystem-backed job store
#[derive(Debug)]
pub struct JobStore {
    jobs_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JobStore {
    /// Open (and create) the store under `data_root`
    ///
    /// # Errors
    ///
    /// Maps directory-creation failures to [`PipelineError::Resource`].
    pub fn open(data_root: &Path) -> Result<Self> {
        let jobs_dir = data_root.join("jobs");
        std::fs::create_dir_all(&jobs_dir).map_err(|e| {
            PipelineError::Resource(format!("cannot create {}: {e}", jobs_dir.display()))
        })?;
        Ok(Self {
            jobs_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, job_id: &str) -> PathBuf {
        self.jobs_dir.join(format!("{job_id}.json"))
    }

    /// Persist a new record. Job ids are single-shot: an existing record
    /// with the same id is an error.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on a duplicate id, IO/serde errors otherwise.
    pub fn create(&self, record: &JobRecord) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.record_path(&record.id);
        if path.exists() {
            return Err(PipelineError::InvalidInput(format!(
                "job id '{}' already exists",
                record.id
            )));
        }
        self.write_record(record)
    }

    /// Read a record; `None` when the id is unknown
    ///
    /// # Errors
    ///
    /// IO errors other than not-found, and parse failures.
    pub fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        match std::fs::read(self.record_path(job_id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All records, newest first
    ///
    /// # Errors
    ///
    /// Propagates directory listing failures; unreadable records are skipped.
    pub fn list(&self) -> Result<Vec<JobRecord>> {
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.jobs_dir)? {
            let entry = entry?;
            if entry.path().extension().is_some_and(|e| e == "json") {
                match std::fs::read(entry.path())
                    .map_err(PipelineError::from)
                    .and_then(|b| Ok(serde_json::from_slice::<JobRecord>(&b)?))
                {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Skipping unreadable job record {:?}: {e}", entry.path()),
                }
            }
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Atomically mutate a record.
    ///
    /// The mutation is dropped (with a warning) when the stored record is
    /// already terminal, so SUCCESS/FAILURE can never be overwritten; the
    /// stored record is returned either way.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for unknown ids, IO/serde errors otherwise.
    pub fn update(&self, job_id: &str, mutate: impl FnOnce(&mut JobRecord)) -> Result<JobRecord> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut record = self
            .get(job_id)?
            .ok_or_else(|| PipelineError::InvalidInput(format!("unknown job id '{job_id}'")))?;

        if record.status.is_terminal() {
            warn!(
                "Ignoring update to job {job_id}: already terminal ({:?})",
                record.status
            );
            return Ok(record);
        }

        mutate(&mut record);
        self.write_record(&record)?;
        Ok(record)
    }

    /// Record a status transition with an optional stage label
    ///
    /// # Errors
    ///
    /// Same as [`JobStore::update`].
    pub fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        stage_message: Option<&str>,
    ) -> Result<JobRecord> {
        self.update(job_id, |record| {
            record.status = status;
            record.stage_message = stage_message.map(str::to_string);
        })
    }

    /// Remove a record; unknown ids are a no-op
    ///
    /// # Errors
    ///
    /// IO errors other than not-found.
    pub fn delete(&self, job_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::remove_file(self.record_path(job_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Temp-file write plus rename; readers see old or new, never partial
    fn write_record(&self, record: &JobRecord) -> Result<()> {
        let path = self.record_path(&record.id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample(id: &str) -> JobRecord {
        JobRecord::new(
            id.to_string(),
            "owner-1".to_string(),
            PathBuf::from("/data/in"),
            PathBuf::from("/data/jobs"),
            50,
        )
    }

    #[test]
    fn test_create_get_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let store = JobStore::open(root.path()).unwrap();
        store.create(&sample("a")).unwrap();

        let record = store.get("a").unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let root = tempfile::tempdir().unwrap();
        let store = JobStore::open(root.path()).unwrap();
        store.create(&sample("a")).unwrap();
        assert!(matches!(
            store.create(&sample("a")),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let root = tempfile::tempdir().unwrap();
        let store = JobStore::open(root.path()).unwrap();
        store.create(&sample("a")).unwrap();

        store
            .set_status("a", JobStatus::Failure, Some("stage 3 broke"))
            .unwrap();

        // A late PROGRESS write from a racing worker must not land.
        let record = store
            .set_status("a", JobStatus::Progress, Some("late update"))
            .unwrap();
        assert_eq!(record.status, JobStatus::Failure);
        assert_eq!(
            store.get("a").unwrap().unwrap().status,
            JobStatus::Failure
        );
    }

    #[test]
    fn test_status_sequence_persists() {
        let root = tempfile::tempdir().unwrap();
        let store = JobStore::open(root.path()).unwrap();
        store.create(&sample("a")).unwrap();

        for (status, msg) in [
            (JobStatus::Started, "Started processing"),
            (JobStatus::Progress, "Running feature extraction"),
            (JobStatus::Success, "done"),
        ] {
            store.set_status("a", status, Some(msg)).unwrap();
        }
        let record = store.get("a").unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Success);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let store = JobStore::open(root.path()).unwrap();
        store.create(&sample("a")).unwrap();
        store.delete("a").unwrap();
        store.delete("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn test_list_orders_newest_first() {
        let root = tempfile::tempdir().unwrap();
        let store = JobStore::open(root.path()).unwrap();
        let mut first = sample("first");
        first.created_at = chrono::Utc::now() - chrono::Duration::minutes(5);
        store.create(&first).unwrap();
        store.create(&sample("second")).unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "second");
    }
}
