//! YAML record store on the local filesystem.
//!
//! Layout under the configured data directory:
//!
//! ```text
//! patients/<s1>/<s2>/<record-id>/patient.yaml
//! patients/<s1>/<s2>/<record-id>/patient.lock
//! hospitals/<hospital-key>/id_config.yaml
//! hospitals/<hospital-key>/id_config.lock
//! ```
//!
//! Files are replaced by writing a uniquely named temp file in the same directory and renaming
//! it over the original, so a reader never sees a half-written record. Read-modify-write
//! sequences hold an exclusive OS lock on the sibling `.lock` file, which serialises them across
//! threads, store instances and processes sharing the data directory.

use super::RecordStore;
use crate::classification::PriorityLevel;
use crate::constants::{
    ID_CONFIG_FILENAME, ID_CONFIG_LOCK_FILENAME, PATIENT_LOCK_FILENAME, PATIENT_YAML_FILENAME,
};
use crate::context::HospitalKey;
use crate::flow::FlowStep;
use crate::numbering::HospitalIdConfig;
use crate::patient::{NewPatient, Patient};
use crate::uuid::PatientRecordId;
use crate::{CoreConfig, IntakeError, IntakeResult};
use chrono::Utc;
use fs4::fs_std::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub struct FileStore {
    cfg: Arc<CoreConfig>,
}

impl FileStore {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    fn patient_dir(&self, id: &PatientRecordId) -> PathBuf {
        id.sharded_dir(&self.cfg.patients_dir())
    }

    fn patient_file(&self, id: &PatientRecordId) -> PathBuf {
        self.patient_dir(id).join(PATIENT_YAML_FILENAME)
    }

    fn hospital_dir(&self, hospital: &HospitalKey) -> PathBuf {
        self.cfg.hospitals_dir().join(hospital.as_str())
    }

    fn id_config_file(&self, hospital: &HospitalKey) -> PathBuf {
        self.hospital_dir(hospital).join(ID_CONFIG_FILENAME)
    }

    fn load_patient(&self, id: &PatientRecordId) -> IntakeResult<Patient> {
        read_yaml(&self.patient_file(id))?.ok_or_else(|| IntakeError::PatientNotFound(id.to_string()))
    }

    fn load_id_config(&self, hospital: &HospitalKey) -> IntakeResult<HospitalIdConfig> {
        read_yaml(&self.id_config_file(hospital))?
            .ok_or_else(|| IntakeError::HospitalNotFound(hospital.to_string()))
    }

    /// Locks the hospital's numbering settings, creating its directory first.
    fn lock_hospital(&self, hospital: &HospitalKey) -> IntakeResult<File> {
        let dir = self.hospital_dir(hospital);
        fs::create_dir_all(&dir).map_err(IntakeError::StorageDirCreation)?;
        lock_exclusive(&dir.join(ID_CONFIG_LOCK_FILENAME))
    }

    /// Locks the numbering settings of a hospital that must already be provisioned.
    fn lock_provisioned_hospital(&self, hospital: &HospitalKey) -> IntakeResult<File> {
        let dir = self.hospital_dir(hospital);
        if !dir.is_dir() {
            return Err(IntakeError::HospitalNotFound(hospital.to_string()));
        }
        lock_exclusive(&dir.join(ID_CONFIG_LOCK_FILENAME))
    }

    fn update_patient(
        &self,
        id: &PatientRecordId,
        apply: impl FnOnce(&mut Patient),
    ) -> IntakeResult<Patient> {
        let dir = self.patient_dir(id);
        if !dir.is_dir() {
            return Err(IntakeError::PatientNotFound(id.to_string()));
        }
        let _lock = lock_exclusive(&dir.join(PATIENT_LOCK_FILENAME))?;
        let mut patient = self.load_patient(id)?;
        apply(&mut patient);
        patient.updated_at = Utc::now();
        write_yaml(&self.patient_file(id), &patient)?;
        Ok(patient)
    }
}

impl RecordStore for FileStore {
    fn insert_patient(&self, new: NewPatient) -> IntakeResult<Patient> {
        let patients_dir = self.cfg.patients_dir();
        fs::create_dir_all(&patients_dir).map_err(IntakeError::StorageDirCreation)?;

        let (id, record_dir) = create_record_dir(&patients_dir, PatientRecordId::new)?;
        let patient = new.into_patient(id, Utc::now());

        if let Err(e) = write_yaml(&record_dir.join(PATIENT_YAML_FILENAME), &patient) {
            if let Err(cleanup) = fs::remove_dir_all(&record_dir) {
                tracing::warn!(
                    path = %record_dir.display(),
                    error = %cleanup,
                    "failed to remove partially created patient directory"
                );
            }
            return Err(e);
        }

        tracing::debug!(patient_id = %patient.id, "stored patient record");
        Ok(patient)
    }

    fn read_patient(&self, id: &PatientRecordId) -> IntakeResult<Patient> {
        self.load_patient(id)
    }

    fn update_patient_flow_step(
        &self,
        id: &PatientRecordId,
        step: FlowStep,
    ) -> IntakeResult<Patient> {
        self.update_patient(id, |p| p.current_flow_step = step)
    }

    fn update_patient_priority(
        &self,
        id: &PatientRecordId,
        priority: PriorityLevel,
    ) -> IntakeResult<Patient> {
        self.update_patient(id, |p| p.priority_level = priority)
    }

    fn read_hospital_id_config(&self, hospital: &HospitalKey) -> IntakeResult<HospitalIdConfig> {
        self.load_id_config(hospital)
    }

    fn write_hospital_id_config(
        &self,
        hospital: &HospitalKey,
        config: &HospitalIdConfig,
    ) -> IntakeResult<()> {
        let _lock = self.lock_hospital(hospital)?;
        write_yaml(&self.id_config_file(hospital), config)
    }

    fn create_hospital_id_config(
        &self,
        hospital: &HospitalKey,
        config: &HospitalIdConfig,
    ) -> IntakeResult<bool> {
        let _lock = self.lock_hospital(hospital)?;
        let path = self.id_config_file(hospital);
        if path.exists() {
            return Ok(false);
        }
        write_yaml(&path, config)?;
        Ok(true)
    }

    fn compare_and_swap_id_config(
        &self,
        hospital: &HospitalKey,
        expected_last_sequence: u64,
        config: &HospitalIdConfig,
    ) -> IntakeResult<bool> {
        let _lock = self.lock_provisioned_hospital(hospital)?;
        let current = self.load_id_config(hospital)?;
        if current.last_sequence_number != expected_last_sequence {
            return Ok(false);
        }
        write_yaml(&self.id_config_file(hospital), config)?;
        Ok(true)
    }
}

/// Opens `path` (creating it if needed) and blocks until this handle holds an exclusive lock on
/// it. The lock is released when the returned file is dropped.
fn lock_exclusive(path: &Path) -> IntakeResult<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(IntakeError::StoreLock)?;
    FileExt::lock_exclusive(&file).map_err(IntakeError::StoreLock)?;
    Ok(file)
}

/// Creates a fresh sharded directory for a new patient record.
///
/// Ids come from `id_source`. An id whose directory already exists (a collision, or a leftover
/// from outside interference) is skipped, up to 5 attempts.
///
/// # Errors
///
/// Returns [`IntakeError::PatientDirCreation`] if directory creation fails or no free id was
/// found after 5 attempts.
fn create_record_dir(
    patients_dir: &Path,
    mut id_source: impl FnMut() -> PatientRecordId,
) -> IntakeResult<(PatientRecordId, PathBuf)> {
    for _attempt in 0..5 {
        let id = id_source();
        let candidate = id.sharded_dir(patients_dir);

        if candidate.exists() {
            continue;
        }

        if let Some(parent) = candidate.parent() {
            fs::create_dir_all(parent).map_err(IntakeError::PatientDirCreation)?;
        }

        match fs::create_dir(&candidate) {
            Ok(()) => return Ok((id, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(IntakeError::PatientDirCreation(e)),
        }
    }

    Err(IntakeError::PatientDirCreation(io::Error::new(
        ErrorKind::AlreadyExists,
        "failed to allocate a unique patient directory after 5 attempts",
    )))
}

/// Reads a YAML file, returning `None` if it does not exist.
fn read_yaml<T: DeserializeOwned>(path: &Path) -> IntakeResult<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IntakeError::FileRead(e)),
    };
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(IntakeError::YamlDeserialization)
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> IntakeResult<()> {
    let yaml = serde_yaml::to_string(value).map_err(IntakeError::YamlSerialization)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(IntakeError::FileWrite)?;
    tmp.write_all(yaml.as_bytes()).map_err(IntakeError::FileWrite)?;
    tmp.persist(path)
        .map_err(|e| IntakeError::FileWrite(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::RegistrationCategory;
    use crate::context::HospitalContext;
    use crate::numbering::PatientIdAllocator;
    use crate::patient::PersonalDetails;
    use crate::validation::PaymentDetails;
    use crate::NonEmptyText;
    use tempfile::TempDir;

    fn test_cfg(data_dir: &Path) -> Arc<CoreConfig> {
        Arc::new(CoreConfig::new(data_dir.to_path_buf(), 5).unwrap())
    }

    fn hospital() -> HospitalKey {
        HospitalKey::parse("stmarys").unwrap()
    }

    fn new_patient() -> NewPatient {
        NewPatient {
            hospital: hospital(),
            display_id: "PT000001".into(),
            sequence_number: 1,
            registration_category: RegistrationCategory::Returning,
            priority_level: PriorityLevel::Urgent,
            current_flow_step: FlowStep::Registration,
            personal: PersonalDetails {
                first_name: NonEmptyText::new("Grace").unwrap(),
                last_name: NonEmptyText::new("Hopper").unwrap(),
                date_of_birth: None,
                gender: None,
                contact_number: NonEmptyText::from_optional(Some("0123")),
                email: None,
                address: None,
                emergency_contact: None,
            },
            payment: PaymentDetails::Cash,
            registered_by: None,
        }
    }

    #[test]
    fn test_insert_writes_sharded_yaml_and_reads_back() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(test_cfg(temp_dir.path()));

        let patient = store.insert_patient(new_patient()).unwrap();
        let expected = patient
            .id
            .sharded_dir(&temp_dir.path().join("patients"))
            .join("patient.yaml");
        assert!(expected.is_file());

        let yaml = fs::read_to_string(&expected).unwrap();
        assert!(yaml.contains("displayId: PT000001"));
        assert!(yaml.contains("currentFlowStep: registration"));

        assert_eq!(store.read_patient(&patient.id).unwrap(), patient);
    }

    #[test]
    fn test_records_survive_a_new_store_instance() {
        let temp_dir = TempDir::new().unwrap();
        let patient = FileStore::new(test_cfg(temp_dir.path()))
            .insert_patient(new_patient())
            .unwrap();

        let reopened = FileStore::new(test_cfg(temp_dir.path()));
        assert_eq!(reopened.read_patient(&patient.id).unwrap(), patient);
    }

    #[test]
    fn test_updates_change_step_priority_and_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(test_cfg(temp_dir.path()));
        let patient = store.insert_patient(new_patient()).unwrap();

        store
            .update_patient_flow_step(&patient.id, FlowStep::Triage)
            .unwrap();
        let updated = store
            .update_patient_priority(&patient.id, PriorityLevel::Critical)
            .unwrap();

        assert_eq!(updated.current_flow_step, FlowStep::Triage);
        assert_eq!(updated.priority_level, PriorityLevel::Critical);
        assert_eq!(updated.created_at, patient.created_at);
        assert!(updated.updated_at >= patient.updated_at);
        assert_eq!(store.read_patient(&patient.id).unwrap(), updated);
    }

    #[test]
    fn test_missing_records_are_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(test_cfg(temp_dir.path()));

        assert!(matches!(
            store.read_patient(&PatientRecordId::new()),
            Err(IntakeError::PatientNotFound(_))
        ));
        assert!(matches!(
            store.update_patient_flow_step(&PatientRecordId::new(), FlowStep::Triage),
            Err(IntakeError::PatientNotFound(_))
        ));
        assert!(matches!(
            store.read_hospital_id_config(&hospital()),
            Err(IntakeError::HospitalNotFound(_))
        ));
    }

    #[test]
    fn test_corrupt_patient_file_is_a_deserialization_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(test_cfg(temp_dir.path()));
        let patient = store.insert_patient(new_patient()).unwrap();

        fs::write(store.patient_file(&patient.id), "displayId: [unterminated").unwrap();
        assert!(matches!(
            store.read_patient(&patient.id),
            Err(IntakeError::YamlDeserialization(_))
        ));
    }

    #[test]
    fn test_id_config_compare_and_swap() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(test_cfg(temp_dir.path()));
        store
            .write_hospital_id_config(&hospital(), &HospitalIdConfig::default())
            .unwrap();
        assert!(temp_dir
            .path()
            .join("hospitals/stmarys/id_config.yaml")
            .is_file());

        let next = HospitalIdConfig {
            last_sequence_number: 1,
            ..HospitalIdConfig::default()
        };
        assert!(!store.compare_and_swap_id_config(&hospital(), 3, &next).unwrap());
        assert!(store.compare_and_swap_id_config(&hospital(), 0, &next).unwrap());
        assert_eq!(store.read_hospital_id_config(&hospital()).unwrap(), next);
    }

    #[test]
    fn test_concurrent_allocation_against_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(test_cfg(temp_dir.path()));
        store
            .write_hospital_id_config(&hospital(), &HospitalIdConfig::default())
            .unwrap();
        let ctx = HospitalContext::new(hospital());

        let mut ids: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        let allocator = PatientIdAllocator::new(&store, 100);
                        (0..10)
                            .map(|_| allocator.allocate(&ctx, None).unwrap().display_id)
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 40);
        assert_eq!(ids.first().map(String::as_str), Some("PT000001"));
        assert_eq!(ids.last().map(String::as_str), Some("PT000040"));
    }

    #[test]
    fn test_separate_store_instances_share_one_counter() {
        let temp_dir = TempDir::new().unwrap();
        FileStore::new(test_cfg(temp_dir.path()))
            .write_hospital_id_config(&hospital(), &HospitalIdConfig::default())
            .unwrap();
        let ctx = HospitalContext::new(hospital());
        let stores: Vec<FileStore> = (0..4)
            .map(|_| FileStore::new(test_cfg(temp_dir.path())))
            .collect();

        let mut sequences: Vec<u64> = std::thread::scope(|s| {
            let handles: Vec<_> = stores
                .iter()
                .map(|store| {
                    let ctx = &ctx;
                    s.spawn(move || {
                        let allocator = PatientIdAllocator::new(store, 1_000);
                        (0..25)
                            .map(|_| allocator.allocate(ctx, None).unwrap().sequence_number)
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        sequences.sort_unstable();
        assert_eq!(sequences, (1..=100).collect::<Vec<u64>>());
        assert_eq!(
            stores[0]
                .read_hospital_id_config(&hospital())
                .unwrap()
                .last_sequence_number,
            100
        );

        let leftovers: Vec<_> = fs::read_dir(temp_dir.path().join("hospitals/stmarys"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 2, "unexpected files: {leftovers:?}");
    }

    #[test]
    fn test_create_id_config_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(test_cfg(temp_dir.path()));
        let provisioned = HospitalIdConfig {
            last_sequence_number: 12,
            ..HospitalIdConfig::default()
        };

        assert!(store.create_hospital_id_config(&hospital(), &provisioned).unwrap());
        assert!(!store
            .create_hospital_id_config(&hospital(), &HospitalIdConfig::default())
            .unwrap());
        assert_eq!(store.read_hospital_id_config(&hospital()).unwrap(), provisioned);
    }

    #[test]
    fn test_compare_and_swap_on_unknown_hospital_creates_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(test_cfg(temp_dir.path()));

        assert!(matches!(
            store.compare_and_swap_id_config(&hospital(), 0, &HospitalIdConfig::default()),
            Err(IntakeError::HospitalNotFound(_))
        ));
        assert!(!temp_dir.path().join("hospitals/stmarys").exists());
    }

    #[test]
    fn test_create_record_dir_retries_on_collision() {
        let temp_dir = TempDir::new().unwrap();
        let taken = PatientRecordId::parse("00112233445566778899aabbccddeeff").unwrap();
        let free = PatientRecordId::parse("ffeeddccbbaa99887766554433221100").unwrap();
        fs::create_dir_all(taken.sharded_dir(temp_dir.path())).unwrap();

        let mut ids = vec![free.clone(), taken].into_iter().rev();
        let (id, dir) =
            create_record_dir(temp_dir.path(), || ids.next().unwrap()).unwrap();
        assert_eq!(id, free);
        assert!(dir.is_dir());
    }

    #[test]
    fn test_create_record_dir_gives_up_after_five_collisions() {
        let temp_dir = TempDir::new().unwrap();
        let taken = PatientRecordId::parse("00112233445566778899aabbccddeeff").unwrap();
        fs::create_dir_all(taken.sharded_dir(temp_dir.path())).unwrap();

        let err = create_record_dir(temp_dir.path(), || taken.clone()).unwrap_err();
        assert!(matches!(err, IntakeError::PatientDirCreation(_)));
    }
}
