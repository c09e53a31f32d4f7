//! Hospital patient-number settings.

use crate::context::HospitalContext;
use crate::error::ConfigError;
use crate::numbering::HospitalIdConfig;
use crate::repositories::RecordStore;
use crate::{CoreConfig, IntakeError, IntakeResult};
use std::sync::Arc;

/// Loads, previews and saves a hospital's [`HospitalIdConfig`].
#[derive(Clone)]
pub struct IdConfigService {
    cfg: Arc<CoreConfig>,
    store: Arc<dyn RecordStore>,
}

impl IdConfigService {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<dyn RecordStore>) -> Self {
        Self { cfg, store }
    }

    pub fn load(&self, ctx: &HospitalContext) -> IntakeResult<HospitalIdConfig> {
        self.store.read_hospital_id_config(ctx.hospital())
    }

    /// The display id the next automatic registration would receive.
    pub fn preview(&self, ctx: &HospitalContext) -> IntakeResult<String> {
        Ok(self.load(ctx)?.preview(ctx))
    }

    /// Saves new settings for the context's hospital, provisioning it if needed.
    ///
    /// The save races with registrations that bump `last_sequence_number` and with other
    /// administrators provisioning the same hospital, so it is an insert-if-absent or a
    /// compare-and-swap, retried like an allocation. An existing counter is never overwritten.
    ///
    /// # Errors
    ///
    /// - [`IntakeError::Config`] if the settings are invalid or would move
    ///   `last_sequence_number` backwards,
    /// - [`IntakeError::AllocationConflict`] if concurrent registrations kept winning.
    pub fn save(
        &self,
        ctx: &HospitalContext,
        config: HospitalIdConfig,
    ) -> IntakeResult<HospitalIdConfig> {
        config.validate()?;
        let hospital = ctx.hospital();
        let attempts = self.cfg.allocation_max_attempts();

        for attempt in 1..=attempts {
            let current = match self.store.read_hospital_id_config(hospital) {
                Ok(current) => current,
                Err(IntakeError::HospitalNotFound(_)) => {
                    if self.store.create_hospital_id_config(hospital, &config)? {
                        tracing::info!(
                            hospital = %hospital,
                            actor = ctx.actor_label(),
                            template = %config.format_template,
                            "provisioned patient id settings"
                        );
                        return Ok(config);
                    }
                    tracing::debug!(
                        hospital = %hospital,
                        attempt,
                        "hospital provisioned concurrently, retrying"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            if config.last_sequence_number < current.last_sequence_number {
                return Err(ConfigError::SequenceRegression {
                    current: current.last_sequence_number,
                    requested: config.last_sequence_number,
                }
                .into());
            }

            if self.store.compare_and_swap_id_config(
                hospital,
                current.last_sequence_number,
                &config,
            )? {
                tracing::info!(
                    hospital = %hospital,
                    actor = ctx.actor_label(),
                    template = %config.format_template,
                    auto_increment = config.auto_increment,
                    "saved patient id settings"
                );
                return Ok(config);
            }

            tracing::debug!(hospital = %hospital, attempt, "settings save raced a registration, retrying");
        }

        Err(IntakeError::AllocationConflict { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HospitalKey;
    use crate::classification::PriorityLevel;
    use crate::flow::FlowStep;
    use crate::numbering::{IdFormatTemplate, PatientIdAllocator};
    use crate::patient::{NewPatient, Patient};
    use crate::repositories::memory::InMemoryStore;
    use crate::uuid::PatientRecordId;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn ctx() -> HospitalContext {
        HospitalContext::new(HospitalKey::parse("stmarys").unwrap())
            .with_today(NaiveDate::from_ymd_opt(2026, 1, 15).unwrap())
    }

    fn service() -> IdConfigService {
        let cfg = Arc::new(CoreConfig::new("unused".into(), 5).unwrap());
        IdConfigService::new(cfg, Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn save_provisions_then_updates() {
        let service = service();
        assert!(matches!(
            service.load(&ctx()),
            Err(IntakeError::HospitalNotFound(_))
        ));

        service.save(&ctx(), HospitalIdConfig::default()).unwrap();
        assert_eq!(service.preview(&ctx()).unwrap(), "PT000001");

        let yearly = HospitalIdConfig {
            format_template: IdFormatTemplate::PrefixYearNumber,
            prefix: "MRN".into(),
            digit_width: 4,
            last_sequence_number: 99,
            auto_increment: true,
        };
        service.save(&ctx(), yearly.clone()).unwrap();
        assert_eq!(service.load(&ctx()).unwrap(), yearly);
        assert_eq!(service.preview(&ctx()).unwrap(), "MRN2026-0100");
    }

    #[test]
    fn save_rejects_invalid_settings() {
        let service = service();
        let err = service
            .save(
                &ctx(),
                HospitalIdConfig {
                    digit_width: 0,
                    ..HospitalIdConfig::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Config(ConfigError::DigitWidthOutOfRange { width: 0 })
        ));
        assert!(service.load(&ctx()).is_err());
    }

    #[test]
    fn save_refuses_to_move_sequence_backwards() {
        let service = service();
        service
            .save(
                &ctx(),
                HospitalIdConfig {
                    last_sequence_number: 50,
                    ..HospitalIdConfig::default()
                },
            )
            .unwrap();

        let err = service
            .save(&ctx(), HospitalIdConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Config(ConfigError::SequenceRegression {
                current: 50,
                requested: 0
            })
        ));
    }

    /// Reports the hospital as unprovisioned on the first read, while another administrator
    /// provisions it and a registration takes the first number.
    struct ProvisionedBehindOurBackStore {
        inner: InMemoryStore,
        raced: AtomicBool,
    }

    impl RecordStore for ProvisionedBehindOurBackStore {
        fn insert_patient(&self, new: NewPatient) -> IntakeResult<Patient> {
            self.inner.insert_patient(new)
        }
        fn read_patient(&self, id: &PatientRecordId) -> IntakeResult<Patient> {
            self.inner.read_patient(id)
        }
        fn update_patient_flow_step(
            &self,
            id: &PatientRecordId,
            step: FlowStep,
        ) -> IntakeResult<Patient> {
            self.inner.update_patient_flow_step(id, step)
        }
        fn update_patient_priority(
            &self,
            id: &PatientRecordId,
            priority: PriorityLevel,
        ) -> IntakeResult<Patient> {
            self.inner.update_patient_priority(id, priority)
        }
        fn read_hospital_id_config(&self, hospital: &HospitalKey) -> IntakeResult<HospitalIdConfig> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner
                    .create_hospital_id_config(hospital, &HospitalIdConfig::default())?;
                PatientIdAllocator::new(&self.inner, 5).allocate(&ctx(), None)?;
                return Err(IntakeError::HospitalNotFound(hospital.to_string()));
            }
            self.inner.read_hospital_id_config(hospital)
        }
        fn write_hospital_id_config(
            &self,
            hospital: &HospitalKey,
            config: &HospitalIdConfig,
        ) -> IntakeResult<()> {
            self.inner.write_hospital_id_config(hospital, config)
        }
        fn create_hospital_id_config(
            &self,
            hospital: &HospitalKey,
            config: &HospitalIdConfig,
        ) -> IntakeResult<bool> {
            self.inner.create_hospital_id_config(hospital, config)
        }
        fn compare_and_swap_id_config(
            &self,
            hospital: &HospitalKey,
            expected_last_sequence: u64,
            config: &HospitalIdConfig,
        ) -> IntakeResult<bool> {
            self.inner
                .compare_and_swap_id_config(hospital, expected_last_sequence, config)
        }
    }

    #[test]
    fn concurrent_provisioning_never_resets_the_counter() {
        let store = Arc::new(ProvisionedBehindOurBackStore {
            inner: InMemoryStore::new(),
            raced: AtomicBool::new(false),
        });
        let cfg = Arc::new(CoreConfig::new("unused".into(), 5).unwrap());
        let service = IdConfigService::new(cfg, store.clone());

        let err = service
            .save(&ctx(), HospitalIdConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Config(ConfigError::SequenceRegression {
                current: 1,
                requested: 0
            })
        ));

        let next = PatientIdAllocator::new(store.as_ref(), 5)
            .allocate(&ctx(), None)
            .unwrap();
        assert_eq!(next.display_id, "PT000002");
    }

    #[test]
    fn concurrent_provisioning_falls_back_to_compare_and_swap() {
        let store = Arc::new(ProvisionedBehindOurBackStore {
            inner: InMemoryStore::new(),
            raced: AtomicBool::new(false),
        });
        let cfg = Arc::new(CoreConfig::new("unused".into(), 5).unwrap());
        let service = IdConfigService::new(cfg, store.clone());

        let wanted = HospitalIdConfig {
            prefix: "MRN".into(),
            last_sequence_number: 10,
            ..HospitalIdConfig::default()
        };
        assert_eq!(service.save(&ctx(), wanted.clone()).unwrap(), wanted);
        assert_eq!(store.read_hospital_id_config(ctx().hospital()).unwrap(), wanted);
    }
}
