//! Shared fixtures for the in-memory integration suites.
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use clinic_ledger::accounts::{Account, AccountId, DoctorProfile, Identity, NewAccount, VerificationStatus};
use clinic_ledger::appointment::{Appointment, NewAppointment};
use clinic_ledger::config::CreditPolicy;
use clinic_ledger::ledger::EntryKind;
use clinic_ledger::store::{ClinicStore, MemoryClinicStore};
use clinic_ledger::ClinicEngine;
use std::sync::Arc;

pub const ADMIN: &str = "ext_admin";
pub const DOCTOR: &str = "ext_doctor";
pub const PATIENT: &str = "ext_patient";

pub struct Clinic {
    pub engine: ClinicEngine,
    pub store: Arc<MemoryClinicStore>,
    pub admin: Account,
    pub doctor: Account,
    pub patient: Account,
}

pub fn identity(subject: &str) -> Option<Identity> {
    Some(Identity::new(subject))
}

pub fn doctor_profile(specialty: &str) -> DoctorProfile {
    DoctorProfile {
        specialty: specialty.to_string(),
        experience_years: 5,
        credential_url: "https://credentials.example.com/license.pdf".to_string(),
        description: "General practitioner with five years of clinic experience".to_string(),
    }
}

/// Admin, verified doctor and patient, all at zero credits
pub async fn clinic() -> Clinic {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = Arc::new(MemoryClinicStore::new());
    let engine = ClinicEngine::new(store.clone(), CreditPolicy::default());

    let admin = store
        .insert_account(NewAccount::admin(ADMIN, "admin@clinic.example").with_name("Ada Admin"))
        .await
        .unwrap();
    let doctor = store
        .insert_account(
            NewAccount::doctor(
                DOCTOR,
                "doctor@clinic.example",
                doctor_profile("General Practice"),
                VerificationStatus::Verified,
            )
            .with_name("Dr. Grey"),
        )
        .await
        .unwrap();
    let patient = store
        .insert_account(NewAccount::patient(PATIENT, "patient@clinic.example").with_name("Pat"))
        .await
        .unwrap();

    Clinic {
        engine,
        store,
        admin,
        doctor,
        patient,
    }
}

impl Clinic {
    /// Give an account credits through the ledger
    pub async fn fund(&self, account: AccountId, credits: i64) {
        self.engine
            .ledger
            .apply_entry(account, credits, EntryKind::CreditPurchase, None)
            .await
            .unwrap();
    }

    pub async fn credits(&self, account: AccountId) -> i64 {
        self.engine.ledger.balance(account).await.unwrap()
    }

    /// Charge the patient and create the SCHEDULED appointment, as the booking flow does
    pub async fn book(&self, start_time: DateTime<Utc>) -> Appointment {
        self.engine
            .ledger
            .deduct_credits_for_appointment(self.patient.id, self.doctor.id)
            .await
            .unwrap();
        self.store
            .insert_appointment(NewAppointment {
                doctor_id: self.doctor.id,
                patient_id: self.patient.id,
                start_time,
                end_time: start_time + Duration::minutes(30),
                patient_description: Some("Recurring headaches".to_string()),
            })
            .await
            .unwrap()
    }

    /// Every account's cached balance must equal its ledger sum
    pub async fn assert_conserved(&self) {
        for account in [&self.admin, &self.doctor, &self.patient] {
            let audit = self.engine.ledger.audit(account.id).await.unwrap();
            assert!(
                audit.is_consistent(),
                "Account {} drifted: cached {}, ledger {}",
                account.id,
                audit.cached,
                audit.recomputed
            );
        }
    }
}
