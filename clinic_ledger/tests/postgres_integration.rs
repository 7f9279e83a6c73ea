//! Integration tests against PostgreSQL.
//!
//! Requires a database reachable through `DATABASE_URL` (defaults to the
//! local `clinic_test` database). Run with `cargo test -- --ignored`.

use chrono::{Duration, Utc};
use clinic_ledger::accounts::{Account, DoctorProfile, Identity, NewAccount, Role, VerificationStatus};
use clinic_ledger::appointment::{AppointmentStatus, NewAppointment};
use clinic_ledger::availability::AvailabilityWindow;
use clinic_ledger::config::CreditPolicy;
use clinic_ledger::db::{Database, DatabaseConfig};
use clinic_ledger::ledger::{EntryKind, Plan, StaticEntitlements};
use clinic_ledger::payout::{NewPayout, PayoutStatus};
use clinic_ledger::store::{ClinicStore, Mutation, PgClinicStore, Settlement, StoreError};
use clinic_ledger::verification::{ResubmitOutcome, RoleSelection};
use clinic_ledger::{ClinicEngine, ClinicError, ErrorKind};
use serial_test::serial;
use std::sync::Arc;
use uuid::Uuid;

/// Helper to create a migrated store
async fn setup_engine() -> (ClinicEngine, Arc<PgClinicStore>) {
    let db = Database::new(&DatabaseConfig::testing())
        .await
        .expect("Failed to create test database");
    db.migrate().await.expect("Failed to run migrations");

    let store = Arc::new(PgClinicStore::new(Arc::new(db.pool().clone())));
    let engine = ClinicEngine::new(store.clone(), CreditPolicy::default());
    (engine, store)
}

/// Unique external id so runs never collide
fn subject(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

fn profile() -> DoctorProfile {
    DoctorProfile {
        specialty: "Cardiology".to_string(),
        experience_years: 9,
        credential_url: "https://credentials.example.com/cardio.pdf".to_string(),
        description: "Interventional cardiologist, nine years in practice".to_string(),
    }
}

async fn account(store: &PgClinicStore, new: NewAccount) -> (Account, Identity) {
    let identity = Identity::new(new.external_id.clone());
    (store.insert_account(new).await.unwrap(), identity)
}

async fn assert_conserved(engine: &ClinicEngine, accounts: &[&Account]) {
    for account in accounts {
        let audit = engine.ledger.audit(account.id).await.unwrap();
        assert!(audit.is_consistent(), "{audit:?}");
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
#[serial]
async fn test_booking_cancel_round_trip() {
    let (engine, store) = setup_engine().await;
    let (patient, patient_id) = account(&store, NewAccount::patient(subject("pat"), "p@example.com")).await;
    let (doctor, _) = account(
        &store,
        NewAccount::doctor(subject("doc"), "d@example.com", profile(), VerificationStatus::Verified),
    )
    .await;

    engine
        .ledger
        .apply_entry(patient.id, 5, EntryKind::CreditPurchase, None)
        .await
        .unwrap();
    let charged = engine
        .ledger
        .deduct_credits_for_appointment(patient.id, doctor.id)
        .await
        .unwrap();
    assert_eq!(charged.credits, 3);

    let start = Utc::now() + Duration::days(1);
    let appointment = store
        .insert_appointment(NewAppointment {
            doctor_id: doctor.id,
            patient_id: patient.id,
            start_time: start,
            end_time: start + Duration::minutes(30),
            patient_description: None,
        })
        .await
        .unwrap();

    let cancelled = engine
        .appointments
        .cancel(appointment.id, Some(&patient_id))
        .await
        .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(engine.ledger.balance(patient.id).await.unwrap(), 5);
    assert_eq!(engine.ledger.balance(doctor.id).await.unwrap(), 0);

    let err = engine
        .appointments
        .cancel(appointment.id, Some(&patient_id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalTransition);
    assert_conserved(&engine, &[&patient, &doctor]).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
#[serial]
async fn test_allocation_once_per_period() {
    let (engine, store) = setup_engine().await;
    let (patient, _) = account(&store, NewAccount::patient(subject("pat"), "p@example.com")).await;
    let entitlements = StaticEntitlements::new();
    entitlements.grant(patient.id, Plan::Standard);

    let first = engine
        .ledger
        .allocate_monthly_credits(patient.clone(), &entitlements)
        .await;
    let second = engine.ledger.allocate_monthly_credits(first, &entitlements).await;

    assert_eq!(second.credits, 10);
    assert_eq!(engine.ledger.entries(patient.id, 10).await.unwrap().len(), 1);
    assert_conserved(&engine, &[&patient]).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
#[serial]
async fn test_concurrent_deductions_never_overdraw() {
    let (engine, store) = setup_engine().await;
    let (patient, _) = account(&store, NewAccount::patient(subject("pat"), "p@example.com")).await;
    let (doctor, _) = account(
        &store,
        NewAccount::doctor(subject("doc"), "d@example.com", profile(), VerificationStatus::Verified),
    )
    .await;
    engine
        .ledger
        .apply_entry(patient.id, 3, EntryKind::CreditPurchase, None)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let ledger = engine.ledger.clone();
        let (patient_id, doctor_id) = (patient.id, doctor.id);
        handles.push(tokio::spawn(async move {
            ledger.deduct_credits_for_appointment(patient_id, doctor_id).await
        }));
    }
    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(engine.ledger.balance(patient.id).await.unwrap(), 1);
    assert_conserved(&engine, &[&patient, &doctor]).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
#[serial]
async fn test_payout_approval() {
    let (engine, store) = setup_engine().await;
    let (admin, admin_id) = account(&store, NewAccount::admin(subject("adm"), "a@example.com")).await;
    let (doctor, _) = account(
        &store,
        NewAccount::doctor(subject("doc"), "d@example.com", profile(), VerificationStatus::Verified),
    )
    .await;
    engine
        .ledger
        .apply_entry(doctor.id, 10, EntryKind::AppointmentDeduction, None)
        .await
        .unwrap();
    let payout = store
        .insert_payout(NewPayout::new(doctor.id, 10, "doc@paypal.example"))
        .await
        .unwrap();

    let processed = engine.payouts.approve(Some(&admin_id), payout.id).await.unwrap();
    assert_eq!(processed.status, PayoutStatus::Processed);
    assert_eq!(processed.processed_by, Some(admin.id));
    assert_eq!(engine.ledger.balance(doctor.id).await.unwrap(), 0);

    let err = engine.payouts.approve(Some(&admin_id), payout.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_conserved(&engine, &[&doctor]).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
#[serial]
async fn test_verification_round_trip() {
    let (engine, store) = setup_engine().await;
    let (_, admin_id) = account(&store, NewAccount::admin(subject("adm"), "a@example.com")).await;
    let (newcomer, newcomer_id) =
        account(&store, NewAccount::unassigned(subject("new"), "n@example.com")).await;

    engine
        .verification
        .select_role(Some(&newcomer_id), RoleSelection::Doctor(profile()))
        .await
        .unwrap();
    engine
        .verification
        .update_doctor_status(
            Some(&admin_id),
            clinic_ledger::verification::DoctorStatusUpdate {
                doctor_id: Some(newcomer.id),
                status: "REJECTED".to_string(),
                suspend: false,
            },
        )
        .await
        .unwrap();

    let outcome = engine.verification.resubmit(Some(&newcomer_id)).await.unwrap();
    assert_eq!(outcome, ResubmitOutcome::RedirectToOnboarding);

    let reset = store.find_account(newcomer.id).await.unwrap().unwrap();
    assert_eq!(reset.role, Role::Unassigned);
    assert_eq!(reset.verification_status, Some(VerificationStatus::Pending));
    assert_eq!(reset.experience_years, 0);
    assert!(reset.specialty.is_none());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
#[serial]
async fn test_window_for_unknown_doctor_is_not_found() {
    let (_, store) = setup_engine().await;
    let start = Utc::now() + Duration::days(1);
    let window = AvailabilityWindow {
        id: Uuid::new_v4(),
        doctor_id: Uuid::new_v4(),
        start_time: start,
        end_time: start + Duration::hours(4),
    };

    let err = store
        .apply(Settlement::new("set_window").mutate(Mutation::ReplaceAvailability(window)))
        .await
        .unwrap_err();

    assert_eq!(ClinicError::from(err).kind(), ErrorKind::NotFound);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
#[serial]
async fn test_non_positive_payout_rejected_before_insert() {
    let (_, store) = setup_engine().await;
    let (doctor, _) = account(
        &store,
        NewAccount::doctor(subject("doc"), "d@example.com", profile(), VerificationStatus::Verified),
    )
    .await;

    let err = store
        .insert_payout(NewPayout::new(doctor.id, 0, "doc@paypal.example"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidColumn { column: "credits", .. }));
}
