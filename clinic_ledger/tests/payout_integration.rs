//! Integration tests for payout approval.

mod common;

use clinic_ledger::ledger::EntryKind;
use clinic_ledger::payout::{NewPayout, PayoutStatus};
use clinic_ledger::store::{ClinicStore, StoreError};
use clinic_ledger::{ClinicError, ErrorKind};
use common::{ADMIN, DOCTOR, PATIENT, clinic, identity};

#[tokio::test]
async fn test_approve_debits_doctor_and_closes_request() {
    let clinic = clinic().await;
    clinic.fund(clinic.doctor.id, 10).await;
    let payout = clinic
        .store
        .insert_payout(NewPayout::new(clinic.doctor.id, 10, "doctor@paypal.example"))
        .await
        .unwrap();

    let processed = clinic
        .engine
        .payouts
        .approve(identity(ADMIN).as_ref(), payout.id)
        .await
        .unwrap();

    assert_eq!(processed.status, PayoutStatus::Processed);
    assert_eq!(processed.processed_by, Some(clinic.admin.id));
    assert!(processed.processed_at.is_some());
    assert_eq!(processed.gross_amount, 10_000, "Amounts are never recomputed");
    assert_eq!(processed.net_amount, 8_000);
    assert_eq!(clinic.credits(clinic.doctor.id).await, 0);

    let debit = &clinic.engine.ledger.entries(clinic.doctor.id, 1).await.unwrap()[0];
    assert_eq!(debit.kind, EntryKind::AdminAdjustment);
    assert_eq!(debit.amount, -10);
    clinic.assert_conserved().await;

    let err = clinic
        .engine
        .payouts
        .approve(identity(ADMIN).as_ref(), payout.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(
        err.to_string(),
        "Not found: Payout request not found or already processed"
    );
    assert_eq!(clinic.credits(clinic.doctor.id).await, 0);
}

#[tokio::test]
async fn test_approve_with_insufficient_credits_changes_nothing() {
    let clinic = clinic().await;
    clinic.fund(clinic.doctor.id, 4).await;
    let payout = clinic
        .store
        .insert_payout(NewPayout::new(clinic.doctor.id, 6, "doctor@paypal.example"))
        .await
        .unwrap();

    let err = clinic
        .engine
        .payouts
        .approve(identity(ADMIN).as_ref(), payout.id)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClinicError::InsufficientCredits {
            available: 4,
            required: 6
        }
    ));
    let stored = clinic.store.find_payout(payout.id, None).await.unwrap().unwrap();
    assert_eq!(stored.status, PayoutStatus::Processing);
    assert_eq!(stored.processed_by, None);
    assert_eq!(clinic.credits(clinic.doctor.id).await, 4);
    clinic.assert_conserved().await;
}

#[tokio::test]
async fn test_approve_requires_admin() {
    let clinic = clinic().await;
    clinic.fund(clinic.doctor.id, 3).await;
    let payout = clinic
        .store
        .insert_payout(NewPayout::new(clinic.doctor.id, 3, "doctor@paypal.example"))
        .await
        .unwrap();

    for caller in [None, identity(DOCTOR), identity(PATIENT)] {
        let err = clinic
            .engine
            .payouts
            .approve(caller.as_ref(), payout.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
    assert_eq!(clinic.credits(clinic.doctor.id).await, 3);
}

#[tokio::test]
async fn test_concurrent_approvals_settle_once() {
    let clinic = clinic().await;
    clinic.fund(clinic.doctor.id, 20).await;
    let payout = clinic
        .store
        .insert_payout(NewPayout::new(clinic.doctor.id, 10, "doctor@paypal.example"))
        .await
        .unwrap();

    let payout_id = payout.id;
    let mut handles = Vec::new();
    for _ in 0..3 {
        let payouts = clinic.engine.payouts.clone();
        let admin = identity(ADMIN);
        handles.push(tokio::spawn(async move {
            payouts.approve(admin.as_ref(), payout_id).await
        }));
    }

    let mut approved = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            approved += 1;
        }
    }

    assert_eq!(approved, 1);
    assert_eq!(clinic.credits(clinic.doctor.id).await, 10);
    clinic.assert_conserved().await;
}

#[tokio::test]
async fn test_pending_listing_and_doctor_history() {
    let clinic = clinic().await;
    clinic.fund(clinic.doctor.id, 10).await;
    let first = clinic
        .store
        .insert_payout(NewPayout::new(clinic.doctor.id, 2, "doctor@paypal.example"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let second = clinic
        .store
        .insert_payout(NewPayout::new(clinic.doctor.id, 3, "doctor@paypal.example"))
        .await
        .unwrap();
    clinic
        .engine
        .payouts
        .approve(identity(ADMIN).as_ref(), first.id)
        .await
        .unwrap();

    let pending = clinic
        .engine
        .payouts
        .list_pending(identity(ADMIN).as_ref())
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payout.id, second.id);
    assert_eq!(pending[0].doctor.id, clinic.doctor.id);
    assert_eq!(pending[0].doctor.email, "doctor@clinic.example");
    assert_eq!(pending[0].doctor.specialty.as_deref(), Some("General Practice"));
    assert_eq!(pending[0].doctor.credits, 8);

    let history = clinic
        .engine
        .payouts
        .doctor_payouts(identity(DOCTOR).as_ref())
        .await
        .unwrap();
    let ids: Vec<_> = history.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![second.id, first.id], "Newest first");

    let err = clinic
        .engine
        .payouts
        .list_pending(identity(DOCTOR).as_ref())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_non_positive_payout_requests_are_refused() {
    let clinic = clinic().await;
    clinic.fund(clinic.doctor.id, 5).await;

    for credits in [0, -5, i64::MAX] {
        let err = clinic
            .store
            .insert_payout(NewPayout::new(clinic.doctor.id, credits, "doctor@paypal.example"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidColumn { column: "credits", .. }));
    }

    let history = clinic
        .engine
        .payouts
        .doctor_payouts(identity(DOCTOR).as_ref())
        .await
        .unwrap();
    assert!(history.is_empty());
    assert_eq!(clinic.credits(clinic.doctor.id).await, 5);
    clinic.assert_conserved().await;
}
