//! PostgreSQL store.
//!
//! A settlement runs inside one `sqlx` transaction: guards lock the rows they
//! read with `FOR UPDATE`, balance changes are in-place increments, and any
//! early return drops the transaction, which rolls it back.
#![allow(clippy::needless_raw_string_hashes)]

use super::{
    ClinicStore, Guard, Mutation, Rejection, Settlement, SettlementReceipt, StoreError,
    StoreResult, parse_column,
};
use crate::accounts::{Account, AccountId, DoctorFilter, DoctorOrder, NewAccount, Role, VerificationStatus};
use crate::appointment::{Appointment, AppointmentFilter, AppointmentId, AppointmentStatus, NewAppointment};
use crate::availability::AvailabilityWindow;
use crate::ledger::{LedgerEntry, already_allocated};
use crate::payout::{NewPayout, Payout, PayoutFilter, PayoutId, PayoutStatus};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = "id, external_id, name, email, role, credits, specialty, experience_years, \
     credential_url, description, verification_status, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, owner_id, amount, kind, plan_id, created_at";

const APPOINTMENT_COLUMNS: &str = "id, doctor_id, patient_id, start_time, end_time, status, notes, \
     patient_description, created_at, updated_at";

const PAYOUT_COLUMNS: &str = "id, doctor_id, credits, gross_amount_cents, platform_fee_cents, \
     net_amount_cents, paypal_email, status, created_at, processed_at, processed_by";

fn account_from_row(row: &PgRow) -> StoreResult<Account> {
    Ok(Account {
        id: row.get("id"),
        external_id: row.get("external_id"),
        name: row.get("name"),
        email: row.get("email"),
        role: parse_column("role", row.get("role"))?,
        credits: row.get("credits"),
        specialty: row.get("specialty"),
        experience_years: row.get("experience_years"),
        credential_url: row.get("credential_url"),
        description: row.get("description"),
        verification_status: row
            .get::<Option<String>, _>("verification_status")
            .map(|status| parse_column("verification_status", status))
            .transpose()?,
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<NaiveDateTime, _>("updated_at").and_utc(),
    })
}

fn entry_from_row(row: &PgRow) -> StoreResult<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        amount: row.get("amount"),
        kind: parse_column("kind", row.get("kind"))?,
        plan_id: row.get("plan_id"),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
    })
}

fn appointment_from_row(row: &PgRow) -> StoreResult<Appointment> {
    Ok(Appointment {
        id: row.get("id"),
        doctor_id: row.get("doctor_id"),
        patient_id: row.get("patient_id"),
        start_time: row.get::<NaiveDateTime, _>("start_time").and_utc(),
        end_time: row.get::<NaiveDateTime, _>("end_time").and_utc(),
        status: parse_column("status", row.get("status"))?,
        notes: row.get("notes"),
        patient_description: row.get("patient_description"),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<NaiveDateTime, _>("updated_at").and_utc(),
    })
}

fn payout_from_row(row: &PgRow) -> StoreResult<Payout> {
    Ok(Payout {
        id: row.get("id"),
        doctor_id: row.get("doctor_id"),
        credits: row.get("credits"),
        gross_amount: row.get("gross_amount_cents"),
        platform_fee: row.get("platform_fee_cents"),
        net_amount: row.get("net_amount_cents"),
        paypal_email: row.get("paypal_email"),
        status: parse_column("status", row.get("status"))?,
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        processed_at: row
            .get::<Option<NaiveDateTime>, _>("processed_at")
            .map(|dt| dt.and_utc()),
        processed_by: row.get("processed_by"),
    })
}

fn window_from_row(row: &PgRow) -> AvailabilityWindow {
    AvailabilityWindow {
        id: row.get("id"),
        doctor_id: row.get("doctor_id"),
        start_time: row.get::<NaiveDateTime, _>("start_time").and_utc(),
        end_time: row.get::<NaiveDateTime, _>("end_time").and_utc(),
    }
}

fn ensure_affected(rows: u64, entity: &'static str, id: Uuid) -> StoreResult<()> {
    if rows == 0 {
        return Err(StoreError::MissingRow { entity, id });
    }
    Ok(())
}

/// PostgreSQL implementation of [`ClinicStore`]
#[derive(Clone)]
pub struct PgClinicStore {
    pool: Arc<PgPool>,
}

impl PgClinicStore {
    /// Create a new store over a connection pool
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn check_guard(&self, tx: &mut Transaction<'_, Postgres>, guard: &Guard) -> StoreResult<()> {
        let rejection = match guard {
            Guard::MinimumBalance { account, required } => {
                let row = sqlx::query("SELECT credits FROM accounts WHERE id = $1 FOR UPDATE")
                    .bind(account)
                    .fetch_optional(&mut **tx)
                    .await?;
                match row {
                    None => Some(Rejection::MissingAccount(*account)),
                    Some(row) => {
                        let available: i64 = row.get("credits");
                        (available < *required).then(|| Rejection::InsufficientBalance {
                            account: *account,
                            available,
                            required: *required,
                        })
                    }
                }
            }
            Guard::AppointmentStatus {
                appointment,
                expected,
            } => {
                let actual = sqlx::query("SELECT status FROM appointments WHERE id = $1 FOR UPDATE")
                    .bind(appointment)
                    .fetch_optional(&mut **tx)
                    .await?
                    .map(|row| parse_column::<AppointmentStatus>("status", row.get("status")))
                    .transpose()?;
                (actual != Some(*expected)).then(|| Rejection::AppointmentStatus {
                    appointment: *appointment,
                    actual,
                })
            }
            Guard::PayoutStatus { payout, expected } => {
                let actual = sqlx::query("SELECT status FROM payouts WHERE id = $1 FOR UPDATE")
                    .bind(payout)
                    .fetch_optional(&mut **tx)
                    .await?
                    .map(|row| parse_column::<PayoutStatus>("status", row.get("status")))
                    .transpose()?;
                (actual != Some(*expected)).then(|| Rejection::PayoutStatus {
                    payout: *payout,
                    actual,
                })
            }
            Guard::AccountRole { account, role } => {
                let actual = sqlx::query("SELECT role FROM accounts WHERE id = $1 FOR UPDATE")
                    .bind(account)
                    .fetch_optional(&mut **tx)
                    .await?
                    .map(|row| parse_column::<Role>("role", row.get("role")))
                    .transpose()?;
                (actual != Some(*role)).then(|| Rejection::AccountRole {
                    account: *account,
                    actual,
                })
            }
            Guard::AccountVerification { account, status } => {
                let actual = sqlx::query(
                    "SELECT verification_status FROM accounts WHERE id = $1 FOR UPDATE",
                )
                .bind(account)
                .fetch_optional(&mut **tx)
                .await?
                .and_then(|row| row.get::<Option<String>, _>("verification_status"))
                .map(|value| parse_column::<VerificationStatus>("verification_status", value))
                .transpose()?;
                (actual != Some(*status)).then(|| Rejection::AccountVerification {
                    account: *account,
                    actual,
                })
            }
            Guard::NotYetAllocated {
                account,
                plan_id,
                period,
            } => {
                // Locking the account row serializes concurrent allocations
                let exists = sqlx::query("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
                    .bind(account)
                    .fetch_optional(&mut **tx)
                    .await?;
                if exists.is_none() {
                    Some(Rejection::MissingAccount(*account))
                } else {
                    let latest = sqlx::query(&format!(
                        "SELECT {ENTRY_COLUMNS} FROM ledger_entries
                         WHERE owner_id = $1
                         ORDER BY created_at DESC, seq DESC
                         LIMIT 1"
                    ))
                    .bind(account)
                    .fetch_optional(&mut **tx)
                    .await?
                    .map(|row| entry_from_row(&row))
                    .transpose()?;
                    already_allocated(latest.as_ref(), plan_id, *period).then(|| {
                        Rejection::AlreadyAllocated {
                            account: *account,
                            plan_id: plan_id.clone(),
                        }
                    })
                }
            }
        };

        match rejection {
            Some(rejection) => Err(StoreError::Rejected(rejection)),
            None => Ok(()),
        }
    }

    async fn apply_mutation(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        mutation: Mutation,
        receipt: &mut SettlementReceipt,
    ) -> StoreResult<()> {
        match mutation {
            Mutation::Entry(entry) => {
                let balance: i64 = sqlx::query(
                    "UPDATE accounts
                     SET credits = credits + $1, updated_at = NOW()
                     WHERE id = $2
                     RETURNING credits",
                )
                .bind(entry.amount)
                .bind(entry.owner_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or(StoreError::MissingRow {
                    entity: "Account",
                    id: entry.owner_id,
                })?
                .get("credits");

                sqlx::query(
                    r#"
                    INSERT INTO ledger_entries (id, owner_id, amount, kind, plan_id, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(entry.id)
                .bind(entry.owner_id)
                .bind(entry.amount)
                .bind(entry.kind.as_str())
                .bind(&entry.plan_id)
                .bind(entry.created_at.naive_utc())
                .execute(&mut **tx)
                .await?;

                receipt.balances.insert(entry.owner_id, balance);
            }
            Mutation::AppointmentStatus {
                appointment,
                status,
            } => {
                let result = sqlx::query(
                    "UPDATE appointments SET status = $1, updated_at = NOW() WHERE id = $2",
                )
                .bind(status.as_str())
                .bind(appointment)
                .execute(&mut **tx)
                .await?;
                ensure_affected(result.rows_affected(), "Appointment", appointment)?;
            }
            Mutation::AppointmentNotes { appointment, notes } => {
                let result = sqlx::query(
                    "UPDATE appointments SET notes = $1, updated_at = NOW() WHERE id = $2",
                )
                .bind(notes)
                .bind(appointment)
                .execute(&mut **tx)
                .await?;
                ensure_affected(result.rows_affected(), "Appointment", appointment)?;
            }
            Mutation::PayoutProcessed {
                payout,
                processed_at,
                processed_by,
            } => {
                let result = sqlx::query(
                    "UPDATE payouts
                     SET status = $1, processed_at = $2, processed_by = $3
                     WHERE id = $4",
                )
                .bind(PayoutStatus::Processed.as_str())
                .bind(processed_at.naive_utc())
                .bind(processed_by)
                .bind(payout)
                .execute(&mut **tx)
                .await?;
                ensure_affected(result.rows_affected(), "Payout", payout)?;
            }
            Mutation::VerificationStatus { account, status } => {
                let result = sqlx::query(
                    "UPDATE accounts SET verification_status = $1, updated_at = NOW() WHERE id = $2",
                )
                .bind(status.as_str())
                .bind(account)
                .execute(&mut **tx)
                .await?;
                ensure_affected(result.rows_affected(), "Account", account)?;
            }
            Mutation::AssignRole {
                account,
                role,
                profile,
                verification,
            } => {
                let result = match profile {
                    Some(profile) => {
                        sqlx::query(
                            "UPDATE accounts
                             SET role = $1, verification_status = $2, specialty = $3,
                                 experience_years = $4, credential_url = $5, description = $6,
                                 updated_at = NOW()
                             WHERE id = $7",
                        )
                        .bind(role.as_str())
                        .bind(verification.map(|status| status.as_str()))
                        .bind(profile.specialty)
                        .bind(profile.experience_years)
                        .bind(profile.credential_url)
                        .bind(profile.description)
                        .bind(account)
                        .execute(&mut **tx)
                        .await?
                    }
                    None => {
                        sqlx::query(
                            "UPDATE accounts
                             SET role = $1, verification_status = $2, updated_at = NOW()
                             WHERE id = $3",
                        )
                        .bind(role.as_str())
                        .bind(verification.map(|status| status.as_str()))
                        .bind(account)
                        .execute(&mut **tx)
                        .await?
                    }
                };
                ensure_affected(result.rows_affected(), "Account", account)?;
            }
            Mutation::ResetDoctorProfile { account } => {
                let result = sqlx::query(
                    "UPDATE accounts
                     SET role = $1, verification_status = $2, specialty = NULL,
                         experience_years = 0, credential_url = NULL, description = NULL,
                         updated_at = NOW()
                     WHERE id = $3",
                )
                .bind(Role::Unassigned.as_str())
                .bind(VerificationStatus::Pending.as_str())
                .bind(account)
                .execute(&mut **tx)
                .await?;
                ensure_affected(result.rows_affected(), "Account", account)?;
            }
            Mutation::ReplaceAvailability(window) => {
                let doctor = sqlx::query("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
                    .bind(window.doctor_id)
                    .fetch_optional(&mut **tx)
                    .await?;
                if doctor.is_none() {
                    return Err(StoreError::MissingRow {
                        entity: "Account",
                        id: window.doctor_id,
                    });
                }

                sqlx::query("DELETE FROM availabilities WHERE doctor_id = $1")
                    .bind(window.doctor_id)
                    .execute(&mut **tx)
                    .await?;

                sqlx::query(
                    r#"
                    INSERT INTO availabilities (id, doctor_id, start_time, end_time, status)
                    VALUES ($1, $2, $3, $4, 'AVAILABLE')
                    "#,
                )
                .bind(window.id)
                .bind(window.doctor_id)
                .bind(window.start_time.naive_utc())
                .bind(window.end_time.naive_utc())
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ClinicStore for PgClinicStore {
    async fn insert_account(&self, new: NewAccount) -> StoreResult<Account> {
        let profile = new.profile;
        let row = sqlx::query(&format!(
            "INSERT INTO accounts (id, external_id, name, email, role, credits, specialty,
                                   experience_years, credential_url, description, verification_status)
             VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, $9, $10)
             ON CONFLICT (external_id) DO NOTHING
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.external_id)
        .bind(new.name)
        .bind(new.email)
        .bind(new.role.as_str())
        .bind(profile.as_ref().map(|p| p.specialty.clone()))
        .bind(profile.as_ref().map_or(0, |p| p.experience_years))
        .bind(profile.as_ref().map(|p| p.credential_url.clone()))
        .bind(profile.map(|p| p.description))
        .bind(new.verification_status.map(|status| status.as_str()))
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or_else(|| StoreError::Duplicate(format!("external id {}", new.external_id)))?;

        account_from_row(&row)
    }

    async fn find_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(|row| account_from_row(&row))
            .transpose()
    }

    async fn find_account_by_external_id(&self, external_id: &str) -> StoreResult<Option<Account>> {
        sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE external_id = $1"))
            .bind(external_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(|row| account_from_row(&row))
            .transpose()
    }

    async fn list_doctors(&self, filter: DoctorFilter) -> StoreResult<Vec<Account>> {
        let order = match filter.order {
            DoctorOrder::NewestFirst => "created_at DESC",
            DoctorOrder::OldestFirst => "created_at ASC",
            DoctorOrder::Name => "name ASC",
        };

        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE role = $1
               AND ($2::TEXT IS NULL OR verification_status = $2)
               AND ($3::TEXT IS NULL OR specialty = $3)
             ORDER BY {order}"
        ))
        .bind(Role::Doctor.as_str())
        .bind(filter.verification_status.map(|status| status.as_str()))
        .bind(filter.specialty)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(account_from_row).collect()
    }

    async fn latest_entry(&self, owner_id: AccountId) -> StoreResult<Option<LedgerEntry>> {
        sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries
             WHERE owner_id = $1
             ORDER BY created_at DESC, seq DESC
             LIMIT 1"
        ))
        .bind(owner_id)
        .fetch_optional(self.pool.as_ref())
        .await?
        .map(|row| entry_from_row(&row))
        .transpose()
    }

    async fn entries(&self, owner_id: AccountId, limit: i64) -> StoreResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries
             WHERE owner_id = $1
             ORDER BY created_at DESC, seq DESC
             LIMIT $2"
        ))
        .bind(owner_id)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn entry_sum(&self, owner_id: AccountId) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT AS total FROM ledger_entries WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.get("total"))
    }

    async fn insert_appointment(&self, new: NewAppointment) -> StoreResult<Appointment> {
        let row = sqlx::query(&format!(
            "INSERT INTO appointments (id, doctor_id, patient_id, start_time, end_time, status, patient_description)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {APPOINTMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.doctor_id)
        .bind(new.patient_id)
        .bind(new.start_time.naive_utc())
        .bind(new.end_time.naive_utc())
        .bind(AppointmentStatus::Scheduled.as_str())
        .bind(new.patient_description)
        .fetch_one(self.pool.as_ref())
        .await?;

        appointment_from_row(&row)
    }

    async fn find_appointment(&self, id: AppointmentId) -> StoreResult<Option<Appointment>> {
        sqlx::query(&format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(|row| appointment_from_row(&row))
            .transpose()
    }

    async fn appointments(&self, filter: AppointmentFilter) -> StoreResult<Vec<Appointment>> {
        let rows = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE ($1::UUID IS NULL OR doctor_id = $1)
               AND ($2::UUID IS NULL OR patient_id = $2)
               AND ($3::TEXT IS NULL OR status = $3)
             ORDER BY start_time ASC"
        ))
        .bind(filter.doctor_id)
        .bind(filter.patient_id)
        .bind(filter.status.map(|status| status.as_str()))
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(appointment_from_row).collect()
    }

    async fn windows(&self, doctor_id: AccountId) -> StoreResult<Vec<AvailabilityWindow>> {
        let rows = sqlx::query(
            "SELECT id, doctor_id, start_time, end_time FROM availabilities
             WHERE doctor_id = $1
             ORDER BY start_time ASC",
        )
        .bind(doctor_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.iter().map(window_from_row).collect())
    }

    async fn insert_payout(&self, new: NewPayout) -> StoreResult<Payout> {
        let quote = new.quote().ok_or_else(|| StoreError::InvalidColumn {
            column: "credits",
            value: new.credits.to_string(),
        })?;
        let row = sqlx::query(&format!(
            "INSERT INTO payouts (id, doctor_id, credits, gross_amount_cents, platform_fee_cents,
                                  net_amount_cents, paypal_email, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {PAYOUT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.doctor_id)
        .bind(quote.credits)
        .bind(quote.gross_amount)
        .bind(quote.platform_fee)
        .bind(quote.net_amount)
        .bind(new.paypal_email)
        .bind(PayoutStatus::Processing.as_str())
        .bind(Utc::now().naive_utc())
        .fetch_one(self.pool.as_ref())
        .await?;

        payout_from_row(&row)
    }

    async fn find_payout(&self, id: PayoutId, status: Option<PayoutStatus>) -> StoreResult<Option<Payout>> {
        sqlx::query(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts
             WHERE id = $1 AND ($2::TEXT IS NULL OR status = $2)"
        ))
        .bind(id)
        .bind(status.map(|status| status.as_str()))
        .fetch_optional(self.pool.as_ref())
        .await?
        .map(|row| payout_from_row(&row))
        .transpose()
    }

    async fn payouts(&self, filter: PayoutFilter) -> StoreResult<Vec<Payout>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts
             WHERE ($1::UUID IS NULL OR doctor_id = $1)
               AND ($2::TEXT IS NULL OR status = $2)
             ORDER BY created_at DESC"
        ))
        .bind(filter.doctor_id)
        .bind(filter.status.map(|status| status.as_str()))
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(payout_from_row).collect()
    }

    async fn apply(&self, settlement: Settlement) -> StoreResult<SettlementReceipt> {
        let label = settlement.label();
        let (guards, mutations) = settlement.into_parts();

        // Start transaction
        let mut tx = self.pool.begin().await?;

        for guard in &guards {
            self.check_guard(&mut tx, guard).await?;
        }

        let mut receipt = SettlementReceipt::default();
        for mutation in mutations {
            self.apply_mutation(&mut tx, mutation, &mut receipt).await?;
        }

        // Commit transaction
        tx.commit().await?;
        log::debug!("Committed settlement {label}");

        Ok(receipt)
    }
}
