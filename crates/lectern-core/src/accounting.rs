//! Quota accounting rules
//!
//! Pure arithmetic over a set of quota accounts that the caller has already locked. Every
//! function checks all accounts before touching any of them, so a failed check leaves the
//! slice unchanged. Persistence and locking live in `lectern-db`; the only caller that
//! writes the results back is the quota ledger.

use chrono::Utc;

use crate::models::{QuotaAccount, QuotaType};
use crate::AppError;

fn quota_exceeded(account: &QuotaAccount, requested_bytes: i64) -> AppError {
    AppError::QuotaExceeded {
        quota_type: account.quota_type,
        requested_bytes,
        used_bytes: account.used_bytes,
        reserved_bytes: account.reserved_bytes,
        total_bytes: account.total_bytes,
        available_bytes: account.available_bytes(),
    }
}

fn ensure_charged(accounts: &[QuotaAccount], quota_type: QuotaType) -> Result<(), AppError> {
    for expected in quota_type.charged_accounts() {
        if !accounts.iter().any(|a| a.quota_type == expected) {
            return Err(AppError::Internal(format!(
                "Quota account {} was not loaded",
                expected
            )));
        }
    }
    Ok(())
}

fn charged<'a>(
    accounts: &'a mut [QuotaAccount],
    quota_type: QuotaType,
) -> impl Iterator<Item = &'a mut QuotaAccount> {
    let targets = quota_type.charged_accounts();
    accounts
        .iter_mut()
        .filter(move |a| targets.contains(&a.quota_type))
}

/// Hold `bytes` on the typed account and on TOTAL.
pub fn reserve(
    accounts: &mut [QuotaAccount],
    quota_type: QuotaType,
    bytes: i64,
) -> Result<(), AppError> {
    if bytes <= 0 {
        return Err(AppError::InvalidInput(
            "Reservation size must be positive".to_string(),
        ));
    }
    ensure_charged(accounts, quota_type)?;

    for account in charged(accounts, quota_type) {
        if account.used_bytes + account.reserved_bytes + bytes > account.total_bytes {
            return Err(quota_exceeded(account, bytes));
        }
    }

    let now = Utc::now();
    for account in charged(accounts, quota_type) {
        account.reserved_bytes += bytes;
        account.updated_at = now;
    }
    Ok(())
}

/// Move a reservation of `reserved_bytes` into usage as `actual_bytes`.
///
/// When the actual size is larger than the reservation, the delta must fit the remaining
/// headroom of every charged account.
pub fn commit(
    accounts: &mut [QuotaAccount],
    quota_type: QuotaType,
    reserved_bytes: i64,
    actual_bytes: i64,
) -> Result<(), AppError> {
    if actual_bytes < 0 {
        return Err(AppError::InvalidInput(
            "Committed size must not be negative".to_string(),
        ));
    }
    ensure_charged(accounts, quota_type)?;

    for account in charged(accounts, quota_type) {
        if account.reserved_bytes < reserved_bytes {
            return Err(AppError::Internal(format!(
                "{} account holds {} reserved bytes, reservation needs {}",
                account.quota_type, account.reserved_bytes, reserved_bytes
            )));
        }
        let reserved_after = account.reserved_bytes - reserved_bytes;
        let used_after = account.used_bytes + actual_bytes;
        if used_after + reserved_after > account.total_bytes {
            return Err(quota_exceeded(account, actual_bytes - reserved_bytes));
        }
    }

    let now = Utc::now();
    for account in charged(accounts, quota_type) {
        account.reserved_bytes -= reserved_bytes;
        account.used_bytes += actual_bytes;
        account.updated_at = now;
    }
    Ok(())
}

/// Drop a reservation of `bytes` without using it.
pub fn release(
    accounts: &mut [QuotaAccount],
    quota_type: QuotaType,
    bytes: i64,
) -> Result<(), AppError> {
    ensure_charged(accounts, quota_type)?;

    for account in charged(accounts, quota_type) {
        if account.reserved_bytes < bytes {
            return Err(AppError::Internal(format!(
                "{} account holds {} reserved bytes, cannot release {}",
                account.quota_type, account.reserved_bytes, bytes
            )));
        }
    }

    let now = Utc::now();
    for account in charged(accounts, quota_type) {
        account.reserved_bytes -= bytes;
        account.updated_at = now;
    }
    Ok(())
}

/// Return `bytes` of committed usage, e.g. when an asset is deleted.
pub fn release_used(
    accounts: &mut [QuotaAccount],
    quota_type: QuotaType,
    bytes: i64,
) -> Result<(), AppError> {
    ensure_charged(accounts, quota_type)?;

    for account in charged(accounts, quota_type) {
        if account.used_bytes < bytes {
            return Err(AppError::Internal(format!(
                "{} account holds {} used bytes, cannot release {}",
                account.quota_type, account.used_bytes, bytes
            )));
        }
    }

    let now = Utc::now();
    for account in charged(accounts, quota_type) {
        account.used_bytes -= bytes;
        account.updated_at = now;
    }
    Ok(())
}

/// Change an account's total. Shrinking below what is already held is refused.
pub fn set_total(account: &mut QuotaAccount, total_bytes: i64) -> Result<(), AppError> {
    if total_bytes < 0 {
        return Err(AppError::InvalidInput(
            "Quota total must not be negative".to_string(),
        ));
    }
    let held = account.used_bytes + account.reserved_bytes;
    if total_bytes < held {
        return Err(AppError::Conflict(format!(
            "{} quota cannot be set to {} bytes: {} bytes are used or reserved",
            account.quota_type, total_bytes, held
        )));
    }
    account.total_bytes = total_bytes;
    account.updated_at = Utc::now();
    Ok(())
}
