use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Quota bucket an institution is charged against.
///
/// `Total` bounds the sum of every typed account of the institution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuotaType {
    Video,
    Document,
    Total,
}

impl QuotaType {
    pub const ALL: [QuotaType; 3] = [QuotaType::Video, QuotaType::Document, QuotaType::Total];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaType::Video => "VIDEO",
            QuotaType::Document => "DOCUMENT",
            QuotaType::Total => "TOTAL",
        }
    }

    /// Accounts touched when charging `self`, in lock order.
    pub fn charged_accounts(self) -> Vec<QuotaType> {
        if self == QuotaType::Total {
            vec![QuotaType::Total]
        } else {
            vec![self, QuotaType::Total]
        }
    }
}

impl FromStr for QuotaType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VIDEO" => Ok(QuotaType::Video),
            "DOCUMENT" => Ok(QuotaType::Document),
            "TOTAL" => Ok(QuotaType::Total),
            _ => Err(anyhow::anyhow!("Invalid quota type: {}", s)),
        }
    }
}

impl Display for QuotaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// One row per (institution, quota type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaAccount {
    pub institution_id: Uuid,
    pub quota_type: QuotaType,
    pub total_bytes: i64,
    pub reserved_bytes: i64,
    pub used_bytes: i64,
    pub updated_at: DateTime<Utc>,
}

impl QuotaAccount {
    pub fn new(institution_id: Uuid, quota_type: QuotaType, total_bytes: i64) -> Self {
        Self {
            institution_id,
            quota_type,
            total_bytes,
            reserved_bytes: 0,
            used_bytes: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn available_bytes(&self) -> i64 {
        (self.total_bytes - self.reserved_bytes - self.used_bytes).max(0)
    }

    /// Committed usage as a percentage of the total, rounded to two decimals.
    pub fn usage_percentage(&self) -> f64 {
        if self.total_bytes <= 0 {
            return if self.used_bytes > 0 { 100.0 } else { 0.0 };
        }
        let pct = self.used_bytes as f64 / self.total_bytes as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    }

    pub fn is_consistent(&self) -> bool {
        self.reserved_bytes >= 0
            && self.used_bytes >= 0
            && self.reserved_bytes + self.used_bytes <= self.total_bytes
    }

    pub fn usage(&self) -> QuotaUsage {
        QuotaUsage {
            quota_type: self.quota_type,
            total_bytes: self.total_bytes,
            used_bytes: self.used_bytes,
            reserved_bytes: self.reserved_bytes,
            available_bytes: self.available_bytes(),
            usage_percentage: self.usage_percentage(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationStatus {
    Active,
    Committed,
    Released,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Committed => "COMMITTED",
            ReservationStatus::Released => "RELEASED",
        }
    }
}

impl FromStr for ReservationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(ReservationStatus::Active),
            "COMMITTED" => Ok(ReservationStatus::Committed),
            "RELEASED" => Ok(ReservationStatus::Released),
            _ => Err(anyhow::anyhow!("Invalid reservation status: {}", s)),
        }
    }
}

impl Display for ReservationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A provisional hold against an institution's quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaReservation {
    pub id: Uuid,
    pub institution_id: Uuid,
    pub quota_type: QuotaType,
    pub reserved_bytes: i64,
    /// Set once the reservation is committed; the bytes moved into `used_bytes`.
    pub committed_bytes: Option<i64>,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuotaReservation {
    pub fn new(institution_id: Uuid, quota_type: QuotaType, reserved_bytes: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            institution_id,
            quota_type,
            reserved_bytes,
            committed_bytes: None,
            status: ReservationStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Usage of a single quota account as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsage {
    pub quota_type: QuotaType,
    pub total_bytes: i64,
    pub used_bytes: i64,
    pub reserved_bytes: i64,
    pub available_bytes: i64,
    pub usage_percentage: f64,
}

/// Per-type and total usage of one institution.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionQuota {
    pub institution_id: Uuid,
    pub accounts: Vec<QuotaUsage>,
}

impl InstitutionQuota {
    pub fn get(&self, quota_type: QuotaType) -> Option<&QuotaUsage> {
        self.accounts.iter().find(|a| a.quota_type == quota_type)
    }
}

/// Admin request to change an institution's quota total
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetQuotaRequest {
    pub quota_type: QuotaType,
    #[validate(range(min = 0, message = "totalBytes must not be negative"))]
    pub total_bytes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charged_accounts_always_include_total_last() {
        assert_eq!(
            QuotaType::Video.charged_accounts(),
            vec![QuotaType::Video, QuotaType::Total]
        );
        assert_eq!(QuotaType::Total.charged_accounts(), vec![QuotaType::Total]);
    }

    #[test]
    fn test_usage_numbers() {
        let mut account = QuotaAccount::new(Uuid::new_v4(), QuotaType::Video, 200);
        account.used_bytes = 50;
        account.reserved_bytes = 30;
        let usage = account.usage();
        assert_eq!(usage.available_bytes, 120);
        assert_eq!(usage.usage_percentage, 25.0);
        assert!(account.is_consistent());
    }

    #[test]
    fn test_zero_total_usage_percentage() {
        let account = QuotaAccount::new(Uuid::new_v4(), QuotaType::Document, 0);
        assert_eq!(account.usage_percentage(), 0.0);
        assert_eq!(account.available_bytes(), 0);
    }

    #[test]
    fn test_quota_type_parsing_is_case_insensitive() {
        assert_eq!("video".parse::<QuotaType>().unwrap(), QuotaType::Video);
        assert_eq!("TOTAL".parse::<QuotaType>().unwrap(), QuotaType::Total);
        assert!("images".parse::<QuotaType>().is_err());
    }
}
