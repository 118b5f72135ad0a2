//! Lectern Services Layer
//!
//! Business services of the upload/quota core. Each service is an explicit component built
//! from a `MediaStore`, an `ObjectStoreGateway` and the quota ledger; the API crate wires
//! them together at startup and keeps HTTP handling thin.

pub mod expiry_sweeper;
pub mod media_catalog;
pub mod object_cleanup;
pub mod quota_ledger;
pub mod upload_coordinator;

#[cfg(test)]
pub(crate) mod test_support;

pub use expiry_sweeper::{ExpirySweeper, SweepReport, SweeperHandle};
pub use media_catalog::MediaCatalog;
pub use object_cleanup::{CleanupReport, ObjectJanitor};
pub use quota_ledger::{QuotaDefaults, QuotaLedger};
pub use upload_coordinator::{InitiateUpload, TerminateOutcome, UploadCoordinator};
