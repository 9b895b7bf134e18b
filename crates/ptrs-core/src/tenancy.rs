//! Tenant-bound transactions.
//!
//! Every data access runs inside a [`TenantTransaction`]: a database
//! transaction whose first statement bound the tenant token as a
//! transaction-local setting. Row-level security in the store keys on that
//! setting, so the binding must exist before any query runs and must die with
//! the transaction.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PtrsError;
use crate::store::{Database, Session, TENANT_SETTING};
use crate::PtrsResult;

pub const TENANT_ID_LEN: usize = 10;

/// Validated tenant token: exactly 10 characters of `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: &str) -> PtrsResult<Self> {
        let well_formed = raw.len() == TENANT_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(PtrsError::InvalidTenantId(raw.to_string()));
        }
        Ok(TenantId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = PtrsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TenantId::parse(&value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open transaction with a confirmed tenant binding.
///
/// Commit consumes the value. Rollback is idempotent, and dropping an
/// unfinished transaction rolls it back.
pub struct TenantTransaction<S: Session> {
    tenant_id: TenantId,
    session: Option<S>,
}

impl<S: Session> TenantTransaction<S> {
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// The underlying session; every statement on it is tenant-scoped.
    pub fn session(&mut self) -> PtrsResult<&mut S> {
        self.session.as_mut().ok_or(PtrsError::TransactionClosed)
    }

    pub fn commit(mut self) -> PtrsResult<()> {
        let mut session = self.session.take().ok_or(PtrsError::TransactionClosed)?;
        if let Err(e) = session.commit() {
            if let Err(rb) = session.rollback() {
                warn!(tenant = %self.tenant_id, error = %rb, "rollback after failed commit failed");
            }
            return Err(e.into());
        }
        debug!(tenant = %self.tenant_id, "tenant transaction committed");
        Ok(())
    }

    pub fn rollback(&mut self) -> PtrsResult<()> {
        if let Some(mut session) = self.session.take() {
            session.rollback()?;
            debug!(tenant = %self.tenant_id, "tenant transaction rolled back");
        }
        Ok(())
    }
}

impl<S: Session> Drop for TenantTransaction<S> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            warn!(tenant = %self.tenant_id, "tenant transaction dropped while open, rolling back");
            if let Err(e) = session.rollback() {
                warn!(tenant = %self.tenant_id, error = %e, "implicit rollback failed");
            }
        }
    }
}

/// Opens a transaction and binds `tenant_id` to it for its lifetime.
///
/// The token is validated before the database is touched. If the binding
/// cannot be set or read back, the transaction is rolled back and
/// [`PtrsError::TenantContextSetupFailed`] is returned.
pub fn begin_tenant_transaction<D>(
    db: &D,
    tenant_id: &str,
) -> PtrsResult<TenantTransaction<D::Session>>
where
    D: Database + ?Sized,
{
    let tenant_id = TenantId::parse(tenant_id)?;
    let mut session = db.begin()?;

    let bound = session
        .set_config(TENANT_SETTING, tenant_id.as_str(), true)
        .map_err(|e| e.to_string())
        .and_then(|()| match session.current_setting(TENANT_SETTING) {
            Some(value) if value == tenant_id.as_str() => Ok(()),
            other => Err(format!(
                "{} reads back as {:?} after binding",
                TENANT_SETTING, other
            )),
        });

    if let Err(reason) = bound {
        if let Err(rb) = session.rollback() {
            warn!(tenant = %tenant_id, error = %rb, "rollback after failed tenant binding failed");
        }
        warn!(tenant = %tenant_id, %reason, "tenant binding failed");
        return Err(PtrsError::TenantContextSetupFailed(reason));
    }

    debug!(tenant = %tenant_id, "tenant transaction opened");
    Ok(TenantTransaction {
        tenant_id,
        session: Some(session),
    })
}

/// Runs `f` inside a tenant transaction: commit on `Ok`, rollback on `Err`.
pub fn with_tenant_transaction<D, T, F>(db: &D, tenant_id: &str, f: F) -> PtrsResult<T>
where
    D: Database + ?Sized,
    F: FnOnce(&mut TenantTransaction<D::Session>) -> PtrsResult<T>,
{
    let mut tx = begin_tenant_transaction(db, tenant_id)?;
    match f(&mut tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback() {
                warn!(tenant = %tx.tenant_id(), error = %rb, "rollback failed");
            }
            Err(e)
        }
    }
}
