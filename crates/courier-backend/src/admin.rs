//! Administration collections: user reports, ads and system alerts.
//!
//! Active-ad and active-alert lookups scan the whole collection; both stay
//! small.

use courier_core::{time, AdId, AlertId, ReportId};
use courier_store::{
    AdConfig, AlertLevel, Collection, RecordStore, Report, ReportStatus, Store, StoreError,
    SystemAlert,
};

use crate::error::{BackendError, Result};
use crate::notify::Change;
use crate::service::Backend;

// ============================================================================
// Reports
// ============================================================================

/// Handle to user reports.
pub struct Reports<'a, S: Store> {
    backend: &'a Backend<S>,
}

impl<'a, S: Store> Reports<'a, S> {
    pub(crate) const fn new(backend: &'a Backend<S>) -> Self {
        Self { backend }
    }

    /// File a report. It starts out pending.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::AlreadyExists` if the report id is taken.
    pub fn add(&self, mut report: Report) -> Result<Report> {
        report.status = ReportStatus::Pending;
        match self.backend.store().insert(&report) {
            Ok(_) => {}
            Err(StoreError::ConcurrentModification { collection, key }) => {
                return Err(BackendError::AlreadyExists { collection, key });
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(report_id = %report.id, reporter = %report.reporter_id, "report filed");
        self.backend.emit_record(&report);
        Ok(report)
    }

    /// Every report, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn list(&self) -> Result<Vec<Report>> {
        let mut reports = self.backend.store().list::<Report>()?;
        reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(reports)
    }

    /// Reports still awaiting review, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn pending(&self) -> Result<Vec<Report>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.status == ReportStatus::Pending)
            .collect())
    }

    /// Mark a report as handled.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such report.
    pub fn resolve(&self, id: &ReportId) -> Result<Report> {
        let report: Report = self.backend.store().update(
            id.as_str(),
            self.backend.attempts(),
            |report: &mut Report| -> Result<()> {
                report.status = ReportStatus::Resolved;
                Ok(())
            },
        )?;
        self.backend.emit_record(&report);
        Ok(report)
    }
}

// ============================================================================
// Ads
// ============================================================================

/// Handle to advertisement configurations.
pub struct Ads<'a, S: Store> {
    backend: &'a Backend<S>,
}

impl<'a, S: Store> Ads<'a, S> {
    pub(crate) const fn new(backend: &'a Backend<S>) -> Self {
        Self { backend }
    }

    /// Insert or replace an ad.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn set(&self, ad: &AdConfig) -> Result<()> {
        self.backend.store().put(ad)?;
        tracing::debug!(ad_id = %ad.id, active = ad.is_active, "saved ad");
        self.backend.emit_record(ad);
        Ok(())
    }

    /// Every ad, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn list(&self) -> Result<Vec<AdConfig>> {
        Ok(self.backend.store().list()?)
    }

    /// The first ad, in id order, that is live at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn get_active(&self, now: i64) -> Result<Option<AdConfig>> {
        Ok(self.list()?.into_iter().find(|ad| ad.is_live(now)))
    }

    /// Count one impression of an ad.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such ad.
    pub fn record_view(&self, id: &AdId) -> Result<AdConfig> {
        let ad: AdConfig = self.backend.store().update(
            id.as_str(),
            self.backend.attempts(),
            |ad: &mut AdConfig| -> Result<()> {
                ad.views = ad.views.saturating_add(1);
                Ok(())
            },
        )?;
        self.backend.emit_record(&ad);
        Ok(ad)
    }

    /// Delete an ad, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn delete(&self, id: &AdId) -> Result<bool> {
        let existed = self.backend.store().delete::<AdConfig>(id.as_str())?;
        if existed {
            self.backend.emit(Change::new(Collection::Ads, id.as_str()));
        }
        Ok(existed)
    }
}

// ============================================================================
// Alerts
// ============================================================================

/// Handle to system alerts.
pub struct Alerts<'a, S: Store> {
    backend: &'a Backend<S>,
}

impl<'a, S: Store> Alerts<'a, S> {
    pub(crate) const fn new(backend: &'a Backend<S>) -> Self {
        Self { backend }
    }

    /// Insert or replace an alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn set(&self, alert: &SystemAlert) -> Result<()> {
        self.backend.store().put(alert)?;
        tracing::info!(alert_id = %alert.id, level = ?alert.level, "alert set");
        self.backend.emit_record(alert);
        Ok(())
    }

    /// Raise an alert lasting `duration_seconds` from now.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn broadcast(
        &self,
        message: &str,
        level: AlertLevel,
        duration_seconds: u64,
        global_lock: bool,
    ) -> Result<SystemAlert> {
        let created_at = time::now_millis();
        let alert = SystemAlert {
            id: AlertId::generate(),
            message: message.to_string(),
            level,
            duration_seconds,
            created_at,
            expires_at: time::add_seconds(created_at, duration_seconds),
            global_lock,
        };
        self.set(&alert)?;
        Ok(alert)
    }

    /// Every alert, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn list(&self) -> Result<Vec<SystemAlert>> {
        let mut alerts = self.backend.store().list::<SystemAlert>()?;
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    /// The newest alert that is active at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn get_active(&self, now: i64) -> Result<Option<SystemAlert>> {
        Ok(self.list()?.into_iter().find(|alert| alert.is_active(now)))
    }

    /// Delete an alert, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn delete(&self, id: &AlertId) -> Result<bool> {
        let existed = self.backend.store().delete::<SystemAlert>(id.as_str())?;
        if existed {
            self.backend.emit(Change::new(Collection::Alerts, id.as_str()));
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use courier_core::UserId;
    use courier_store::RocksStore;

    fn setup() -> (Backend<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (Backend::with_defaults(store), dir)
    }

    fn ad(id: &str, is_active: bool) -> AdConfig {
        AdConfig {
            id: AdId::new(id).unwrap(),
            title: id.to_string(),
            text: String::new(),
            image: None,
            link: None,
            button_text: None,
            is_active,
            views: 0,
            start_time: None,
            end_time: None,
            is_scheduled: false,
        }
    }

    fn alert(id: &str, created_at: i64, expires_at: i64) -> SystemAlert {
        SystemAlert {
            id: AlertId::new(id).unwrap(),
            message: id.to_string(),
            level: AlertLevel::Info,
            duration_seconds: 60,
            created_at,
            expires_at,
            global_lock: false,
        }
    }

    #[test]
    fn reports_start_pending_and_resolve() {
        let (backend, _dir) = setup();
        let reports = backend.reports();
        let mut report = Report {
            id: ReportId::new("r1").unwrap(),
            reporter_id: UserId::new("alice").unwrap(),
            description: "spam".to_string(),
            timestamp: 5,
            status: ReportStatus::Resolved,
        };
        reports.add(report.clone()).unwrap();
        assert_eq!(reports.pending().unwrap().len(), 1);
        assert!(matches!(
            reports.add(report.clone()).unwrap_err(),
            BackendError::AlreadyExists { .. }
        ));

        report = reports.resolve(&report.id).unwrap();
        assert_eq!(report.status, ReportStatus::Resolved);
        assert!(reports.pending().unwrap().is_empty());
        assert_eq!(reports.list().unwrap().len(), 1);
    }

    #[test]
    fn active_ad_skips_inactive() {
        let (backend, _dir) = setup();
        let ads = backend.ads();
        assert!(ads.get_active(0).unwrap().is_none());

        ads.set(&ad("a1", false)).unwrap();
        ads.set(&ad("a2", true)).unwrap();
        assert_eq!(ads.get_active(0).unwrap().unwrap().id.as_str(), "a2");

        let viewed = ads.record_view(&AdId::new("a2").unwrap()).unwrap();
        assert_eq!(viewed.views, 1);

        assert!(ads.delete(&AdId::new("a2").unwrap()).unwrap());
        assert!(ads.get_active(0).unwrap().is_none());
    }

    #[test]
    fn active_alert_is_newest_unexpired() {
        let (backend, _dir) = setup();
        let alerts = backend.alerts();
        alerts.set(&alert("old", 1, 1_000)).unwrap();
        alerts.set(&alert("new", 2, 1_000)).unwrap();
        alerts.set(&alert("gone", 3, 50)).unwrap();

        assert_eq!(alerts.get_active(100).unwrap().unwrap().id.as_str(), "new");
        assert!(alerts.get_active(1_000).unwrap().is_none());

        assert!(alerts.delete(&AlertId::new("new").unwrap()).unwrap());
        assert_eq!(alerts.get_active(100).unwrap().unwrap().id.as_str(), "old");
    }

    #[test]
    fn broadcast_derives_expiry() {
        let (backend, _dir) = setup();
        let alert = backend
            .alerts()
            .broadcast("maintenance", AlertLevel::Warning, 60, true)
            .unwrap();
        assert_eq!(alert.expires_at - alert.created_at, 60_000);
        assert!(backend.alerts().get_active(alert.created_at).unwrap().is_some());
    }
}
