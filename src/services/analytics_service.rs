//! Analytics service
//!
//! Loads one farmer's records in a single read transaction and hands them to
//! the pure rollups in [`crate::analytics`]. Reads never see a half-applied
//! transition because every write commits atomically.

use std::sync::Arc;

use serde::Serialize;
use ts_rs::TS;

use crate::analytics::{
    self, ApprovalSummary, FieldSizeSummary, SeasonSummary, SeverityDistribution, YearlyTrendRow,
};
use crate::db::models::{CropRecord, Field};
use crate::db::{crops, fields, predictions, RecordsDb};
use crate::error::RecordsError;
use crate::identity::Actor;

/// All rollups for one farmer
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub seasons: Vec<SeasonSummary>,
    pub yearly: Vec<YearlyTrendRow>,
    pub field_sizes: Vec<FieldSizeSummary>,
    pub approval: ApprovalSummary,
    pub severity: SeverityDistribution,
}

struct Snapshot {
    fields: Vec<Field>,
    crops: Vec<CropRecord>,
    labels: Vec<String>,
}

pub struct AnalyticsService {
    db: Arc<RecordsDb>,
}

impl AnalyticsService {
    pub fn new(db: Arc<RecordsDb>) -> Self {
        Self { db }
    }

    pub fn seasons(&self, actor: &Actor) -> Result<Vec<SeasonSummary>, RecordsError> {
        let crops = self.db.with_conn(|conn| crops::list_crops_by_owner(conn, &actor.id))?;
        Ok(analytics::season_distribution(&crops))
    }

    /// Rows ascending by crop year
    pub fn yearly(&self, actor: &Actor) -> Result<Vec<YearlyTrendRow>, RecordsError> {
        let crops = self.db.with_conn(|conn| crops::list_crops_by_owner(conn, &actor.id))?;
        Ok(analytics::yearly_trend(&crops))
    }

    pub fn field_sizes(&self, actor: &Actor) -> Result<Vec<FieldSizeSummary>, RecordsError> {
        let fields = self.db.with_conn(|conn| fields::all_fields_for_owner(conn, &actor.id))?;
        Ok(analytics::field_size_buckets(&fields))
    }

    pub fn approval(&self, actor: &Actor) -> Result<ApprovalSummary, RecordsError> {
        let snapshot = self.snapshot(actor, false)?;
        Ok(analytics::approval_summary(&snapshot.fields, &snapshot.crops))
    }

    pub fn severity(&self, actor: &Actor) -> Result<SeverityDistribution, RecordsError> {
        let labels = self.db.with_conn(|conn| predictions::labels_for_owner(conn, &actor.id))?;
        Ok(analytics::severity_distribution(&labels))
    }

    /// Every rollup computed from the same snapshot
    pub fn overview(&self, actor: &Actor) -> Result<AnalyticsOverview, RecordsError> {
        let snapshot = self.snapshot(actor, true)?;
        Ok(AnalyticsOverview {
            seasons: analytics::season_distribution(&snapshot.crops),
            yearly: analytics::yearly_trend(&snapshot.crops),
            field_sizes: analytics::field_size_buckets(&snapshot.fields),
            approval: analytics::approval_summary(&snapshot.fields, &snapshot.crops),
            severity: analytics::severity_distribution(&snapshot.labels),
        })
    }

    fn snapshot(&self, actor: &Actor, with_labels: bool) -> Result<Snapshot, RecordsError> {
        self.db.with_read_tx(|tx| {
            Ok(Snapshot {
                fields: fields::all_fields_for_owner(tx, &actor.id)?,
                crops: crops::list_crops_by_owner(tx, &actor.id)?,
                labels: if with_labels {
                    predictions::labels_for_owner(tx, &actor.id)?
                } else {
                    Vec::new()
                },
            })
        })
    }
}
