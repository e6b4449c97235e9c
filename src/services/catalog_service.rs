//! Read access to the location and crop catalogs

use std::sync::Arc;

use crate::db::catalog::{self, CatalogEntry, CatalogSeed};
use crate::db::RecordsDb;
use crate::error::RecordsError;

pub struct CatalogService {
    db: Arc<RecordsDb>,
}

impl CatalogService {
    pub fn new(db: Arc<RecordsDb>) -> Self {
        Self { db }
    }

    pub fn crop_types(&self) -> Result<Vec<CatalogEntry>, RecordsError> {
        self.db.with_conn(catalog::list_crop_types)
    }

    /// Villages of a mandal; unknown mandals are `NotFound`
    pub fn villages(&self, mandal_id: &str) -> Result<Vec<CatalogEntry>, RecordsError> {
        self.db.with_conn(|conn| {
            if !catalog::mandal_exists(conn, mandal_id)? {
                return Err(RecordsError::NotFound(format!("mandal {}", mandal_id)));
            }
            catalog::list_villages(conn, mandal_id)
        })
    }

    /// Load a catalog snapshot
    pub fn apply_seed(&self, seed: &CatalogSeed) -> Result<(), RecordsError> {
        self.db.with_conn_mut(|conn| catalog::apply_seed(conn, seed))
    }
}
