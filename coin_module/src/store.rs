use coin_common::{CollectibleId, CollectibleStore, NewCollectible, Position, SpawnError, StoredObject};
use spacetimedb::{ReducerContext, Table};

use crate::query_utils::QueryUtils;
use crate::tables::collectible::{CollectibleRow, collectible};

/// The `collectible` table seen through a reducer transaction
pub struct ModuleStore<'a> {
    ctx: &'a ReducerContext,
}

impl<'a> ModuleStore<'a> {
    pub fn new(ctx: &'a ReducerContext) -> Self {
        Self { ctx }
    }
}

impl CollectibleStore for ModuleStore<'_> {
    fn fetch_in_radius(&self, center: Position, radius: f32) -> Result<Vec<StoredObject>, SpawnError> {
        Ok(QueryUtils::collectibles_near_position(self.ctx, center, radius)
            .iter()
            .map(CollectibleRow::to_stored)
            .collect())
    }

    fn create(&mut self, collectible: NewCollectible) -> Result<CollectibleId, SpawnError> {
        let row = CollectibleRow::from_new(collectible, self.ctx.timestamp);
        let inserted = self.ctx.db.collectible().insert(row);
        Ok(inserted.id())
    }

    fn remove(&mut self, id: CollectibleId) -> Result<(), SpawnError> {
        if self.ctx.db.collectible().collectible_id().delete(id.0) {
            Ok(())
        } else {
            Err(SpawnError::Persistence(format!("{id} was not found")))
        }
    }
}
