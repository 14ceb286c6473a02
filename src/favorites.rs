use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    api::FavoriteService,
    engine::UpdateStrategy,
    errors::ClientError,
    orders::ItemId,
};

/// An item as listed on the favorites page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub item_id: ItemId,
    #[serde(default, alias = "itemName")]
    pub title: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub seller_name: Option<String>,
    #[serde(default)]
    pub is_available: Option<bool>,
    #[serde(default)]
    pub image_urls: Option<Vec<String>>,
}

/// The favorite button of one item.
///
/// Flips immediately and flips back if the server refuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteToggle {
    item_id: ItemId,
    favorited: bool,
}

impl FavoriteToggle {
    pub const STRATEGY: UpdateStrategy = UpdateStrategy::Optimistic;

    pub fn new(item_id: ItemId, favorited: bool) -> Self {
        FavoriteToggle { item_id, favorited }
    }

    pub async fn load<S: FavoriteService + ?Sized>(
        service: &S,
        item_id: ItemId,
    ) -> Result<Self, ClientError> {
        let favorited = service.is_favorite(item_id).await?;
        Ok(Self::new(item_id, favorited))
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn is_favorite(&self) -> bool {
        self.favorited
    }

    /// Returns the new state, or the error after reverting.
    pub async fn toggle<S: FavoriteService + ?Sized>(
        &mut self,
        service: &S,
    ) -> Result<bool, ClientError> {
        let target = !self.favorited;
        self.favorited = target;
        let result = if target {
            service.add_favorite(self.item_id).await
        } else {
            service.remove_favorite(self.item_id).await
        };
        match result {
            Ok(()) => {
                info!("item {} favorite -> {}", self.item_id, target);
                Ok(target)
            }
            Err(e) => {
                self.favorited = !target;
                warn!("favorite toggle on item {} reverted: {}", self.item_id, e);
                Err(e)
            }
        }
    }
}
