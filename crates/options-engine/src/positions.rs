//! The persisted position set and its store adapter.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use theta_core::{Leg, RecordKey, StateStore, StoreError};
use tracing::{debug, info};

use crate::error::Result;

/// Named slot of a [`PositionSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegSlot {
    SellCall,
    SellPut,
    BuyCallWing,
    BuyPutWing,
    SellCallStop,
    SellPutStop,
}

impl LegSlot {
    pub const ALL: [LegSlot; 6] = [
        Self::BuyCallWing,
        Self::BuyPutWing,
        Self::SellCall,
        Self::SellPut,
        Self::SellCallStop,
        Self::SellPutStop,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SellCall => "sell_call",
            Self::SellPut => "sell_put",
            Self::BuyCallWing => "buy_call_wing",
            Self::BuyPutWing => "buy_put_wing",
            Self::SellCallStop => "sell_call_stop",
            Self::SellPutStop => "sell_put_stop",
        }
    }
}

impl std::fmt::Display for LegSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All legs of one strategy run. Persisted as a single document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionSet {
    pub sell_call: Leg,
    pub sell_put: Leg,
    pub buy_call_wing: Leg,
    pub buy_put_wing: Leg,
    pub sell_call_stop: Leg,
    pub sell_put_stop: Leg,
}

impl PositionSet {
    #[must_use]
    pub fn get(&self, slot: LegSlot) -> &Leg {
        match slot {
            LegSlot::SellCall => &self.sell_call,
            LegSlot::SellPut => &self.sell_put,
            LegSlot::BuyCallWing => &self.buy_call_wing,
            LegSlot::BuyPutWing => &self.buy_put_wing,
            LegSlot::SellCallStop => &self.sell_call_stop,
            LegSlot::SellPutStop => &self.sell_put_stop,
        }
    }

    pub fn get_mut(&mut self, slot: LegSlot) -> &mut Leg {
        match slot {
            LegSlot::SellCall => &mut self.sell_call,
            LegSlot::SellPut => &mut self.sell_put,
            LegSlot::BuyCallWing => &mut self.buy_call_wing,
            LegSlot::BuyPutWing => &mut self.buy_put_wing,
            LegSlot::SellCallStop => &mut self.sell_call_stop,
            LegSlot::SellPutStop => &mut self.sell_put_stop,
        }
    }

    pub fn set(&mut self, slot: LegSlot, leg: Leg) {
        *self.get_mut(slot) = leg;
    }

    /// True when no slot holds a leg.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        LegSlot::ALL.iter().all(|slot| self.get(*slot).is_empty())
    }

    /// True when an unwind was interrupted part way.
    #[must_use]
    pub fn is_unwinding(&self) -> bool {
        LegSlot::ALL.iter().any(|slot| {
            let leg = self.get(*slot);
            leg.closed || !leg.exit_order_id.is_empty()
        })
    }

    /// Occupied slots in placement order.
    pub fn legs(&self) -> impl Iterator<Item = (LegSlot, &Leg)> {
        LegSlot::ALL
            .into_iter()
            .map(move |slot| (slot, self.get(slot)))
            .filter(|(_, leg)| !leg.is_empty())
    }
}

/// Loads and saves a [`PositionSet`] as the single record of a namespace.
pub struct PositionStore {
    store: Arc<dyn StateStore>,
    namespace: String,
    key: Option<RecordKey>,
}

impl PositionStore {
    pub fn new(store: Arc<dyn StateStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            key: None,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn key(&self) -> Option<&RecordKey> {
        self.key.as_ref()
    }

    /// Loads the set, creating the namespace and an empty record on first use.
    ///
    /// # Errors
    ///
    /// Store failures or an undecodable document.
    pub async fn load(&mut self) -> Result<PositionSet> {
        self.store.create_namespace(&self.namespace).await?;

        match self.store.get(&self.namespace).await? {
            Some(record) => {
                let set: PositionSet =
                    serde_json::from_value(record.document).map_err(StoreError::from)?;
                debug!(namespace = %self.namespace, id = %record.key.id, "Loaded position set");
                self.key = Some(record.key);
                Ok(set)
            }
            None => {
                let set = PositionSet::default();
                let document = serde_json::to_value(&set).map_err(StoreError::from)?;
                let key = self.store.insert(&self.namespace, document).await?;
                info!(namespace = %self.namespace, id = %key.id, "Created position record");
                self.key = Some(key);
                Ok(set)
            }
        }
    }

    /// Writes the whole set back to its record.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn save(&mut self, set: &PositionSet) -> Result<()> {
        let document = serde_json::to_value(set).map_err(StoreError::from)?;
        if let Some(key) = &self.key {
            self.store.update(key, document).await?;
            return Ok(());
        }
        let key = self.store.insert(&self.namespace, document).await?;
        self.key = Some(key);
        Ok(())
    }
}
