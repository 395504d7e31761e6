//! Entity kinds and the shared record envelope.
//!
//! The hosted service keys every operation by a table-name string. Here the
//! known tables are a closed enum, so a misspelled table is a compile error
//! and every kind maps to exactly one record shape.

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

mod records;

pub use records::{
  Cow, EggRecord, FeedItem, InventoryItem, MilkProcessingRecord, MilkRecord, ProductPrice,
  Profile, Role, SalesRecord, Shop, SlaughterRecord,
};

/// The entity tables the application records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  Cows,
  MilkRecords,
  EggRecords,
  SlaughterRecords,
  FeedInventory,
  SalesRecords,
  Inventory,
  ProductPrices,
  MilkProcessingRecords,
  Shops,
  Profiles,
}

impl EntityKind {
  /// Every known kind, in provisioning order.
  pub const ALL: [EntityKind; 11] = [
    EntityKind::Cows,
    EntityKind::MilkRecords,
    EntityKind::EggRecords,
    EntityKind::SlaughterRecords,
    EntityKind::FeedInventory,
    EntityKind::SalesRecords,
    EntityKind::Inventory,
    EntityKind::ProductPrices,
    EntityKind::MilkProcessingRecords,
    EntityKind::Shops,
    EntityKind::Profiles,
  ];

  /// Table name as the remote service and the local store spell it.
  pub fn table_name(self) -> &'static str {
    match self {
      EntityKind::Cows => "cows",
      EntityKind::MilkRecords => "milk_records",
      EntityKind::EggRecords => "egg_records",
      EntityKind::SlaughterRecords => "slaughter_records",
      EntityKind::FeedInventory => "feed_inventory",
      EntityKind::SalesRecords => "sales_records",
      EntityKind::Inventory => "inventory",
      EntityKind::ProductPrices => "product_prices",
      EntityKind::MilkProcessingRecords => "milk_processing_records",
      EntityKind::Shops => "shops",
      EntityKind::Profiles => "profiles",
    }
  }

  /// Parse a stored table name back into a kind.
  pub fn from_table_name(name: &str) -> Option<Self> {
    Self::ALL.iter().copied().find(|kind| kind.table_name() == name)
  }
}

impl std::fmt::Display for EntityKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.table_name())
  }
}

/// A domain record that can live in the local cache and sync to the remote.
///
/// Every record carries the same envelope: a globally unique string id
/// (client-minted when the record is created offline, so it never collides on
/// replay) plus ISO-8601 created/updated timestamps.
pub trait Record:
  Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
  /// The table this record belongs to.
  fn kind() -> EntityKind;

  fn id(&self) -> &str;
  fn set_id(&mut self, id: String);

  fn created_at(&self) -> &str;
  fn set_created_at(&mut self, ts: String);

  fn updated_at(&self) -> &str;
  fn set_updated_at(&mut self, ts: String);
}

/// Current time as an ISO-8601 string with millisecond precision, the format
/// the remote service stores.
pub fn iso_now() -> String {
  Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Mint a collision-resistant record id.
pub fn fresh_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn table_names_round_trip() {
    for kind in EntityKind::ALL {
      assert_eq!(EntityKind::from_table_name(kind.table_name()), Some(kind));
    }
    assert_eq!(EntityKind::from_table_name("not_a_table"), None);
  }

  #[test]
  fn kind_serializes_as_table_name() {
    let json = serde_json::to_string(&EntityKind::MilkRecords).unwrap();
    assert_eq!(json, "\"milk_records\"");
  }

  #[test]
  fn fresh_ids_are_unique() {
    assert_ne!(fresh_id(), fresh_id());
  }

  #[test]
  fn iso_now_is_rfc3339() {
    let ts = iso_now();
    assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
  }
}
