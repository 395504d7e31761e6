//! Typed records for each entity table, shaped after the remote schema.
//!
//! All envelope fields default to empty so call sites can build a record from
//! its domain fields and let the accessor stamp id and timestamps.

use serde::{Deserialize, Serialize};

use super::{EntityKind, Record};

macro_rules! record_envelope {
  ($ty:ty, $kind:expr) => {
    impl Record for $ty {
      fn kind() -> EntityKind {
        $kind
      }

      fn id(&self) -> &str {
        &self.id
      }

      fn set_id(&mut self, id: String) {
        self.id = id;
      }

      fn created_at(&self) -> &str {
        &self.created_at
      }

      fn set_created_at(&mut self, ts: String) {
        self.created_at = ts;
      }

      fn updated_at(&self) -> &str {
        &self.updated_at
      }

      fn set_updated_at(&mut self, ts: String) {
        self.updated_at = ts;
      }
    }
  };
}

/// A dairy cow in the herd.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cow {
  #[serde(default)]
  pub id: String,
  pub name: String,
  pub breed: Option<String>,
  pub birth_date: Option<String>,
  pub health_status: String,
  pub last_milking_amount: Option<f64>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

record_envelope!(Cow, EntityKind::Cows);

/// One milking session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MilkRecord {
  #[serde(default)]
  pub id: String,
  pub cow_id: Option<String>,
  pub date: String,
  /// Litres collected.
  pub amount: f64,
  pub milking_period: Option<String>,
  pub milking_time: Option<String>,
  pub quality_grade: Option<String>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

record_envelope!(MilkRecord, EntityKind::MilkRecords);

/// Daily egg collection tally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EggRecord {
  #[serde(default)]
  pub id: String,
  pub date: String,
  pub count: i64,
  pub quality_grade: Option<String>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

record_envelope!(EggRecord, EntityKind::EggRecords);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlaughterRecord {
  #[serde(default)]
  pub id: String,
  pub date: String,
  pub animal_type: String,
  pub count: i64,
  pub weight_kg: Option<f64>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

record_envelope!(SlaughterRecord, EntityKind::SlaughterRecords);

/// Feed stock on hand, with a reorder threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
  #[serde(default)]
  pub id: String,
  pub feed_type: String,
  pub current_stock: f64,
  pub unit: String,
  pub reorder_level: f64,
  pub cost_per_unit: Option<f64>,
  pub supplier: Option<String>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

record_envelope!(FeedItem, EntityKind::FeedInventory);

/// A sale rung up at a shop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
  #[serde(default)]
  pub id: String,
  pub date: String,
  pub product_type: String,
  pub quantity: f64,
  /// Sale total in shillings.
  pub amount: f64,
  pub shop_id: Option<String>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

record_envelope!(SalesRecord, EntityKind::SalesRecords);

/// Daily per-shop stock sheet for one product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
  #[serde(default)]
  pub id: String,
  pub date: String,
  pub product_type: String,
  pub initial_stock: f64,
  pub quantity_received: f64,
  pub current_stock: f64,
  pub spoilt_amount: Option<f64>,
  pub notes: Option<String>,
  pub shop_id: String,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

record_envelope!(InventoryItem, EntityKind::Inventory);

/// Price of a product, effective from a date, optionally per shop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPrice {
  #[serde(default)]
  pub id: String,
  pub product_type: String,
  pub price: f64,
  pub effective_date: String,
  pub shop_id: Option<String>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

record_envelope!(ProductPrice, EntityKind::ProductPrices);

/// One processing batch: raw milk in, yoghurt and mala out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MilkProcessingRecord {
  #[serde(default)]
  pub id: String,
  pub date: String,
  pub total_milk_used: f64,
  pub yoghurt_amount: f64,
  pub mala_amount: f64,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

record_envelope!(MilkProcessingRecord, EntityKind::MilkProcessingRecords);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shop {
  #[serde(default)]
  pub id: String,
  pub name: String,
  pub location: Option<String>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

record_envelope!(Shop, EntityKind::Shops);

/// What a signed-in user is allowed to see and edit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  FarmOwner,
  FarmManager,
  #[default]
  ShopManager,
}

/// Application profile attached to an auth user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  #[serde(default)]
  pub id: String,
  pub user_id: String,
  pub email: String,
  pub full_name: String,
  pub role: Role,
  pub shop_id: Option<String>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

record_envelope!(Profile, EntityKind::Profiles);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn envelope_accessors_read_and_write() {
    let mut cow = Cow {
      name: "Bessie".into(),
      health_status: "healthy".into(),
      ..Default::default()
    };
    assert_eq!(cow.id(), "");
    cow.set_id("cow-1".into());
    cow.set_created_at("2024-01-01T00:00:00.000Z".into());
    cow.set_updated_at("2024-01-02T00:00:00.000Z".into());
    assert_eq!(cow.id(), "cow-1");
    assert_eq!(cow.created_at(), "2024-01-01T00:00:00.000Z");
    assert_eq!(cow.updated_at(), "2024-01-02T00:00:00.000Z");
    assert_eq!(Cow::kind(), EntityKind::Cows);
  }

  #[test]
  fn role_uses_snake_case_wire_names() {
    assert_eq!(serde_json::to_string(&Role::FarmOwner).unwrap(), "\"farm_owner\"");
    let role: Role = serde_json::from_str("\"shop_manager\"").unwrap();
    assert_eq!(role, Role::ShopManager);
  }

  #[test]
  fn record_deserializes_without_envelope_fields() {
    let row: SalesRecord =
      serde_json::from_str(r#"{"date":"2024-06-01","product_type":"milk","quantity":5,"amount":300,"shop_id":null}"#)
        .unwrap();
    assert_eq!(row.id, "");
    assert_eq!(row.quantity, 5.0);
  }
}
