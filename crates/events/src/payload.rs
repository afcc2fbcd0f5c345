//! Entity snapshots carried as event payloads.
//!
//! Each snapshot is the full state of one entity at the moment the event
//! was produced, serialized with camelCase keys.

use std::fmt;

use casari_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterSnapshot {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub active: Option<bool>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuCategorySnapshot {
    pub id: Uuid,
    pub title: String,
    pub position: i64,
    #[serde(default)]
    pub active: Option<bool>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Prices are integer minor units (cents).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemSnapshot {
    pub id: Uuid,
    pub menu_category_id: Uuid,
    pub title: String,
    pub position: i64,
    #[serde(default)]
    pub active: Option<bool>,
    pub price: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuOptionSnapshot {
    pub id: Uuid,
    pub menu_item_id: Uuid,
    pub title: String,
    pub position: i64,
    #[serde(default)]
    pub active: Option<bool>,
    pub price: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub close: Option<bool>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub table_id: Uuid,
    #[serde(default)]
    pub close: Option<bool>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Payload sum type
// ---------------------------------------------------------------------------

/// Shape of an event payload, without the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Printer,
    MenuCategory,
    MenuItem,
    MenuOption,
    Table,
    Course,
}

impl PayloadKind {
    pub fn name(self) -> &'static str {
        match self {
            PayloadKind::Printer => "printer",
            PayloadKind::MenuCategory => "menu-category",
            PayloadKind::MenuItem => "menu-item",
            PayloadKind::MenuOption => "menu-option",
            PayloadKind::Table => "table",
            PayloadKind::Course => "course",
        }
    }

    /// Decode a stored `eventEntity` object into the snapshot of this kind.
    pub fn decode(self, value: serde_json::Value) -> Result<EventPayload, serde_json::Error> {
        let payload = match self {
            PayloadKind::Printer => EventPayload::Printer(serde_json::from_value(value)?),
            PayloadKind::MenuCategory => EventPayload::MenuCategory(serde_json::from_value(value)?),
            PayloadKind::MenuItem => EventPayload::MenuItem(serde_json::from_value(value)?),
            PayloadKind::MenuOption => EventPayload::MenuOption(serde_json::from_value(value)?),
            PayloadKind::Table => EventPayload::Table(serde_json::from_value(value)?),
            PayloadKind::Course => EventPayload::Course(serde_json::from_value(value)?),
        };
        Ok(payload)
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Entity snapshot attached to an event.
///
/// Serializes as the bare snapshot object. There is no tag on the wire;
/// the envelope's `eventType` selects the shape when decoding, see
/// [`EventType::payload_kind`](crate::EventType::payload_kind).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Printer(PrinterSnapshot),
    MenuCategory(MenuCategorySnapshot),
    MenuItem(MenuItemSnapshot),
    MenuOption(MenuOptionSnapshot),
    Table(TableSnapshot),
    Course(CourseSnapshot),
}

impl EventPayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            EventPayload::Printer(_) => PayloadKind::Printer,
            EventPayload::MenuCategory(_) => PayloadKind::MenuCategory,
            EventPayload::MenuItem(_) => PayloadKind::MenuItem,
            EventPayload::MenuOption(_) => PayloadKind::MenuOption,
            EventPayload::Table(_) => PayloadKind::Table,
            EventPayload::Course(_) => PayloadKind::Course,
        }
    }

    /// Id of the entity the snapshot describes.
    pub fn entity_id(&self) -> Uuid {
        match self {
            EventPayload::Printer(s) => s.id,
            EventPayload::MenuCategory(s) => s.id,
            EventPayload::MenuItem(s) => s.id,
            EventPayload::MenuOption(s) => s.id,
            EventPayload::Table(s) => s.id,
            EventPayload::Course(s) => s.id,
        }
    }
}

impl From<PrinterSnapshot> for EventPayload {
    fn from(s: PrinterSnapshot) -> Self {
        EventPayload::Printer(s)
    }
}

impl From<MenuCategorySnapshot> for EventPayload {
    fn from(s: MenuCategorySnapshot) -> Self {
        EventPayload::MenuCategory(s)
    }
}

impl From<MenuItemSnapshot> for EventPayload {
    fn from(s: MenuItemSnapshot) -> Self {
        EventPayload::MenuItem(s)
    }
}

impl From<MenuOptionSnapshot> for EventPayload {
    fn from(s: MenuOptionSnapshot) -> Self {
        EventPayload::MenuOption(s)
    }
}

impl From<TableSnapshot> for EventPayload {
    fn from(s: TableSnapshot) -> Self {
        EventPayload::Table(s)
    }
}

impl From<CourseSnapshot> for EventPayload {
    fn from(s: CourseSnapshot) -> Self {
        EventPayload::Course(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
