//! The event envelope, its type enumeration and topics.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use casari_core::types::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::EventError;
use crate::payload::{EventPayload, PayloadKind};

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// Named channel on the bus.
///
/// Well-known topics are provided as constants; any other string is also a
/// valid topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(Cow<'static, str>);

impl Topic {
    pub const PRINTER_V1: Topic = Topic(Cow::Borrowed("topic/v1/printer"));
    pub const MENU_CATEGORY_V1: Topic = Topic(Cow::Borrowed("topic/v1/menu-category"));
    pub const MENU_ITEM_V1: Topic = Topic(Cow::Borrowed("topic/v1/menu-item"));
    pub const MENU_OPTION_V1: Topic = Topic(Cow::Borrowed("topic/v1/menu-option"));
    pub const TABLE_V1: Topic = Topic(Cow::Borrowed("topic/v1/table"));
    pub const COURSE_V1: Topic = Topic(Cow::Borrowed("topic/v1/course"));

    pub const WELL_KNOWN: [Topic; 6] = [
        Topic::PRINTER_V1,
        Topic::MENU_CATEGORY_V1,
        Topic::MENU_ITEM_V1,
        Topic::MENU_OPTION_V1,
        Topic::TABLE_V1,
        Topic::COURSE_V1,
    ];

    pub fn new(name: impl Into<String>) -> Self {
        Topic(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Topic(Cow::Owned(name))
    }
}

impl From<&'static str> for Topic {
    fn from(name: &'static str) -> Self {
        Topic(Cow::Borrowed(name))
    }
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Every event type the system produces.
///
/// The wire form is `<entity>.<action>`, e.g. `menu-item.updated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    PrinterCreated,
    PrinterUpdated,
    PrinterDeleted,
    MenuCategoryCreated,
    MenuCategoryUpdated,
    MenuCategoryDeleted,
    MenuItemCreated,
    MenuItemUpdated,
    MenuItemDeleted,
    MenuOptionCreated,
    MenuOptionUpdated,
    MenuOptionDeleted,
    TableCreated,
    TableUpdated,
    TableDeleted,
    CourseCreated,
    CourseUpdated,
    CourseDeleted,
}

impl EventType {
    pub const ALL: [EventType; 18] = [
        EventType::PrinterCreated,
        EventType::PrinterUpdated,
        EventType::PrinterDeleted,
        EventType::MenuCategoryCreated,
        EventType::MenuCategoryUpdated,
        EventType::MenuCategoryDeleted,
        EventType::MenuItemCreated,
        EventType::MenuItemUpdated,
        EventType::MenuItemDeleted,
        EventType::MenuOptionCreated,
        EventType::MenuOptionUpdated,
        EventType::MenuOptionDeleted,
        EventType::TableCreated,
        EventType::TableUpdated,
        EventType::TableDeleted,
        EventType::CourseCreated,
        EventType::CourseUpdated,
        EventType::CourseDeleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::PrinterCreated => "printer.created",
            EventType::PrinterUpdated => "printer.updated",
            EventType::PrinterDeleted => "printer.deleted",
            EventType::MenuCategoryCreated => "menu-category.created",
            EventType::MenuCategoryUpdated => "menu-category.updated",
            EventType::MenuCategoryDeleted => "menu-category.deleted",
            EventType::MenuItemCreated => "menu-item.created",
            EventType::MenuItemUpdated => "menu-item.updated",
            EventType::MenuItemDeleted => "menu-item.deleted",
            EventType::MenuOptionCreated => "menu-option.created",
            EventType::MenuOptionUpdated => "menu-option.updated",
            EventType::MenuOptionDeleted => "menu-option.deleted",
            EventType::TableCreated => "table.created",
            EventType::TableUpdated => "table.updated",
            EventType::TableDeleted => "table.deleted",
            EventType::CourseCreated => "course.created",
            EventType::CourseUpdated => "course.updated",
            EventType::CourseDeleted => "course.deleted",
        }
    }

    /// Payload registry: the snapshot shape every event of this type carries.
    pub fn payload_kind(self) -> PayloadKind {
        use EventType::*;
        match self {
            PrinterCreated | PrinterUpdated | PrinterDeleted => PayloadKind::Printer,
            MenuCategoryCreated | MenuCategoryUpdated | MenuCategoryDeleted => {
                PayloadKind::MenuCategory
            }
            MenuItemCreated | MenuItemUpdated | MenuItemDeleted => PayloadKind::MenuItem,
            MenuOptionCreated | MenuOptionUpdated | MenuOptionDeleted => PayloadKind::MenuOption,
            TableCreated | TableUpdated | TableDeleted => PayloadKind::Table,
            CourseCreated | CourseUpdated | CourseDeleted => PayloadKind::Course,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EventError::UnsupportedEventType(s.to_string()))
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A domain event: a change to one entity, plus the entity's new state.
///
/// Built with [`Event::new`], which guarantees the payload shape matches
/// the event type, and enriched with [`with_changed_fields`](Event::with_changed_fields).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    event_id: Uuid,
    event_time: Timestamp,
    event_type: EventType,
    event_entity: EventPayload,
    event_changed_fields: Vec<String>,
}

impl Event {
    /// Create an event with a fresh id, stamped now, with no changed fields.
    pub fn new(event_type: EventType, entity: impl Into<EventPayload>) -> Result<Self, EventError> {
        let entity = entity.into();
        let expected = event_type.payload_kind();
        if entity.kind() != expected {
            return Err(EventError::PayloadMismatch {
                event_type,
                expected,
                actual: entity.kind(),
            });
        }
        Ok(Self {
            event_id: Uuid::new_v4(),
            event_time: Utc::now(),
            event_type,
            event_entity: entity,
            event_changed_fields: Vec::new(),
        })
    }

    /// Names of the entity fields this event changed.
    pub fn with_changed_fields(mut self, fields: Vec<String>) -> Self {
        self.event_changed_fields = fields;
        self
    }

    /// Override the production time.
    pub fn with_time(mut self, at: Timestamp) -> Self {
        self.event_time = at;
        self
    }

    pub fn id(&self) -> Uuid {
        self.event_id
    }

    pub fn time(&self) -> Timestamp {
        self.event_time
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn entity(&self) -> &EventPayload {
        &self.event_entity
    }

    pub fn changed_fields(&self) -> &[String] {
        &self.event_changed_fields
    }

    /// Rebuild an event from its stored JSON envelope.
    ///
    /// The type is resolved first so an unknown type is reported as
    /// [`EventError::UnsupportedEventType`], then the entity is decoded into
    /// the shape the type calls for. Id and time are kept as stored.
    pub fn decode(body: serde_json::Value) -> Result<Self, EventError> {
        let envelope: StoredEnvelope = serde_json::from_value(body)?;
        let event_type: EventType = envelope.event_type.parse()?;
        let event_entity = event_type.payload_kind().decode(envelope.event_entity)?;

        Ok(Self {
            event_id: envelope.event_id,
            event_time: envelope.event_time,
            event_type,
            event_entity,
            event_changed_fields: envelope.event_changed_fields.unwrap_or_default(),
        })
    }
}

/// Envelope as read back from the outbox, before the type is resolved.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEnvelope {
    event_id: Uuid,
    event_time: Timestamp,
    event_type: String,
    event_entity: serde_json::Value,
    // Older rows store `null` instead of an empty list.
    #[serde(default)]
    event_changed_fields: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
