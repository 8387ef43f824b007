//! Test fixtures
//!
//! A small guild role entity wired into the tracker the way a domain layer
//! would wire its own types.

use chat_cache::ChangeSet;
use chat_core::{Deletable, Entity, FieldValue, Mutable, NetworkSynced, Snapshot, Snowflake};
use chat_rest::{RestRequest, Route};
use serde_json::{json, Map, Value};

pub const GUILD_ID: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub id: Snowflake,
    pub name: String,
    pub color: u32,
    pub permissions: Vec<String>,
    pub hoist: bool,
}

impl Role {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id: Snowflake::new(id),
            name: name.to_string(),
            color: 0,
            permissions: vec!["SEND_MESSAGES".to_string()],
            hoist: false,
        }
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        Some(Self {
            id: value.get("id")?.as_str()?.parse().ok()?,
            name: value.get("name")?.as_str()?.to_string(),
            color: value.get("color").and_then(Value::as_u64).unwrap_or(0) as u32,
            permissions: Vec::new(),
            hoist: value.get("hoist").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleField {
    Name,
    Color,
    Permissions,
    Hoist,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoleValue {
    Name(String),
    Color(u32),
    Permissions(Vec<String>),
    Hoist(bool),
}

impl RoleValue {
    fn json_entry(&self) -> (&'static str, Value) {
        match self {
            Self::Name(v) => ("name", json!(v)),
            Self::Color(v) => ("color", json!(v)),
            Self::Permissions(v) => ("permissions", json!(v)),
            Self::Hoist(v) => ("hoist", json!(v)),
        }
    }
}

impl Snapshot for RoleValue {
    fn snapshot(&self) -> Self {
        match self {
            Self::Name(v) => Self::Name(v.snapshot()),
            Self::Color(v) => Self::Color(*v),
            Self::Permissions(v) => Self::Permissions(v.snapshot()),
            Self::Hoist(v) => Self::Hoist(*v),
        }
    }
}

impl FieldValue for RoleValue {
    type Field = RoleField;

    fn field(&self) -> RoleField {
        match self {
            Self::Name(_) => RoleField::Name,
            Self::Color(_) => RoleField::Color,
            Self::Permissions(_) => RoleField::Permissions,
            Self::Hoist(_) => RoleField::Hoist,
        }
    }
}

impl Entity for Role {
    fn id(&self) -> Snowflake {
        self.id
    }
}

impl Mutable for Role {
    type Value = RoleValue;

    fn get(&self, field: RoleField) -> RoleValue {
        match field {
            RoleField::Name => RoleValue::Name(self.name.clone()),
            RoleField::Color => RoleValue::Color(self.color),
            RoleField::Permissions => RoleValue::Permissions(self.permissions.clone()),
            RoleField::Hoist => RoleValue::Hoist(self.hoist),
        }
    }

    fn set(&mut self, value: RoleValue) {
        match value {
            RoleValue::Name(v) => self.name = v,
            RoleValue::Color(v) => self.color = v,
            RoleValue::Permissions(v) => self.permissions = v,
            RoleValue::Hoist(v) => self.hoist = v,
        }
    }
}

impl NetworkSynced for Role {
    // Push payloads carry no permissions list; keep the cached one
    fn merge_remote(&mut self, incoming: Self) {
        self.name = incoming.name;
        self.color = incoming.color;
        self.hoist = incoming.hoist;
    }
}

impl Deletable for Role {}

/// PATCH request carrying the latest value of every touched field
pub fn role_patch(id: Snowflake, changes: &ChangeSet<RoleValue>) -> RestRequest {
    let body: Map<String, Value> = changes
        .latest()
        .map(|value| {
            let (key, value) = value.json_entry();
            (key.to_string(), value)
        })
        .collect();
    RestRequest::new(Route::patch(format!("/guilds/{GUILD_ID}/roles/{id}"))).json(Value::Object(body))
}

/// Role payload as the gateway sends it
pub fn role_json(id: u64, name: &str, color: u32) -> Value {
    json!({"id": id.to_string(), "name": name, "color": color, "hoist": false})
}
