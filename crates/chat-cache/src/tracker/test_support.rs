//! Sample entity used by the tracker tests

use crate::tracker::{ApplyError, ChangeSender, ChangeSet};
use async_trait::async_trait;
use chat_core::{Deletable, Entity, FieldValue, Mutable, NetworkSynced, Snapshot, Snowflake};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: Snowflake,
    pub name: String,
    pub topic: Option<String>,
    pub position: u32,
    pub deleted: bool,
}

impl Channel {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id: Snowflake::new(id),
            name: name.to_string(),
            topic: None,
            position: 0,
            deleted: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelField {
    Name,
    Topic,
    Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValue {
    Name(String),
    Topic(Option<String>),
    Position(u32),
}

impl Snapshot for ChannelValue {
    fn snapshot(&self) -> Self {
        match self {
            Self::Name(v) => Self::Name(v.snapshot()),
            Self::Topic(v) => Self::Topic(v.snapshot()),
            Self::Position(v) => Self::Position(*v),
        }
    }
}

impl FieldValue for ChannelValue {
    type Field = ChannelField;

    fn field(&self) -> ChannelField {
        match self {
            Self::Name(_) => ChannelField::Name,
            Self::Topic(_) => ChannelField::Topic,
            Self::Position(_) => ChannelField::Position,
        }
    }
}

impl Entity for Channel {
    fn id(&self) -> Snowflake {
        self.id
    }
}

impl Mutable for Channel {
    type Value = ChannelValue;

    fn get(&self, field: ChannelField) -> ChannelValue {
        match field {
            ChannelField::Name => ChannelValue::Name(self.name.clone()),
            ChannelField::Topic => ChannelValue::Topic(self.topic.clone()),
            ChannelField::Position => ChannelValue::Position(self.position),
        }
    }

    fn set(&mut self, value: ChannelValue) {
        match value {
            ChannelValue::Name(v) => self.name = v,
            ChannelValue::Topic(v) => self.topic = v,
            ChannelValue::Position(v) => self.position = v,
        }
    }
}

impl NetworkSynced for Channel {}

impl Deletable for Channel {
    fn on_deleted(&mut self) {
        self.deleted = true;
    }
}

/// Sender answering every apply with a fixed HTTP status
pub struct StatusSender {
    pub status: u16,
    pub calls: Mutex<Vec<(Snowflake, usize, Option<String>)>>,
}

impl StatusSender {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChangeSender<ChannelValue> for StatusSender {
    async fn send(
        &self,
        id: Snowflake,
        changes: &ChangeSet<ChannelValue>,
        reason: Option<&str>,
    ) -> Result<(), ApplyError> {
        self.calls
            .lock()
            .push((id, changes.len(), reason.map(str::to_string)));
        if (200..300).contains(&self.status) {
            Ok(())
        } else {
            Err(ApplyError::Rejected {
                status: self.status,
                body: "{\"message\": \"rejected\"}".to_string(),
            })
        }
    }
}

/// Sender whose apply never completes
pub struct HangingSender;

#[async_trait]
impl ChangeSender<ChannelValue> for HangingSender {
    async fn send(
        &self,
        _id: Snowflake,
        _changes: &ChangeSet<ChannelValue>,
        _reason: Option<&str>,
    ) -> Result<(), ApplyError> {
        std::future::pending().await
    }
}
