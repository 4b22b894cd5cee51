use crate::domain::{ChannelId, UserId};

/// Channel kinds the bot creates or inspects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Category,
}

/// The fixed capability triple the bot grants or denies on a channel:
/// view, send, and read message history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

/// Who a seeded permission entry applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessSubject {
    Member(UserId),
    /// The default community role (@everyone).
    Everyone,
}

/// One permission entry seeded at channel creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessRule {
    pub subject: AccessSubject,
    pub access: Access,
}

/// What to create. Identity is assigned by the platform and returned.
#[derive(Clone, Debug)]
pub struct ChannelBlueprint {
    pub name: String,
    pub kind: ChannelKind,
    pub parent: Option<ChannelId>,
    pub overwrites: Vec<AccessRule>,
}

impl ChannelBlueprint {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Text,
            parent: None,
            overwrites: Vec::new(),
        }
    }

    pub fn category(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Category,
            parent: None,
            overwrites: Vec::new(),
        }
    }

    pub fn parent(mut self, parent: ChannelId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn overwrite(mut self, subject: AccessSubject, access: Access) -> Self {
        self.overwrites.push(AccessRule { subject, access });
        self
    }
}

/// A channel as listed by the platform.
#[derive(Clone, Debug)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub parent: Option<ChannelId>,
}

/// A message received while waiting on a dialogue prompt.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub author: UserId,
    pub content: String,
}
