//! Domain events as delivered by the platform, at-least-once.
//!
//! A closed set: the router matches exhaustively, so adding a variant is a
//! compile-time prompt to extend the fan-out policy table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    GroupCreated {
        group_slug: String,
    },
    GroupUpdated {
        group_slug: String,
    },
    MemberJoined {
        group_slug: String,
        user_id: String,
    },
    EventCreated {
        event_slug: String,
    },
    EventUpdated {
        event_slug: String,
    },
    RsvpAdded {
        event_slug: String,
        user_id: String,
    },
}
