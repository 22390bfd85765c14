use serde::{Deserialize, Serialize};

// --- Feed scoping ---

/// Which index a feed record is filed under: the whole site, a single
/// group, or a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedScope {
    Sitewide,
    Group,
    Event,
}

impl FeedScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedScope::Sitewide => "sitewide",
            FeedScope::Group => "group",
            FeedScope::Event => "event",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "sitewide" => Some(FeedScope::Sitewide),
            "group" => Some(FeedScope::Group),
            "event" => Some(FeedScope::Event),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Visibility ---

/// Who may see a feed record. Derived from the parent entity's privacy
/// setting at creation time; never supplied directly by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Authenticated,
    MembersOnly,
    /// Reserved. No resolver path produces this today.
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Authenticated => "authenticated",
            Visibility::MembersOnly => "members_only",
            Visibility::Private => "private",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Visibility::Public),
            "authenticated" => Some(Visibility::Authenticated),
            "members_only" => Some(Visibility::MembersOnly),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Privacy setting of a parent entity (group or event) as delivered by the
/// platform. Parsing never fails: unrecognized labels land in `Other` and
/// resolve to public visibility downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentPrivacy {
    Public,
    Authenticated,
    Private,
    Other,
}

impl ParentPrivacy {
    pub fn from_label(label: &str) -> Self {
        match label {
            "public" => ParentPrivacy::Public,
            "authenticated" => ParentPrivacy::Authenticated,
            "private" => ParentPrivacy::Private,
            _ => ParentPrivacy::Other,
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, ParentPrivacy::Public | ParentPrivacy::Other)
    }
}

// --- Aggregation ---

/// How a record folds repeated events: not at all, into a rolling
/// fixed-size time bucket, or into a daily bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    None,
    TimeWindow,
    Daily,
}

impl AggregationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationStrategy::None => "none",
            AggregationStrategy::TimeWindow => "time_window",
            AggregationStrategy::Daily => "daily",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(AggregationStrategy::None),
            "time_window" => Some(AggregationStrategy::TimeWindow),
            "daily" => Some(AggregationStrategy::Daily),
            _ => None,
        }
    }

    pub fn is_windowed(&self) -> bool {
        !matches!(self, AggregationStrategy::None)
    }
}

impl std::fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_round_trips_through_labels() {
        for scope in [FeedScope::Sitewide, FeedScope::Group, FeedScope::Event] {
            assert_eq!(FeedScope::parse_str(scope.as_str()), Some(scope));
        }
        assert_eq!(FeedScope::parse_str("global"), None);
    }

    #[test]
    fn unknown_privacy_label_is_other() {
        assert_eq!(ParentPrivacy::from_label("public"), ParentPrivacy::Public);
        assert_eq!(ParentPrivacy::from_label("secret"), ParentPrivacy::Other);
        assert!(ParentPrivacy::from_label("secret").is_public());
    }
}
