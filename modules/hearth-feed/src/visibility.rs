//! The only path by which a record's visibility is set.
//!
//! Callers hand over the parent entity's privacy setting; they never supply
//! a feed visibility directly, so a call site cannot escalate visibility.

use hearth_common::{ParentPrivacy, Visibility};

/// Map a parent entity's privacy setting to feed visibility.
/// Unrecognized settings default to public.
pub fn resolve(parent: ParentPrivacy) -> Visibility {
    match parent {
        ParentPrivacy::Public => Visibility::Public,
        ParentPrivacy::Authenticated => Visibility::Authenticated,
        ParentPrivacy::Private => Visibility::MembersOnly,
        ParentPrivacy::Other => Visibility::Public,
    }
}
