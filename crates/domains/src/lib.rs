//! tagbot/crates/domains/src/lib.rs
//!
//! The central domain types and collaborator contracts for tagbot.
//! Nothing in this crate performs I/O.

pub mod errors;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use models::*;
pub use ports::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use chrono::Utc;

    #[test]
    fn permission_levels_are_totally_ordered() {
        assert!(PermissionLevel::Everyone < PermissionLevel::Helper);
        assert!(PermissionLevel::Helper < PermissionLevel::Moderator);
        assert!(PermissionLevel::Moderator < PermissionLevel::Administrator);
        assert!(PermissionLevel::Administrator < PermissionLevel::Owner);
        assert_eq!(PermissionLevel::default(), PermissionLevel::Everyone);
    }

    #[test]
    fn permission_level_parses_case_insensitively() {
        assert_eq!("MOD".parse::<PermissionLevel>().unwrap(), PermissionLevel::Moderator);
        assert_eq!("admin".parse::<PermissionLevel>().unwrap(), PermissionLevel::Administrator);
        assert!("root".parse::<PermissionLevel>().is_err());
    }

    #[test]
    fn unknown_levels_list_the_valid_ones() {
        let err = "root".parse::<PermissionLevel>().unwrap_err();
        assert_eq!(
            err,
            crate::DomainError::Validation(
                "unknown permission level `root`; expected one of everyone, helper, moderator, administrator, owner"
                    .into()
            )
        );
        for level in PermissionLevel::ALL {
            assert_eq!(level.as_str().parse::<PermissionLevel>().unwrap(), level);
        }
    }

    #[test]
    fn user_ids_accept_mentions() {
        assert_eq!("<@42>".parse::<UserId>().unwrap(), UserId(42));
        assert_eq!("<@!42>".parse::<UserId>().unwrap(), UserId(42));
        assert_eq!("42".parse::<UserId>().unwrap(), UserId(42));
        assert!("someone".parse::<UserId>().is_err());
    }

    #[test]
    fn identity_from_event_keeps_roles() {
        let event = MessageEvent {
            guild_id: GuildId(1),
            channel_id: ChannelId(2),
            user_id: UserId(3),
            role_ids: [RoleId(7), RoleId(8)].into_iter().collect(),
            raw_text: "!help".to_string(),
            timestamp: Utc::now(),
            author_is_bot: false,
        };
        let identity = event.identity();
        assert_eq!(identity.user_id, UserId(3));
        assert_eq!(identity.guild_id, GuildId(1));
        assert!(identity.role_ids.contains(&RoleId(8)));
    }

    #[test]
    fn revocation_kinds_map_to_their_targets() {
        assert_eq!(ModerationKind::Unmute.revokes(), Some(ModerationKind::Mute));
        assert_eq!(ModerationKind::Unban.revokes(), Some(ModerationKind::Ban));
        assert_eq!(ModerationKind::Warn.revokes(), None);
    }
}
