use chrono::Duration;
use domains::{DomainError, PermissionLevel};
use integration_tests::{Harness, ADMIN, HELPER, MEMBER, MODERATOR, OWNER};
use services::{CommandReply, DispatchOutcome};

#[tokio::test]
async fn chatter_and_unknown_commands_are_ignored() {
    let bot = Harness::new().await;
    for text in ["hello there", "", "!", "??", "!nosuchcommand", "tag faq"] {
        assert_eq!(bot.send(MEMBER, text).await, DispatchOutcome::NoMatch, "{text:?}");
    }
}

#[tokio::test]
async fn bot_messages_never_dispatch() {
    let bot = Harness::new().await;
    let mut event = bot.event(MEMBER, "!help", 0);
    event.author_is_bot = true;
    assert_eq!(bot.dispatcher.dispatch(event).await, DispatchOutcome::NoMatch);
}

#[tokio::test]
async fn help_lists_only_runnable_commands() {
    let bot = Harness::new().await;

    let member_help = bot.reply(MEMBER, "!help").await;
    assert!(member_help.contains("`!tag`"));
    assert!(member_help.contains("`!perm`"));
    assert!(!member_help.contains("`!tagset`"));
    assert!(!member_help.contains("`!ban`"));

    let moderator_help = bot.reply(MODERATOR, "!help").await;
    assert!(moderator_help.contains("`!tagset`"));
    assert!(moderator_help.contains("`!ban`"));

    let detail = bot.reply(MEMBER, "!help t").await;
    assert!(detail.contains("tag <name> [args...]"));
    assert!(detail.contains("cooldown: 3s"));

    let hidden = bot.send(MEMBER, "!help ban").await;
    assert!(matches!(hidden, DispatchOutcome::HandlerError { .. }));
}

#[tokio::test]
async fn role_overrides_unlock_moderation() {
    let bot = Harness::new().await;

    let denied = bot.send(HELPER, "!warn <@5> spamming").await;
    assert_eq!(
        denied,
        DispatchOutcome::Unauthorized {
            command: "warn".into(),
            required: PermissionLevel::Moderator,
            actual: PermissionLevel::Helper,
        }
    );
    assert!(denied.reply_text().is_some());

    let reply = bot.reply(MODERATOR, "!warn <@5> spamming links").await;
    assert_eq!(reply, "<@5> has been warned: spamming links");
}

#[tokio::test]
async fn tag_cooldown_is_per_user() {
    let bot = Harness::new().await;
    bot.reply(HELPER, "!tagset faq Read the docs.").await;

    let first = bot.send_at(MEMBER, "!tag faq", 1_000).await;
    assert!(matches!(first, DispatchOutcome::Completed { .. }));

    let second = bot.send_at(MEMBER, "??faq", 1_001).await;
    assert_eq!(
        second,
        DispatchOutcome::RateLimited { command: "tag".into(), retry_after: Duration::seconds(2) }
    );
    assert_eq!(second.reply_text().as_deref(), Some("`tag` is on cooldown, try again in 2s."));

    let other_user = bot.send_at(ADMIN, "!t faq", 1_001).await;
    assert!(matches!(other_user, DispatchOutcome::Completed { .. }));

    let later = bot.send_at(MEMBER, "!tag faq", 1_003).await;
    assert!(matches!(later, DispatchOutcome::Completed { .. }));
}

#[tokio::test]
async fn failed_invocations_still_take_the_cooldown() {
    let bot = Harness::new().await;
    bot.reply(HELPER, "!tagset faq docs").await;

    let missing = bot.send_at(MEMBER, "!tag nothing", 0).await;
    assert!(matches!(
        missing,
        DispatchOutcome::HandlerError { error: DomainError::NotFound { .. }, .. }
    ));
    let limited = bot.send_at(MEMBER, "!tag faq", 1).await;
    assert!(matches!(limited, DispatchOutcome::RateLimited { .. }));
}

#[tokio::test]
async fn handler_errors_become_notices() {
    let bot = Harness::new().await;

    let outcome = bot.send(HELPER, "!tagset broken {if arg1}never closed").await;
    let DispatchOutcome::HandlerError { command, .. } = &outcome else {
        panic!("expected handler error, got {outcome:?}");
    };
    assert_eq!(command, "tagset");
    let notice = outcome.reply_text().unwrap_or_default();
    assert!(notice.contains("unterminated"), "{notice}");

    // Dispatch keeps working for everything else.
    assert!(matches!(bot.send(MEMBER, "!tags").await, DispatchOutcome::Completed { .. }));
}

#[tokio::test]
async fn permission_management_round_trip() {
    let bot = Harness::new().await;

    assert_eq!(bot.reply(MEMBER, "!perm check").await, "<@5> is everyone.");
    assert!(matches!(
        bot.send(MEMBER, "!perm set user 5 helper").await,
        DispatchOutcome::HandlerError { .. }
    ));

    assert_eq!(bot.reply(ADMIN, "!perm set user <@5> helper").await, "<@5> is now helper.");
    assert_eq!(bot.reply(MEMBER, "!perm check").await, "<@5> is helper.");
    assert!(matches!(bot.send(MEMBER, "!tagset mine hi").await, DispatchOutcome::Completed { .. }));

    // Admins cannot mint owners; owners can.
    assert!(matches!(
        bot.send(ADMIN, "!perm set user 5 owner").await,
        DispatchOutcome::HandlerError { .. }
    ));
    assert_eq!(bot.reply(OWNER, "!perm set role <@&77> moderator").await, "<@&77> is now moderator.");

    let listing = bot.reply(ADMIN, "!perm list").await;
    assert!(listing.lines().next().unwrap_or_default().contains("owner"));
    assert!(listing.contains("<@&77>: moderator"));

    assert_eq!(
        bot.reply(ADMIN, "!perm clear user 5").await,
        "Cleared the override for <@5>."
    );
    assert_eq!(bot.reply(MEMBER, "!perm check").await, "<@5> is everyone.");
}

#[tokio::test]
async fn superiors_overrides_cannot_be_changed() {
    let bot = Harness::new().await;

    for text in ["!perm set user 1 everyone", "!perm set user <@1> administrator", "!perm clear user 1"] {
        let outcome = bot.send(ADMIN, text).await;
        assert!(
            matches!(outcome, DispatchOutcome::HandlerError { error: DomainError::Unauthorized(_), .. }),
            "{text}: {outcome:?}"
        );
    }
    assert_eq!(bot.reply(OWNER, "!perm check").await, "<@1> is owner.");

    // Peers and inferiors remain editable.
    assert_eq!(bot.reply(ADMIN, "!perm set user 4 moderator").await, "<@4> is now moderator.");
    assert_eq!(bot.reply(OWNER, "!perm clear user 2").await, "Cleared the override for <@2>.");
}

#[tokio::test]
async fn empty_tag_output_is_silent() {
    let bot = Harness::new().await;
    bot.reply(HELPER, "!tagset greet {if arg1}Hi {arg1}{endif}").await;

    let silent = bot.send(MEMBER, "!tag greet").await;
    assert_eq!(
        silent,
        DispatchOutcome::Completed { command: "tag".into(), reply: CommandReply::Silent }
    );
    assert_eq!(silent.reply_text(), None);
}
