//! Canned replies triggered by the message itself rather than by its logs.

use crate::{InboundMessage, InfoBlock, OutboundResponse, Severity};

const LOGO_URL: &str = "https://skinsrestorer.net/logo.png";
const SUPPORT_GPT_URL: &str =
    "https://chatgpt.com/g/g-68f7a885f5688191b9a05f812f4ccf43-skinsrestorer-support-gpt";

/// Replies that only look at the message: spelling and command tips, the
/// staff ping warning and the forum post welcome.
#[derive(Debug, Clone)]
pub struct HintTable {
    staff_roles: Vec<String>,
}

impl HintTable {
    pub fn new(staff_roles: Vec<String>) -> Self {
        Self { staff_roles }
    }

    /// Every hint that applies to `message`, in reply order.
    pub fn check(&self, message: &InboundMessage) -> Vec<OutboundResponse> {
        [
            forum_welcome(message),
            spelling_hint(message),
            console_command_hint(message),
            self.staff_ping_warning(message),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn is_staff(&self, roles: &[String]) -> bool {
        roles
            .iter()
            .any(|role| self.staff_roles.iter().any(|staff| staff == role))
    }

    /// Members pinging staff directly get told off. Replies and staff
    /// senders are exempt.
    fn staff_ping_warning(&self, message: &InboundMessage) -> Option<OutboundResponse> {
        if message.is_reply || message.mentioned_roles.is_empty() {
            return None;
        }
        if self.is_staff(&message.sender_roles) {
            return None;
        }
        if !message
            .mentioned_roles
            .iter()
            .any(|roles| self.is_staff(roles))
        {
            return None;
        }

        Some(OutboundResponse::Text(format!(
            "Hey {}! Please don't tag staff members directly.",
            message.display_name()
        )))
    }
}

/// "SkinRestorer" with the punctuation and case stripped away.
fn spelling_hint(message: &InboundMessage) -> Option<OutboundResponse> {
    let stripped: String = message
        .text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if !stripped.contains("skinrestorer") {
        return None;
    }

    let block = InfoBlock::new(
        Severity::Notice,
        "It looks like you're trying to spell SkinsRestorer!",
        "A useful tip to remember how to spell it is that we restore __many__ **SKINS**, not \
         just one **SKIN**!",
    )
    .with_thumbnail(LOGO_URL);
    Some(single_block(block))
}

/// A lone `/sr <subcommand>` was meant for the server console.
fn console_command_hint(message: &InboundMessage) -> Option<OutboundResponse> {
    let text = message.text.to_lowercase();
    let spaces = text.chars().filter(|c| *c == ' ').count();
    if !text.starts_with("/sr ") || spaces > 1 {
        return None;
    }

    let block = InfoBlock::new(
        Severity::Notice,
        "Not in Discord you fool! Run it in the server 😄",
        "This is a server command, you run it in the server console or in the in-game chat, \
         not in Discord!",
    );
    Some(single_block(block))
}

fn forum_welcome(message: &InboundMessage) -> Option<OutboundResponse> {
    if !message.starts_forum_post {
        return None;
    }

    let block = InfoBlock::new(
        Severity::Info,
        "Need quick SkinsRestorer help?",
        format!(
            "Meet the **SkinsRestorer Support GPT**, our AI assistant trained on SkinsRestorer \
             knowledge and docs.\n\n\
             A GPT is a conversational AI you can chat with like a teammate; it stays online \
             24/7 to guide you through setup, config tweaks, and smaller issues with detailed \
             answers.\n\n\
             Start a chat any time at {SUPPORT_GPT_URL}. If you still need us, drop the \
             specifics of your problem here and we'll follow up as soon as we can!"
        ),
    );
    Some(single_block(block))
}

fn single_block(block: InfoBlock) -> OutboundResponse {
    OutboundResponse::Blocks {
        content: None,
        blocks: vec![block],
        attachment: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::message;

    fn hints() -> HintTable {
        HintTable::new(vec!["Staff".into(), "Developer".into()])
    }

    fn titles(responses: &[OutboundResponse]) -> Vec<String> {
        responses
            .iter()
            .flat_map(|response| match response {
                OutboundResponse::Blocks { blocks, .. } => {
                    blocks.iter().map(|block| block.title.clone()).collect()
                }
                _ => Vec::new(),
            })
            .collect()
    }

    fn staff_ping(text: &str) -> InboundMessage {
        let mut inbound = message("1", "42", "support", text);
        inbound.mentioned_roles = vec![vec!["Member".into()], vec!["Developer".into()]];
        inbound
    }

    #[test]
    fn misspelled_name_gets_the_spelling_tip() {
        for text in ["skinrestorer broke", "Is Skin-Restorer on 1.21?", "SKIN RESTORER!"] {
            let responses = hints().check(&message("1", "42", "support", text));
            assert_eq!(
                titles(&responses),
                vec!["It looks like you're trying to spell SkinsRestorer!"],
                "{text}"
            );
        }
    }

    #[test]
    fn correct_spelling_is_left_alone() {
        let responses = hints().check(&message("1", "42", "support", "SkinsRestorer 15 is great"));
        assert!(responses.is_empty());
    }

    #[test]
    fn lone_sr_command_gets_the_console_tip() {
        let responses = hints().check(&message("1", "42", "support", "/sr reload"));
        assert_eq!(
            titles(&responses),
            vec!["Not in Discord you fool! Run it in the server 😄"]
        );

        let sentence = "/sr reload does not fix my skins";
        assert!(hints().check(&message("1", "42", "support", sentence)).is_empty());
    }

    #[test]
    fn pinging_staff_is_discouraged() {
        let mut inbound = staff_ping("<@1> help");
        inbound.sender_nickname = Some("Alex".into());

        assert_eq!(
            hints().check(&inbound),
            vec![OutboundResponse::Text(
                "Hey Alex! Please don't tag staff members directly.".into()
            )]
        );
    }

    #[test]
    fn staff_pings_from_replies_and_staff_are_fine() {
        let mut reply = staff_ping("<@1> thanks");
        reply.is_reply = true;
        assert!(hints().check(&reply).is_empty());

        let mut from_staff = staff_ping("<@1> can you look?");
        from_staff.sender_roles = vec!["Staff".into()];
        assert!(hints().check(&from_staff).is_empty());

        let mut member_ping = staff_ping("<@2> hi");
        member_ping.mentioned_roles = vec![vec!["Member".into()]];
        assert!(hints().check(&member_ping).is_empty());
    }

    #[test]
    fn new_forum_posts_are_welcomed() {
        let mut inbound = message("9", "42", "my skins vanish", "skins vanish after relog");
        inbound.starts_forum_post = true;

        let responses = hints().check(&inbound);
        assert_eq!(titles(&responses), vec!["Need quick SkinsRestorer help?"]);
        let OutboundResponse::Blocks { blocks, .. } = &responses[0] else {
            panic!("expected a block response");
        };
        assert!(blocks[0].body.contains(SUPPORT_GPT_URL));
    }
}
