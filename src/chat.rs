//! Chat line parsing.
//!
//! | Input                 | Topic                    | Text            |
//! |-----------------------|--------------------------|-----------------|
//! | `hello`               | global topic             | `hello`         |
//! | `/w bob see you`      | `chat:whisper:bob`       | `see you`       |
//! | `/w bob`              | global topic             | `/w bob`        |
//! | *(empty / blank)*     | –                        | –               |

use crate::protocol::topics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCommand {
    pub topic: String,
    pub text: String,
}

/// A chat message as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Topic the message arrived on.
    pub topic: String,
    pub from: String,
    pub to: String,
    pub text: String,
}

impl ChatCommand {
    pub fn parse(input: &str, global_topic: &str) -> Option<Self> {
        if input.trim().is_empty() {
            return None;
        }

        if let Some(rest) = input.strip_prefix("/w ") {
            let mut parts = rest.splitn(2, ' ');
            if let (Some(name), Some(text)) = (parts.next(), parts.next()) {
                if !name.is_empty() {
                    return Some(Self {
                        topic: topics::whisper(name),
                        text: text.to_string(),
                    });
                }
            }
        }

        Some(Self {
            topic: global_topic.to_string(),
            text: input.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLOBAL: &str = "chat:global";

    #[test]
    fn plain_line_goes_global() {
        assert_eq!(
            ChatCommand::parse("hello there", GLOBAL),
            Some(ChatCommand {
                topic: GLOBAL.into(),
                text: "hello there".into()
            })
        );
    }

    #[test]
    fn whisper_targets_player_topic() {
        let cmd = ChatCommand::parse("/w bob see you at the gate", GLOBAL).unwrap();
        assert_eq!(cmd.topic, "chat:whisper:bob");
        assert_eq!(cmd.text, "see you at the gate");
    }

    #[test]
    fn incomplete_whisper_falls_back_to_global() {
        let cmd = ChatCommand::parse("/w bob", GLOBAL).unwrap();
        assert_eq!(cmd.topic, GLOBAL);
        assert_eq!(cmd.text, "/w bob");
    }

    #[test]
    fn blank_input_is_ignored() {
        assert_eq!(ChatCommand::parse("", GLOBAL), None);
        assert_eq!(ChatCommand::parse("   ", GLOBAL), None);
    }
}
