//! Slash commands and inline keyboard callback payloads.

use crate::session::DeliveryMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Recs,
}

impl Command {
    /// Parses the leading `/command` of a message.
    ///
    /// A `@botname` suffix is accepted only when it names this bot.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let word = word.strip_prefix('/')?;
        let (name, mention) = match word.split_once('@') {
            Some((name, mention)) => (name, Some(mention)),
            None => (word, None),
        };

        if let Some(mention) = mention {
            match bot_username {
                Some(me) if me.eq_ignore_ascii_case(mention) => {}
                _ => return None,
            }
        }

        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "recs" => Some(Self::Recs),
            _ => None,
        }
    }
}

/// Decoded `callback_data` of an inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// A project was picked from the `/recs` keyboard.
    Project(String),
    /// A delivery mode was picked for listing `generation`.
    Mode {
        generation: u64,
        mode: DeliveryMode,
    },
    /// Recording `index` (zero-based) of listing `generation` was picked.
    Select { generation: u64, index: usize },
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        match self {
            Self::Project(slug) => format!("p:{}", slug),
            Self::Mode { generation, mode } => format!("m:{}:{}", generation, mode.as_str()),
            Self::Select { generation, index } => format!("s:{}:{}", generation, index),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let (tag, rest) = data.split_once(':')?;
        match tag {
            "p" if !rest.is_empty() => Some(Self::Project(rest.to_string())),
            "m" => {
                let (generation, mode) = rest.split_once(':')?;
                Some(Self::Mode {
                    generation: generation.parse().ok()?,
                    mode: DeliveryMode::parse(mode)?,
                })
            }
            "s" => {
                let (generation, index) = rest.split_once(':')?;
                Some(Self::Select {
                    generation: generation.parse().ok()?,
                    index: index.parse().ok()?,
                })
            }
            _ => None,
        }
    }
}
