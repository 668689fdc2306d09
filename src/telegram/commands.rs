#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    /// `/myid`: echo the chat id and admin status back to the sender.
    MyId,
    /// `/start`: greet and offer the mini-app button.
    Start,
}

impl BotCommand {
    /// Matched by prefix, so `/start@my_bot` and `/start payload` both count.
    pub fn parse(text: &str) -> Option<Self> {
        if text.starts_with("/myid") {
            Some(Self::MyId)
        } else if text.starts_with("/start") {
            Some(Self::Start)
        } else {
            None
        }
    }
}
