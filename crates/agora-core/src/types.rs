use serde::{Deserialize, Serialize};

/// Operating mode of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Simple,
    Debate,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Simple => "simple",
            Mode::Debate => "debate",
        }
    }

    /// Parse from a stored string. Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "simple" => Some(Mode::Simple),
            "debate" => Some(Mode::Debate),
            _ => None,
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Simple
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a stored conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminator for what a stored message represents.
///
/// Plain chat traffic uses `User`/`FinalAnswer`; the remaining variants are
/// debate artifacts persisted under the `system` role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    FinalAnswer,
    ModeratorInit,
    ModeratorSynthesize,
    ExpertAnswer,
    CriticReview,
    SystemNote,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::FinalAnswer => "final_answer",
            MessageType::ModeratorInit => "moderator_init",
            MessageType::ModeratorSynthesize => "moderator_synthesize",
            MessageType::ExpertAnswer => "expert_answer",
            MessageType::CriticReview => "critic_review",
            MessageType::SystemNote => "system_note",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageType::User),
            "final_answer" => Some(MessageType::FinalAnswer),
            "moderator_init" => Some(MessageType::ModeratorInit),
            "moderator_synthesize" => Some(MessageType::ModeratorSynthesize),
            "expert_answer" => Some(MessageType::ExpertAnswer),
            "critic_review" => Some(MessageType::CriticReview),
            "system_note" => Some(MessageType::SystemNote),
            _ => None,
        }
    }

    /// True for the per-round artifacts that must carry an iteration number.
    pub fn is_round_artifact(&self) -> bool {
        matches!(
            self,
            MessageType::ExpertAnswer
                | MessageType::CriticReview
                | MessageType::ModeratorSynthesize
        )
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
