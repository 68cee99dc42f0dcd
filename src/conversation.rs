use serde::{Deserialize, Serialize};

use crate::agent::AgentResponse;
use crate::chart_spec::ColorScheme;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One caller-visible turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Turn history owned by the caller and threaded through every request.
///
/// The agent itself keeps nothing between requests; the colour preference
/// lives here and is handed back to the model on the next turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
    color_preference: Option<ColorScheme>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn color_preference(&self) -> Option<ColorScheme> {
        self.color_preference
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append the user's input and the agent's answer.
    ///
    /// The colour scheme of a rendered chart becomes the remembered preference.
    pub fn record(&mut self, user_input: &str, response: &AgentResponse) {
        self.messages.push(ConversationMessage::user(user_input));
        self.messages
            .push(ConversationMessage::assistant(response.message.clone()));
        if let Some(chart) = &response.chart_data {
            self.color_preference = Some(chart.color_scheme());
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.color_preference = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart_spec::ChartCandidate;

    fn response_with_chart(scheme: &str) -> AgentResponse {
        let spec = ChartCandidate {
            labels: vec!["a".to_string()],
            values: vec![1.0],
            title: "t".to_string(),
            unit: None,
            chart_type: "bar".to_string(),
            color_scheme: scheme.to_string(),
        }
        .validate()
        .unwrap();
        AgentResponse {
            message: "Klaar".to_string(),
            chart_data: Some(spec),
            chart_path: None,
            success: true,
            error: None,
        }
    }

    #[test]
    fn test_record_appends_both_turns() {
        let mut conversation = Conversation::new();
        conversation.record("Maak een grafiek", &response_with_chart("fd"));
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.messages()[0].role, Role::User);
        assert_eq!(conversation.messages()[1].role, Role::Assistant);
        assert_eq!(conversation.messages()[1].content, "Klaar");
    }

    #[test]
    fn test_color_preference_follows_last_chart() {
        let mut conversation = Conversation::new();
        assert_eq!(conversation.color_preference(), None);

        conversation.record("in BNR kleuren", &response_with_chart("bnr"));
        assert_eq!(conversation.color_preference(), Some(ColorScheme::Bnr));

        let refusal = AgentResponse {
            message: "Dat kan ik niet".to_string(),
            chart_data: None,
            chart_path: None,
            success: true,
            error: None,
        };
        conversation.record("Wat is het weer?", &refusal);
        assert_eq!(conversation.color_preference(), Some(ColorScheme::Bnr));
    }

    #[test]
    fn test_clear() {
        let mut conversation = Conversation::new();
        conversation.record("x", &response_with_chart("bnr"));
        conversation.clear();
        assert!(conversation.is_empty());
        assert_eq!(conversation.color_preference(), None);
    }

    #[test]
    fn test_roles_serialise_lowercase() {
        let json = serde_json::to_value(ConversationMessage::assistant("hoi")).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
