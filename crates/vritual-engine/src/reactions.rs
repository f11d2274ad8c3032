//! Symbolic reactions to fired rituals.

use chrono::Utc;
use vritual_core::{ReactionEvent, Result};
use vritual_store::StateStore;

use crate::events::{EngineEvent, EventBus};

/// Keyword → emotion, first match wins.
const EMOTION_KEYWORDS: &[(&str, &str)] = &[
    ("mirror", "joy"),
    ("loop", "curious"),
    ("rage", "rage"),
    ("night", "calm"),
];

pub const FALLBACK_EMOTION: &str = "confused";

const EMOJI: &[(&str, &str)] = &[
    ("joy", "😊"),
    ("rage", "😠"),
    ("calm", "😌"),
    ("curious", "🤔"),
    ("confused", "😕"),
    ("sacred", "🕯️"),
];

pub fn infer_emotion(ritual_name: &str) -> &'static str {
    EMOTION_KEYWORDS
        .iter()
        .find(|(keyword, _)| ritual_name.contains(keyword))
        .map(|(_, emotion)| *emotion)
        .unwrap_or(FALLBACK_EMOTION)
}

/// The face shown for an emotion, if it has one.
pub fn emoji_for(emotion: &str) -> Option<&'static str> {
    EMOJI.iter().find(|(e, _)| *e == emotion).map(|(_, emoji)| *emoji)
}

#[derive(Clone)]
pub struct ReactionLog {
    store: StateStore,
    events: EventBus,
}

impl ReactionLog {
    pub fn new(store: StateStore, events: EventBus) -> Self {
        Self { store, events }
    }

    pub async fn log_reaction(&self, emotion: &str, source: &str) -> Result<ReactionEvent> {
        let mut event = ReactionEvent::new(emotion, source, Utc::now());
        event.emoji = emoji_for(emotion).map(str::to_string);
        let stored = event.clone();
        self.store.transact(move |doc| doc.push_reaction(stored)).await?;
        self.events.emit(EngineEvent::Reaction {
            emotion: event.emotion.clone(),
            source: event.source.clone(),
        });
        Ok(event)
    }

    /// The last `n` reactions, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ReactionEvent> {
        self.store.read(|doc| doc.recent_reactions(n).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_by_first_matching_keyword() {
        assert_eq!(infer_emotion("mirror_gaze"), "joy");
        assert_eq!(infer_emotion("looped_hello"), "curious");
        assert_eq!(infer_emotion("night_rage"), "rage");
        assert_eq!(infer_emotion("goodnight"), "calm");
        assert_eq!(infer_emotion("mirror_loop"), "joy");
        assert_eq!(infer_emotion("dawn"), FALLBACK_EMOTION);
    }

    #[test]
    fn every_inferred_emotion_has_an_emoji() {
        for (_, emotion) in EMOTION_KEYWORDS {
            assert!(emoji_for(emotion).is_some(), "{emotion}");
        }
        assert_eq!(emoji_for(FALLBACK_EMOTION), Some("😕"));
        assert_eq!(emoji_for("wistful"), None);
    }
}
