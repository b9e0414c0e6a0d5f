//! Session state, status labels and the caption board.

use std::collections::VecDeque;

/// Which live surface a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveVariant {
    /// Voice-only assistant with optional story mode.
    Assistant,
    /// Voice plus camera frames.
    OneToOne,
}

impl LiveVariant {
    /// Status shown while idle.
    pub fn standby_label(self) -> &'static str {
        match self {
            Self::Assistant => "System Standby",
            Self::OneToOne => "Standby",
        }
    }

    /// Status shown while the link is being opened.
    pub fn connecting_label(self) -> &'static str {
        match self {
            Self::Assistant => "Linking Neural Presence...",
            Self::OneToOne => "Linking Neural Command...",
        }
    }

    /// Status shown once the link is open.
    pub fn active_label(self) -> &'static str {
        "Active"
    }

    /// Status when devices or the link cannot be opened.
    pub fn start_failure_label(self) -> &'static str {
        match self {
            Self::Assistant => "Link Refused.",
            Self::OneToOne => "Uplink Refused.",
        }
    }

    /// Status when an open link fails.
    pub fn runtime_failure_label(self) -> &'static str {
        match self {
            Self::Assistant => "Link Unstable.",
            Self::OneToOne => "Link Failed",
        }
    }

    /// Whether this variant streams camera frames.
    pub fn uses_camera(self) -> bool {
        matches!(self, Self::OneToOne)
    }

    /// Short name for logs and the shell.
    pub fn name(self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::OneToOne => "one-to-one",
        }
    }
}

/// Lifecycle state of a live session.
///
/// An interruption is an event, not a state: it discards pending playback
/// and the current caption while the session stays `Active`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No link, no devices.
    #[default]
    Standby,
    /// Devices open, waiting for the link to acknowledge setup.
    Connecting,
    /// Streaming.
    Active,
}

impl SessionState {
    /// Status label of this state for `variant`.
    pub fn label(self, variant: LiveVariant) -> &'static str {
        match self {
            Self::Standby => variant.standby_label(),
            Self::Connecting => variant.connecting_label(),
            Self::Active => variant.active_label(),
        }
    }
}

/// Who is speaking in a caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    /// The person at the microphone.
    User,
    /// The model.
    Model,
}

/// A caption line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    /// Speaker of the line.
    pub speaker: Speaker,
    /// Accumulated text.
    pub text: String,
}

/// Current caption plus a bounded history of finished turns.
#[derive(Debug, Clone)]
pub struct CaptionBoard {
    current: Option<Caption>,
    history: VecDeque<Caption>,
    limit: usize,
}

impl CaptionBoard {
    /// Board keeping at most `limit` finished captions.
    pub fn new(limit: usize) -> Self {
        Self {
            current: None,
            history: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Add a fragment. Same speaker appends; a new speaker replaces the caption.
    pub fn push(&mut self, speaker: Speaker, fragment: &str) {
        if let Some(caption) = &mut self.current
            && caption.speaker == speaker
        {
            caption.text.push_str(fragment);
            return;
        }
        self.current = Some(Caption {
            speaker,
            text: fragment.to_owned(),
        });
    }

    /// Move the current caption into history.
    pub fn flush(&mut self) {
        let Some(caption) = self.current.take() else {
            return;
        };
        if self.limit == 0 {
            return;
        }
        while self.history.len() >= self.limit {
            self.history.pop_front();
        }
        self.history.push_back(caption);
    }

    /// Discard the current caption without recording it.
    pub fn drop_current(&mut self) {
        self.current = None;
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.current = None;
        self.history.clear();
    }

    /// Caption being spoken.
    pub fn current(&self) -> Option<&Caption> {
        self.current.as_ref()
    }

    /// Finished captions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Caption> {
        self.history.iter()
    }

    /// Number of finished captions held.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_per_variant() {
        assert_eq!(SessionState::Standby.label(LiveVariant::Assistant), "System Standby");
        assert_eq!(SessionState::Standby.label(LiveVariant::OneToOne), "Standby");
        assert_eq!(
            SessionState::Connecting.label(LiveVariant::OneToOne),
            "Linking Neural Command..."
        );
        assert_eq!(SessionState::Active.label(LiveVariant::Assistant), "Active");
        assert_eq!(LiveVariant::OneToOne.runtime_failure_label(), "Link Failed");
    }

    #[test]
    fn same_speaker_appends_other_speaker_replaces() {
        let mut board = CaptionBoard::new(11);
        board.push(Speaker::Model, "Hel");
        board.push(Speaker::Model, "lo");
        assert_eq!(board.current().map(|c| c.text.as_str()), Some("Hello"));

        board.push(Speaker::User, "hi");
        let current = board.current().cloned();
        assert_eq!(
            current,
            Some(Caption {
                speaker: Speaker::User,
                text: "hi".into()
            })
        );
        assert_eq!(board.history_len(), 0);
    }

    #[test]
    fn flush_keeps_last_eleven() {
        let mut board = CaptionBoard::new(11);
        for i in 0..15 {
            board.push(Speaker::Model, &format!("turn {i}"));
            board.flush();
        }
        assert_eq!(board.history_len(), 11);
        assert_eq!(board.history().next().map(|c| c.text.as_str()), Some("turn 4"));
        assert!(board.current().is_none());
    }

    #[test]
    fn flush_without_caption_is_noop() {
        let mut board = CaptionBoard::new(3);
        board.flush();
        assert_eq!(board.history_len(), 0);
    }

    #[test]
    fn drop_current_keeps_history() {
        let mut board = CaptionBoard::new(3);
        board.push(Speaker::User, "kept");
        board.flush();
        board.push(Speaker::Model, "dropped");
        board.drop_current();
        assert!(board.current().is_none());
        assert_eq!(board.history_len(), 1);
    }
}
