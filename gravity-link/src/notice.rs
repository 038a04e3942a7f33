//! Notices produced for the local participant
//!
//! The core only decides when a notice is due; showing it is up to the host.

use crate::config::Theme;
use crate::types::ParticipantId;

/// Notification for the local participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Entered the world and asked to be paired
    Aligning,
    /// Paired with `partner`
    Entangled { partner: ParticipantId },
    /// Orientation may change shortly
    PrepareForDesync,
    /// The relationship has dissolved
    Decoherence,
}

impl Notice {
    /// Plain text without color tags
    pub fn text(&self) -> String {
        match self {
            Notice::Aligning => "Your mass is undergoing quantum alignment...".to_string(),
            Notice::Entangled { partner } => {
                format!("Your mass is now quantum entangled with participant {}", partner)
            }
            Notice::PrepareForDesync => "Prepare for gravitational desynchronisation...".to_string(),
            Notice::Decoherence => {
                "Quantum decoherence has occurred. You are no longer entangled with your partner."
                    .to_string()
            }
        }
    }

    /// Chat text with `[c/RRGGBB:...]` color tags
    pub fn render(&self, theme: &Theme) -> String {
        match self {
            Notice::Entangled { partner } => format!(
                "[c/{}:Your mass is now quantum entangled with ][c/{}:participant {}]",
                theme.notice_color, theme.player_color, partner
            ),
            Notice::PrepareForDesync => format!("[c/{}:{}]", theme.warning_color, self.text()),
            Notice::Aligning | Notice::Decoherence => {
                format!("[c/{}:{}]", theme.notice_color, self.text())
            }
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}
