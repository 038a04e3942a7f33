//! Relationship teardown on disconnect or explicit decoherence

use crate::error::Result;
use crate::peer::PeerRegistry;
use crate::protocol::{Outbound, Route, ServerMessage};
use crate::types::ParticipantId;

/// Reset `survivor` if it still references `departed`
fn release(registry: &mut PeerRegistry, survivor: ParticipantId, departed: ParticipantId) -> bool {
    match registry.get_mut(survivor) {
        Some(state) if state.partner == Some(departed) => {
            state.decohere();
            true
        }
        _ => false,
    }
}

/// Deactivate `departed` and release whoever was entangled with it
///
/// Returns the released survivor. Any mirrored record still pointing at the
/// departed participant is released as well, so no relationship references an
/// inactive participant afterwards.
pub fn disconnect(registry: &mut PeerRegistry, departed: ParticipantId) -> Option<ParticipantId> {
    let held = registry.leave(departed);
    let dangling: Vec<ParticipantId> = registry
        .active_ids()
        .filter(|id| Some(*id) != held)
        .filter(|id| registry.get(*id).is_some_and(|s| s.partner == Some(departed)))
        .collect();
    for id in dangling {
        release(registry, id, departed);
    }
    held.filter(|survivor| release(registry, *survivor, departed))
}

/// Server: `sender` announced decoherence
///
/// Clears the sender and, if it is still linked back, its former partner,
/// then tells everyone else so their mirrors drop the relationship.
pub fn decohere(registry: &mut PeerRegistry, sender: ParticipantId) -> Result<Outbound> {
    let state = registry.require_mut(sender)?;
    let previous = state.partner;
    state.decohere();
    if let Some(previous) = previous {
        release(registry, previous, sender);
    }
    tracing::info!("Participant '{}' decohered", sender);
    Ok(Outbound::new(
        Route::AllExcept(sender),
        ServerMessage::Decoherence { participant: sender },
    ))
}

/// Client: apply a decoherence notice about `participant`
///
/// Returns true when the local relationship was the one dissolved.
pub fn apply_notice(registry: &mut PeerRegistry, local: ParticipantId, participant: ParticipantId) -> Result<bool> {
    let state = registry.require_mut(participant)?;
    let previous = state.partner;
    state.decohere();
    match previous {
        Some(previous) => {
            let released = release(registry, previous, participant);
            Ok(released && previous == local)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GravityEffect;

    fn id(raw: u8) -> ParticipantId {
        ParticipantId::new(raw)
    }

    fn entangled_pair() -> PeerRegistry {
        let mut registry = PeerRegistry::new();
        for raw in [1, 2, 3] {
            registry.join(id(raw));
        }
        registry.link(id(1), id(2)).unwrap();
        registry.orient_pair(id(1), id(2), true).unwrap();
        registry
    }

    #[test]
    fn test_disconnect_releases_survivor() {
        let mut registry = entangled_pair();
        assert_eq!(disconnect(&mut registry, id(2)), Some(id(1)));
        let survivor = registry.get(id(1)).unwrap();
        assert_eq!(survivor.partner, None);
        assert_eq!(survivor.gravity, GravityEffect::BASELINE);
        assert!(!registry.is_active(id(2)));
    }

    #[test]
    fn test_disconnect_unpaired_is_quiet() {
        let mut registry = entangled_pair();
        assert_eq!(disconnect(&mut registry, id(3)), None);
        assert_eq!(registry.partner_of(id(1)), Some(id(2)));
    }

    #[test]
    fn test_disconnect_clears_dangling_mirror() {
        let mut registry = entangled_pair();
        // Mirror knows 3 as linked to 2 from an older broadcast
        registry.get_mut(id(3)).unwrap().partner = Some(id(2));
        disconnect(&mut registry, id(2));
        assert_eq!(registry.get(id(3)).unwrap().partner, None);
    }

    #[test]
    fn test_server_decohere_clears_both_and_notifies_others() {
        let mut registry = entangled_pair();
        let outbound = decohere(&mut registry, id(1)).unwrap();
        assert_eq!(outbound.route, Route::AllExcept(id(1)));
        assert_eq!(
            outbound.message,
            ServerMessage::Decoherence { participant: id(1) }
        );
        assert!(registry.get(id(1)).unwrap().is_baseline());
        assert_eq!(registry.get(id(2)).unwrap().partner, None);
    }

    #[test]
    fn test_apply_notice_for_local_partner() {
        let mut registry = entangled_pair();
        assert!(apply_notice(&mut registry, id(1), id(2)).unwrap());
        assert!(registry.get(id(1)).unwrap().is_baseline());
    }

    #[test]
    fn test_apply_notice_for_others() {
        let mut registry = entangled_pair();
        assert!(!apply_notice(&mut registry, id(3), id(2)).unwrap());
        assert_eq!(registry.get(id(1)).unwrap().partner, None);
        assert!(apply_notice(&mut registry, id(3), id(9)).is_err());
    }
}
