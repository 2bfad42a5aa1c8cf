//! `EntityReconciler` – authoritative table of remote entities.
//!
//! A pure reducer: each call folds one event into the table and returns the
//! notifications the presentation layer should see.  It is only ever driven
//! from the consumer tick (see [`crate::queue`]), so it needs no locking.
//!
//! | Event           | Known id                 | Unknown id              |
//! |-----------------|--------------------------|-------------------------|
//! | `zone_state`    | set position → `Moved`   | insert → `Spawned`      |
//! | `player_joined` | no-op                    | insert → `Spawned`      |
//! | `player_moved`  | add delta → `Moved`      | dropped                 |
//! | `player_left`   | remove → `Removed`       | no-op                   |
//!
//! Snapshots are additive: ids missing from a `zone_state` are kept.  An id
//! absent from the table means "not known to this client", nothing more.

use std::collections::HashMap;

use crate::events::ChannelEvent;
use crate::protocol::{Envelope, PlayerJoined, PlayerLeft, PlayerMoved, ZoneState};
use crate::types::Vec3;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    pub id: String,
    pub position: Vec3,
}

/// Change notifications handed to presentation collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityNotification {
    Spawned { id: String, position: Vec3 },
    Moved { id: String, position: Vec3 },
    Removed { id: String },
}

impl EntityNotification {
    pub fn id(&self) -> &str {
        match self {
            EntityNotification::Spawned { id, .. }
            | EntityNotification::Moved { id, .. }
            | EntityNotification::Removed { id } => id,
        }
    }
}

#[derive(Debug, Default)]
pub struct EntityReconciler {
    entities: HashMap<String, RemoteEntity>,
}

impl EntityReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Event entry points
    // ------------------------------------------------------------------

    /// Decode and fold a raw envelope.  Malformed payloads are logged and
    /// leave the table untouched.
    pub fn apply_envelope(&mut self, envelope: &Envelope) -> Vec<EntityNotification> {
        match ChannelEvent::decode(envelope) {
            Ok(ev) => self.apply(&ev),
            Err(e) => {
                log::warn!("[reconciler] Dropping {}: {}", envelope.event, e);
                Vec::new()
            }
        }
    }

    /// Fold one typed event.  Non-entity events are ignored.
    pub fn apply(&mut self, event: &ChannelEvent) -> Vec<EntityNotification> {
        match event {
            ChannelEvent::Snapshot(s) => self.apply_snapshot(s),
            ChannelEvent::PlayerJoined(j) => self.player_joined(j).into_iter().collect(),
            ChannelEvent::PlayerMoved(m) => self.player_moved(m).into_iter().collect(),
            ChannelEvent::PlayerLeft(l) => self.player_left(l).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &ZoneState) -> Vec<EntityNotification> {
        let mut out = Vec::with_capacity(snapshot.players.len());
        for p in &snapshot.players {
            if p.id.is_empty() {
                log::debug!("[reconciler] Skipping snapshot entry without id");
                continue;
            }
            match self.entities.get_mut(&p.id) {
                Some(e) => {
                    e.position = p.position;
                    out.push(EntityNotification::Moved {
                        id: p.id.clone(),
                        position: p.position,
                    });
                }
                None => out.push(self.insert(&p.id, p.position)),
            }
        }
        out
    }

    pub fn player_joined(&mut self, joined: &PlayerJoined) -> Option<EntityNotification> {
        if joined.id.is_empty() || self.entities.contains_key(&joined.id) {
            return None;
        }
        Some(self.insert(&joined.id, joined.position))
    }

    pub fn player_moved(&mut self, moved: &PlayerMoved) -> Option<EntityNotification> {
        let Some(e) = self.entities.get_mut(&moved.id) else {
            log::debug!("[reconciler] Move for unknown id {:?} dropped", moved.id);
            return None;
        };
        e.position += moved.delta;
        Some(EntityNotification::Moved {
            id: e.id.clone(),
            position: e.position,
        })
    }

    pub fn player_left(&mut self, left: &PlayerLeft) -> Option<EntityNotification> {
        self.entities
            .remove(&left.id)
            .map(|e| EntityNotification::Removed { id: e.id })
    }

    fn insert(&mut self, id: &str, position: Vec3) -> EntityNotification {
        self.entities.insert(
            id.to_string(),
            RemoteEntity {
                id: id.to_string(),
                position,
            },
        );
        EntityNotification::Spawned {
            id: id.to_string(),
            position,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get(&self, id: &str) -> Option<&RemoteEntity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Known ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.entities.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of the table as `id → position`.
    pub fn positions(&self) -> HashMap<String, Vec3> {
        self.entities
            .values()
            .map(|e| (e.id.clone(), e.position))
            .collect()
    }

    /// Drop everything (called on close).  Returns a `Removed` per entity.
    pub fn clear(&mut self) -> Vec<EntityNotification> {
        let mut removed: Vec<_> = self
            .entities
            .drain()
            .map(|(id, _)| EntityNotification::Removed { id })
            .collect();
        removed.sort_by(|a, b| a.id().cmp(b.id()));
        removed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn joined(id: &str, x: f32, y: f32, z: f32) -> PlayerJoined {
        PlayerJoined {
            id: id.into(),
            position: Vec3::new(x, y, z),
        }
    }

    fn moved(id: &str, dx: f32, dy: f32, dz: f32) -> PlayerMoved {
        PlayerMoved {
            id: id.into(),
            delta: Vec3::new(dx, dy, dz),
        }
    }

    // ---------------------------------------------------------------
    // Join / leave
    // ---------------------------------------------------------------

    #[test]
    fn join_spawns_once() {
        let mut r = EntityReconciler::new();
        let first = r.player_joined(&joined("p1", 1.0, 2.0, 3.0));
        assert_eq!(
            first,
            Some(EntityNotification::Spawned {
                id: "p1".into(),
                position: Vec3::new(1.0, 2.0, 3.0)
            })
        );

        // Duplicate join keeps the original position and emits nothing.
        assert_eq!(r.player_joined(&joined("p1", 9.0, 9.0, 9.0)), None);
        assert_eq!(r.len(), 1);
        assert_eq!(r.get("p1").unwrap().position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn leave_of_absent_id_is_noop() {
        let mut r = EntityReconciler::new();
        r.player_joined(&joined("p1", 0.0, 0.0, 0.0));
        assert_eq!(r.player_left(&PlayerLeft { id: "ghost".into() }), None);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn empty_id_is_ignored() {
        let mut r = EntityReconciler::new();
        assert_eq!(r.player_joined(&joined("", 0.0, 0.0, 0.0)), None);
        assert!(r.is_empty());
    }

    // ---------------------------------------------------------------
    // Movement
    // ---------------------------------------------------------------

    #[test]
    fn move_adds_delta() {
        let mut r = EntityReconciler::new();
        r.player_joined(&joined("p1", 1.0, 1.0, 1.0));
        r.player_moved(&moved("p1", 0.5, 0.0, -1.0));
        let n = r.player_moved(&moved("p1", 0.5, 0.0, 0.0));
        assert_eq!(
            n,
            Some(EntityNotification::Moved {
                id: "p1".into(),
                position: Vec3::new(2.0, 1.0, 0.0)
            })
        );
    }

    #[test]
    fn move_for_unknown_id_is_dropped() {
        let mut r = EntityReconciler::new();
        assert_eq!(r.player_moved(&moved("ghost", 1.0, 0.0, 0.0)), None);
        assert!(r.is_empty());
    }

    // ---------------------------------------------------------------
    // Snapshot
    // ---------------------------------------------------------------

    #[test]
    fn snapshot_upserts_and_is_additive() {
        let mut r = EntityReconciler::new();
        r.player_joined(&joined("old", 5.0, 5.0, 5.0));
        r.player_joined(&joined("p1", 0.0, 0.0, 0.0));

        let out = r.apply_snapshot(&ZoneState {
            players: vec![joined("p1", 3.0, 0.0, 0.0), joined("p2", 1.0, 1.0, 1.0)],
        });

        assert_eq!(
            out,
            vec![
                EntityNotification::Moved {
                    id: "p1".into(),
                    position: Vec3::new(3.0, 0.0, 0.0)
                },
                EntityNotification::Spawned {
                    id: "p2".into(),
                    position: Vec3::new(1.0, 1.0, 1.0)
                },
            ]
        );
        // "old" was not in the snapshot but stays.
        assert_eq!(r.ids(), vec!["old", "p1", "p2"]);
    }

    // ---------------------------------------------------------------
    // Envelope decoding
    // ---------------------------------------------------------------

    #[test]
    fn malformed_envelope_leaves_table_untouched() {
        let mut r = EntityReconciler::new();
        r.player_joined(&joined("p1", 0.0, 0.0, 0.0));

        let bad = Envelope::new("zone:1", "player_moved", json!({"id": "p1"}), None);
        assert!(r.apply_envelope(&bad).is_empty());
        assert_eq!(r.get("p1").unwrap().position, Vec3::zero());
    }

    #[test]
    fn envelope_fold_matches_direct_calls() {
        let mut r = EntityReconciler::new();
        let out = r.apply_envelope(&Envelope::new(
            "zone:1",
            "player_joined",
            json!({"id": "p1", "position": {"x": 1.0, "y": 0.0, "z": 0.0}}),
            None,
        ));
        assert_eq!(out.len(), 1);
        assert!(r.contains("p1"));
    }

    #[test]
    fn clear_reports_every_removal() {
        let mut r = EntityReconciler::new();
        r.player_joined(&joined("b", 0.0, 0.0, 0.0));
        r.player_joined(&joined("a", 0.0, 0.0, 0.0));
        let out = r.clear();
        assert_eq!(
            out,
            vec![
                EntityNotification::Removed { id: "a".into() },
                EntityNotification::Removed { id: "b".into() },
            ]
        );
        assert!(r.is_empty());
    }
}
