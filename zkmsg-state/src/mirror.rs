//! Advisory off-chain copy of the map.
//!
//! The mirror is where witnesses come from. It runs the verifier guards
//! locally and applies writes optimistically; the verifier transcript is the
//! only thing it treats as truth when resynchronizing.

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zkmsg_common::{
    key_of, AuthenticatedMap, Identity, MapWitness, Payload, PayloadCodec, SlotKind, SlotValue,
};

use crate::{
    error::MirrorError,
    transition::{TransitionKind, MAX_ELIGIBLE},
    verifier::CommittedTransition,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OffChainMirror {
    admin: Identity,
    eligible_count: u8,
    /// Sequence number of the next transcript entry to replay.
    cursor: u64,
    /// `root_after` of the entry just before `cursor`.
    #[serde(with = "zkmsg_common::serde_fr")]
    synced_root: Fr,
    map: AuthenticatedMap,
}

impl OffChainMirror {
    pub fn new(admin: Identity) -> Self {
        Self {
            admin,
            eligible_count: 0,
            cursor: 0,
            synced_root: AuthenticatedMap::empty_root(),
            map: AuthenticatedMap::new(),
        }
    }

    /// Builds a fresh mirror purely from a verifier transcript.
    pub fn rebuild(
        admin: Identity,
        transcript: &[CommittedTransition],
    ) -> Result<Self, MirrorError> {
        let mut mirror = Self::new(admin);
        mirror.sync_from(transcript)?;
        Ok(mirror)
    }

    pub fn get(&self, identity: &Identity) -> SlotValue {
        SlotValue::from_fr(self.map.get(&key_of(identity)))
    }

    pub fn is_eligible(&self, identity: &Identity) -> bool {
        self.get(identity) == SlotValue::Eligible
    }

    pub fn is_deposited(&self, identity: &Identity) -> bool {
        matches!(self.get(identity), SlotValue::Committed(_))
    }

    pub fn witness(&self, identity: &Identity) -> MapWitness {
        let key = key_of(identity);
        debug!(key = %key, "building witness");
        self.map.witness(&key)
    }

    /// Marks `address` eligible locally and returns the witness of its unset
    /// slot, ready to submit as a registration.
    pub fn set_eligible(
        &mut self,
        address: &Identity,
        caller: &Identity,
    ) -> Result<MapWitness, MirrorError> {
        if *caller != self.admin {
            return Err(MirrorError::NotAdmin);
        }
        if self.eligible_count >= MAX_ELIGIBLE {
            return Err(MirrorError::CapacityReached {
                limit: MAX_ELIGIBLE,
            });
        }
        self.expect_slot(address, SlotKind::Unset)?;

        let witness = self.witness(address);
        self.map.set(&witness.key, SlotValue::Eligible.to_fr());
        self.eligible_count += 1;
        Ok(witness)
    }

    /// Stores `payload` for `sender` locally and returns the witness of its
    /// eligible slot, ready to submit as a deposit.
    pub fn deposit_message(
        &mut self,
        sender: &Identity,
        payload: Payload,
    ) -> Result<MapWitness, MirrorError> {
        PayloadCodec::validate(&payload)?;
        self.expect_slot(sender, SlotKind::Eligible)?;

        let witness = self.witness(sender);
        self.map.set(&witness.key, *payload.as_fr());
        Ok(witness)
    }

    pub fn assert_synced(&self, root: &Fr) -> Result<(), MirrorError> {
        let local = self.map.root();
        if local != *root {
            warn!(?local, authoritative = ?root, "mirror out of sync");
            return Err(MirrorError::Sync {
                local,
                authoritative: *root,
            });
        }
        Ok(())
    }

    /// Replays transcript entries past the cursor, checking the root after
    /// each one. Returns how many entries were applied.
    ///
    /// Entries are staged on a copy of the map; on any error the mirror is
    /// left exactly as it was.
    pub fn sync_from(&mut self, transcript: &[CommittedTransition]) -> Result<usize, MirrorError> {
        let start = self.cursor;
        self.check_continuity(transcript)?;

        let mut map = self.map.clone();
        let mut eligible_count = self.eligible_count;
        let mut synced_root = self.synced_root;
        let mut cursor = start;
        for entry in transcript.iter().filter(|entry| entry.seq >= start) {
            if entry.seq != cursor {
                return Err(MirrorError::TranscriptGap {
                    expected: cursor,
                    found: entry.seq,
                });
            }

            let already_applied = map.get(&entry.key) == entry.value;
            if entry.kind == TransitionKind::Register && !already_applied {
                eligible_count = eligible_count.saturating_add(1);
            }
            map.set(&entry.key, entry.value);
            let local = map.root();
            if local != entry.root_after {
                warn!(seq = entry.seq, ?local, authoritative = ?entry.root_after, "mirror out of sync");
                return Err(MirrorError::Sync {
                    local,
                    authoritative: entry.root_after,
                });
            }

            synced_root = entry.root_after;
            cursor += 1;
        }

        self.map = map;
        self.eligible_count = eligible_count;
        self.synced_root = synced_root;
        self.cursor = cursor;
        let applied = (cursor - start) as usize;
        debug!(applied, cursor, "mirror synced");
        Ok(applied)
    }

    /// Rejects a transcript that does not extend the one already replayed.
    fn check_continuity(&self, transcript: &[CommittedTransition]) -> Result<(), MirrorError> {
        let Some(previous) = self.cursor.checked_sub(1) else {
            return Ok(());
        };
        match transcript.iter().find(|entry| entry.seq == previous) {
            Some(entry) if entry.root_after != self.synced_root => {
                warn!(seq = entry.seq, "transcript diverged from replayed history");
                Err(MirrorError::TranscriptDiverged {
                    seq: entry.seq,
                    local: self.synced_root,
                    authoritative: entry.root_after,
                })
            }
            Some(_) => Ok(()),
            None => match transcript.last() {
                Some(last) if last.seq < previous => Err(MirrorError::TranscriptGap {
                    expected: self.cursor,
                    found: last.seq + 1,
                }),
                _ => Ok(()),
            },
        }
    }

    pub fn root(&self) -> Fr {
        self.map.root()
    }

    pub fn eligible_count(&self) -> u8 {
        self.eligible_count
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn admin(&self) -> &Identity {
        &self.admin
    }

    pub fn map(&self) -> &AuthenticatedMap {
        &self.map
    }

    /// Unguarded access for forcing states the protocol would never produce.
    pub fn map_mut(&mut self) -> &mut AuthenticatedMap {
        &mut self.map
    }

    fn expect_slot(&self, identity: &Identity, expected: SlotKind) -> Result<(), MirrorError> {
        let actual = self.get(identity).kind();
        if actual != expected {
            return Err(MirrorError::UnexpectedSlot { expected, actual });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkmsg_common::Flags;

    fn identity(seed: u8) -> Identity {
        Identity::new([seed; 32], [seed ^ 0xff; 32])
    }

    /// Registers `address` into `authority` and records the committed entry.
    fn registered(seq: u64, authority: &mut AuthenticatedMap, address: &Identity) -> CommittedTransition {
        let key = key_of(address);
        let value = SlotValue::Eligible.to_fr();
        authority.set(&key, value);
        CommittedTransition {
            seq,
            kind: TransitionKind::Register,
            key,
            value,
            root_after: authority.root(),
        }
    }

    #[test]
    fn set_eligible_requires_admin_and_unset_slot() {
        let admin = identity(1);
        let mut mirror = OffChainMirror::new(admin);
        assert_eq!(
            mirror.set_eligible(&identity(2), &identity(3)),
            Err(MirrorError::NotAdmin)
        );

        let witness = mirror.set_eligible(&identity(2), &admin).unwrap();
        assert!(witness.verify_against(&AuthenticatedMap::empty_root(), Fr::zero()));
        assert!(mirror.is_eligible(&identity(2)));
        assert_eq!(
            mirror.set_eligible(&identity(2), &admin),
            Err(MirrorError::UnexpectedSlot {
                expected: SlotKind::Unset,
                actual: SlotKind::Eligible
            })
        );
    }

    #[test]
    fn deposit_requires_eligibility_and_valid_payload() {
        let admin = identity(1);
        let user = identity(2);
        let mut mirror = OffChainMirror::new(admin);
        let payload =
            PayloadCodec::construct(Fr::from(9u64), Flags::from_bits(0b000100).unwrap()).unwrap();

        assert!(matches!(
            mirror.deposit_message(&user, payload),
            Err(MirrorError::UnexpectedSlot { .. })
        ));

        mirror.set_eligible(&user, &admin).unwrap();
        assert!(matches!(
            mirror.deposit_message(&user, Payload::from_fr(Fr::from(0b000100u64))),
            Err(MirrorError::Payload(_))
        ));
        mirror.deposit_message(&user, payload).unwrap();
        assert!(mirror.is_deposited(&user));
        assert!(!mirror.is_eligible(&user));
    }

    #[test]
    fn capacity_is_enforced_locally() {
        let admin = identity(1);
        let mut mirror = OffChainMirror::new(admin);
        mirror.eligible_count = MAX_ELIGIBLE;
        assert_eq!(
            mirror.set_eligible(&identity(2), &admin),
            Err(MirrorError::CapacityReached { limit: 100 })
        );
    }

    #[test]
    fn assert_synced_reports_both_roots() {
        let mirror = OffChainMirror::new(identity(1));
        assert!(mirror.assert_synced(&AuthenticatedMap::empty_root()).is_ok());
        let err = mirror.assert_synced(&Fr::one()).unwrap_err();
        assert_eq!(
            err,
            MirrorError::Sync {
                local: AuthenticatedMap::empty_root(),
                authoritative: Fr::one()
            }
        );
    }

    #[test]
    fn json_snapshot_round_trip() {
        let admin = identity(1);
        let mut mirror = OffChainMirror::new(admin);
        mirror.set_eligible(&identity(2), &admin).unwrap();
        let json = serde_json::to_string(&mirror).unwrap();
        let restored: OffChainMirror = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.root(), mirror.root());
        assert_eq!(restored.eligible_count(), 1);
        assert!(restored.is_eligible(&identity(2)));
    }

    #[test]
    fn rejected_sync_leaves_mirror_untouched() {
        let admin = identity(1);
        let mut mirror = OffChainMirror::new(admin);
        mirror.set_eligible(&identity(2), &admin).unwrap();
        let root = mirror.root();

        let mut authority = AuthenticatedMap::new();
        let transcript = vec![registered(0, &mut authority, &identity(3))];

        for _ in 0..2 {
            let err = mirror.sync_from(&transcript).unwrap_err();
            assert!(matches!(err, MirrorError::Sync { .. }));
            assert_eq!(mirror.eligible_count(), 1);
            assert_eq!(mirror.root(), root);
            assert_eq!(mirror.cursor(), 0);
            assert!(!mirror.is_eligible(&identity(3)));
        }

        let rebuilt = OffChainMirror::rebuild(admin, &transcript).unwrap();
        assert_eq!(rebuilt.root(), authority.root());
        assert_eq!(rebuilt.eligible_count(), 1);
    }

    #[test]
    fn restarted_transcript_is_reported() {
        let admin = identity(1);
        let mut authority = AuthenticatedMap::new();
        let first = registered(0, &mut authority, &identity(2));
        let replayed = first.root_after;

        let mut mirror = OffChainMirror::new(admin);
        assert_eq!(mirror.sync_from(&[first]), Ok(1));

        // Numbering starts over while the map keeps the first registration.
        let restarted = vec![registered(0, &mut authority, &identity(3))];
        let err = mirror.sync_from(&restarted).unwrap_err();
        assert_eq!(
            err,
            MirrorError::TranscriptDiverged {
                seq: 0,
                local: replayed,
                authoritative: authority.root(),
            }
        );
        assert_eq!(mirror.root(), replayed);
        assert_eq!(mirror.cursor(), 1);
    }

    #[test]
    fn shorter_transcript_is_a_gap() {
        let admin = identity(1);
        let mut authority = AuthenticatedMap::new();
        let transcript = vec![
            registered(0, &mut authority, &identity(2)),
            registered(1, &mut authority, &identity(3)),
        ];
        let mut mirror = OffChainMirror::new(admin);
        assert_eq!(mirror.sync_from(&transcript), Ok(2));

        assert_eq!(
            mirror.sync_from(&transcript[..1]),
            Err(MirrorError::TranscriptGap {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(mirror.sync_from(&transcript), Ok(0));
    }
}
