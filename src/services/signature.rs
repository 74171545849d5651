//! Change detection for player sub-resources.
//!
//! A [`Signature`] is the serialized canonical form of a sub-resource. Two values that only differ
//! by entry order, zero quantities, or alias spelling yield the same signature.

use std::fmt;

use serde::Serialize;

use crate::{
    dao::models::SubResourceTable,
    services::normalize::{
        canonical_ammo, canonical_items, canonical_pet, canonical_quests, canonical_resources,
        canonical_ship_skins,
    },
    state::player::PlayerRecord,
};

/// Deterministic fingerprint of a canonical sub-resource value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    /// Fingerprint a value that is already in canonical form.
    pub fn of<T: Serialize + fmt::Debug>(canonical: &T) -> Self {
        Signature(serde_json::to_string(canonical).unwrap_or_else(|_| format!("{canonical:?}")))
    }
}

/// Signature of the sub-resource of `record` persisted in `table`.
pub fn sub_resource_signature(table: SubResourceTable, record: &PlayerRecord) -> Signature {
    match table {
        SubResourceTable::Ammo => Signature::of(&canonical_ammo(&record.ammo)),
        SubResourceTable::WorldResources => Signature::of(&canonical_resources(&record.resources)),
        SubResourceTable::Pets => Signature::of(&canonical_pet(&record.pet)),
        SubResourceTable::ShipSkins => Signature::of(&canonical_ship_skins(&record.ship_skins)),
        SubResourceTable::QuestObjectives => Signature::of(&canonical_quests(&record.quests)),
        SubResourceTable::InventoryItems => Signature::of(&canonical_items(&record.items)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::{
        services::normalize::{normalize_ammo, normalize_resources},
        state::player::{AmmoTier, InventoryItem, PetItem},
    };

    fn record() -> PlayerRecord {
        PlayerRecord::new("0d3c3f1e-6f5a-4a8e-9b53-2f1d5c7a9e10", 1)
    }

    #[test]
    fn zero_entries_do_not_change_the_signature() {
        let mut with_zero = record();
        with_zero.resources.0 = BTreeMap::from([("ore".into(), 3), ("gas".into(), 0)]);
        let mut without_zero = record();
        without_zero.resources.0 = BTreeMap::from([("ore".into(), 3)]);

        assert_eq!(
            sub_resource_signature(SubResourceTable::WorldResources, &with_zero),
            sub_resource_signature(SubResourceTable::WorldResources, &without_zero),
        );
    }

    #[test]
    fn quantity_changes_change_the_signature() {
        let before = record();
        let mut after = record();
        after.ammo.tiers.insert(AmmoTier::X2, 5);

        assert_ne!(
            sub_resource_signature(SubResourceTable::Ammo, &before),
            sub_resource_signature(SubResourceTable::Ammo, &after),
        );

        let mut reselected = record();
        reselected.ammo.selected_tier = AmmoTier::M1;
        assert_ne!(
            sub_resource_signature(SubResourceTable::Ammo, &before),
            sub_resource_signature(SubResourceTable::Ammo, &reselected),
        );
    }

    #[test]
    fn collection_order_is_irrelevant() {
        let item = |instance: &str| InventoryItem {
            item_id: "laser_lf3".into(),
            instance_id: instance.into(),
            acquired_at: 10,
            slot: None,
        };
        let mut forward = record();
        forward.items = vec![item("a"), item("b")];
        let mut backward = record();
        backward.items = vec![item("b"), item("a")];
        assert_eq!(
            sub_resource_signature(SubResourceTable::InventoryItems, &forward),
            sub_resource_signature(SubResourceTable::InventoryItems, &backward),
        );

        let cargo = |id: &str| PetItem {
            item_id: id.into(),
            item_name: id.into(),
            quantity: 1,
            rarity: "common".into(),
        };
        forward.pet.inventory = vec![cargo("x"), cargo("y")];
        backward.pet.inventory = vec![cargo("y"), cargo("x")];
        assert_eq!(
            sub_resource_signature(SubResourceTable::Pets, &forward),
            sub_resource_signature(SubResourceTable::Pets, &backward),
        );
    }

    #[test]
    fn negative_quantities_sign_like_their_clamped_value() {
        let mut negative = record();
        negative.pet.experience = -20;
        let clamped = record();

        assert_eq!(
            sub_resource_signature(SubResourceTable::Pets, &negative),
            sub_resource_signature(SubResourceTable::Pets, &clamped),
        );
    }

    #[test]
    fn alias_spellings_sign_identically() {
        let mut camel = record();
        camel.ammo = normalize_ammo(&json!({ "selectedTier": "x3", "tiers": { "x3": 4 } }));
        camel.resources = normalize_resources(&json!({ "ore": 2 }));
        let mut rows = record();
        rows.ammo = normalize_ammo(&json!([{ "ammo_type": "X3", "amount": "4", "selected": 1 }]));
        rows.resources = normalize_resources(&json!([{ "resourceType": "ore", "quantity": 2.2 }]));

        for table in [SubResourceTable::Ammo, SubResourceTable::WorldResources] {
            assert_eq!(
                sub_resource_signature(table, &camel),
                sub_resource_signature(table, &rows),
            );
        }
    }
}
