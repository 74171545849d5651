//! Normalization of player sub-resources.
//!
//! Stored rows and client documents come in several generations of field naming
//! (`selected_tier`, `selectedTier`, `selected`, ...) and numeric encodings (floats, strings).
//! Each sub-resource has exactly one `normalize_*` function turning such a loose
//! [`Value`] into its strict struct, and one `canonical_*` function bringing a strict value
//! into canonical form: quantities clamped to non-negative integers, empty entries dropped,
//! collections sorted by their id. Every `normalize_*` ends in the matching `canonical_*`.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::state::player::{
    AmmoInventory, AmmoTier, CurrencyLedger, DEFAULT_ITEM_RARITY, DEFAULT_PET_NAME,
    DEFAULT_SKIN_ID, InventoryItem, PetItem, PetState, PlayerRecord, QuestObjective,
    QuestProgressEntry, ResourceInventory, STARTING_COSMOS, STARTING_CREDITS, ShipSkinState,
    Stats, Upgrades,
};

const LEDGER: &[&str] = &["inventory", "currencies", "currency"];
const QUANTITY: &[&str] = &["quantity", "amount", "count", "qty"];

/// First non-null value stored under one of `aliases`.
fn field<'a>(value: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|alias| value.get(*alias).filter(|found| !found.is_null()))
}

/// Integer reading of a number or numeric string, floored; `None` for anything else.
fn integer(value: &Value) -> Option<i64> {
    let floored = |f: f64| f.is_finite().then(|| f.floor() as i64);
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| number.as_f64().and_then(floored)),
        Value::String(text) => text.trim().parse::<f64>().ok().and_then(floored),
        _ => None,
    }
}

fn quantity(value: &Value) -> Option<i64> {
    integer(value).map(|q| q.max(0))
}

fn quantity_field(value: &Value, aliases: &[&str]) -> Option<i64> {
    field(value, aliases).and_then(quantity)
}

fn text_field(value: &Value, aliases: &[&str]) -> Option<String> {
    match field(value, aliases)? {
        Value::String(text) => Some(text.trim().to_owned()).filter(|t| !t.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn flag_field(value: &Value, aliases: &[&str]) -> Option<bool> {
    match field(value, aliases)? {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => Some(number.as_f64().is_some_and(|n| n != 0.0)),
        Value::String(text) => Some(matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        )),
        _ => None,
    }
}

/// Unix milliseconds from a number or an RFC 3339 string.
fn timestamp_field(value: &Value, aliases: &[&str]) -> Option<i64> {
    match field(value, aliases)? {
        Value::String(text) => match OffsetDateTime::parse(text.trim(), &Rfc3339) {
            Ok(parsed) => Some((parsed.unix_timestamp_nanos() / 1_000_000) as i64),
            Err(_) => integer(&Value::String(text.clone())),
        },
        other => integer(other),
    }
    .map(|millis| millis.max(0))
}

/// Rows of a table arrive as an array; legacy documents keep a single object.
fn entries(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(rows) => rows.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Aggregate profile document into a record whose optional sub-resources hold their defaults.
pub fn normalize_profile(auth_id: &str, document: &Value) -> PlayerRecord {
    let mut record = PlayerRecord::new(
        text_field(document, &["auth_id", "authId", "_id"]).unwrap_or_else(|| auth_id.to_owned()),
        field(document, &["player_id", "playerId", "id"])
            .and_then(integer)
            .unwrap_or(0),
    );
    record.nickname = text_field(document, &["nickname", "nick_name", "name"]).unwrap_or_default();
    record.is_administrator =
        flag_field(document, &["is_administrator", "isAdministrator", "is_admin", "isAdmin"])
            .unwrap_or(false);
    let ledger = field(document, LEDGER).cloned().unwrap_or(Value::Null);
    record.inventory = Some(normalize_ledger(&ledger));
    record.stats = normalize_stats(field(document, &["stats", "statistics"]).unwrap_or(document));
    record.upgrades = normalize_upgrades(field(document, &["upgrades"]).unwrap_or(&Value::Null));
    record.quests = normalize_quests(field(document, &["quests", "quest_progress"]).unwrap_or(&Value::Null));
    record.items = normalize_items(field(document, &["items", "inventory_items"]).unwrap_or(&Value::Null));
    record
}

/// Full player document as sent by gameplay callers. A missing or null ledger stays `None`.
pub fn normalize_player_state(document: &Value) -> PlayerRecord {
    let auth_id = text_field(document, &["auth_id", "authId"]).unwrap_or_default();
    let mut record = normalize_profile(&auth_id, document);
    record.inventory = field(document, LEDGER).map(normalize_ledger);
    record.ammo = normalize_ammo(field(document, &["ammo", "ammunition", "ammo_inventory"]).unwrap_or(&Value::Null));
    record.resources = normalize_resources(
        field(document, &["resources", "resourceInventory", "resource_inventory"]).unwrap_or(&Value::Null),
    );
    record.pet = normalize_pet(field(document, &["pet", "petState", "pet_state"]).unwrap_or(&Value::Null));
    record.ship_skins = normalize_ship_skins(
        field(document, &["shipSkins", "ship_skins", "skins"]).unwrap_or(&Value::Null),
    );
    record
}

/// Unset values keep their starting default; explicit zeros are preserved.
pub fn normalize_ledger(value: &Value) -> CurrencyLedger {
    canonical_ledger(&CurrencyLedger {
        credits: quantity_field(value, &["credits"]).unwrap_or(STARTING_CREDITS),
        cosmos: quantity_field(value, &["cosmos", "uridium"]).unwrap_or(STARTING_COSMOS),
        experience: quantity_field(value, &["experience", "exp", "xp"]).unwrap_or(0),
        honor: quantity_field(value, &["honor", "honour"]).unwrap_or(0),
        current_health: quantity_field(value, &["current_health", "currentHealth", "hp"]),
        current_shield: quantity_field(value, &["current_shield", "currentShield", "shield"]),
    })
}

/// Clamps negative balances to zero.
pub fn canonical_ledger(ledger: &CurrencyLedger) -> CurrencyLedger {
    CurrencyLedger {
        credits: ledger.credits.max(0),
        cosmos: ledger.cosmos.max(0),
        experience: ledger.experience.max(0),
        honor: ledger.honor.max(0),
        current_health: ledger.current_health.map(|hp| hp.max(0)),
        current_shield: ledger.current_shield.map(|shield| shield.max(0)),
    }
}

/// Missing counters read as zero.
pub fn normalize_stats(value: &Value) -> Stats {
    Stats {
        kills: quantity_field(value, &["kills"]).unwrap_or(0),
        deaths: quantity_field(value, &["deaths"]).unwrap_or(0),
        ranking_points: quantity_field(value, &["ranking_points", "rankingPoints", "rank_points"])
            .unwrap_or(0),
    }
}

/// Missing levels read as zero.
pub fn normalize_upgrades(value: &Value) -> Upgrades {
    Upgrades {
        hp: quantity_field(value, &["hp", "health"]).unwrap_or(0),
        shield: quantity_field(value, &["shield"]).unwrap_or(0),
        speed: quantity_field(value, &["speed"]).unwrap_or(0),
        damage: quantity_field(value, &["damage"]).unwrap_or(0),
        missile_damage: quantity_field(value, &["missile_damage", "missileDamage"]).unwrap_or(0),
    }
}

/// Accepts tier rows (`[{tier, quantity, selected}]`) or a single inventory object with
/// `tiers`, a legacy `missiles` block, or tier keys at the top level.
pub fn normalize_ammo(value: &Value) -> AmmoInventory {
    let mut tiers = BTreeMap::new();
    let mut selected = None;

    match value {
        Value::Array(rows) => {
            for row in rows {
                let Some(tier) = text_field(row, &["tier", "ammo_type", "ammoType", "type"])
                    .and_then(|tier| AmmoTier::parse(&tier))
                else {
                    continue;
                };
                tiers.insert(tier, quantity_field(row, QUANTITY).unwrap_or(0));
                if flag_field(row, &["selected", "is_selected", "isSelected"]).unwrap_or(false) {
                    selected = Some(tier);
                }
            }
        }
        Value::Object(_) => {
            selected = text_field(value, &["selected_tier", "selectedTier", "selected", "current"])
                .and_then(|tier| AmmoTier::parse(&tier));
            let blocks = [
                field(value, &["tiers", "ammo", "lasers"]),
                field(value, &["missiles", "missile"]),
                Some(value),
            ];
            for block in blocks.into_iter().flatten() {
                for tier in AmmoTier::ALL {
                    if tiers.contains_key(&tier) {
                        continue;
                    }
                    if let Some(amount) = block.get(tier.as_str()).and_then(quantity) {
                        tiers.insert(tier, amount);
                    }
                }
            }
        }
        _ => return AmmoInventory::default(),
    }

    canonical_ammo(&AmmoInventory {
        selected_tier: selected.unwrap_or_default(),
        tiers,
    })
}

/// Drops empty tiers.
pub fn canonical_ammo(ammo: &AmmoInventory) -> AmmoInventory {
    AmmoInventory {
        selected_tier: ammo.selected_tier,
        tiers: ammo
            .tiers
            .iter()
            .filter(|(_, quantity)| **quantity > 0)
            .map(|(tier, quantity)| (*tier, *quantity))
            .collect(),
    }
}

/// Accepts rows (`[{resource_type, quantity}]`) or a plain `{type: quantity}` map.
pub fn normalize_resources(value: &Value) -> ResourceInventory {
    let mut inventory = BTreeMap::<String, i64>::new();
    let mut add = |resource: String, amount: i64| {
        let entry = inventory.entry(resource).or_insert(0);
        *entry = entry.saturating_add(amount);
    };

    match value {
        Value::Array(rows) => {
            for row in rows {
                let resource =
                    text_field(row, &["resource_type", "resourceType", "resource", "type"]);
                if let (Some(resource), Some(amount)) = (resource, quantity_field(row, QUANTITY)) {
                    add(resource, amount);
                }
            }
        }
        Value::Object(map) => {
            for (resource, amount) in map {
                let resource = resource.trim();
                if let (false, Some(amount)) = (resource.is_empty(), quantity(amount)) {
                    add(resource.to_owned(), amount);
                }
            }
        }
        _ => {}
    }

    canonical_resources(&ResourceInventory(inventory))
}

/// Trims resource names and drops blank names and empty stacks.
pub fn canonical_resources(resources: &ResourceInventory) -> ResourceInventory {
    ResourceInventory(
        resources
            .0
            .iter()
            .filter(|(resource, quantity)| !resource.trim().is_empty() && **quantity > 0)
            .map(|(resource, quantity)| (resource.trim().to_owned(), *quantity))
            .collect(),
    )
}

/// Accepts the single pet row, a one-row array, or the legacy pet object.
pub fn normalize_pet(value: &Value) -> PetState {
    let Some(row) = entries(value).into_iter().next() else {
        return PetState::default();
    };
    let defaults = PetState::default();

    let inventory = field(row, &["inventory", "items", "cargo"])
        .map(entries)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| {
            Some(PetItem {
                item_id: text_field(item, &["item_id", "itemId", "id"])?,
                item_name: text_field(item, &["item_name", "itemName", "name"]).unwrap_or_default(),
                quantity: quantity_field(item, QUANTITY).unwrap_or(0),
                rarity: text_field(item, &["rarity"]).unwrap_or_default(),
            })
        })
        .collect();

    canonical_pet(&PetState {
        pet_id: field(row, &["pet_id", "petId", "id"])
            .and_then(integer)
            .unwrap_or(defaults.pet_id),
        nickname: text_field(row, &["nickname", "name"]).unwrap_or(defaults.nickname),
        level: quantity_field(row, &["level", "lvl"]).unwrap_or(defaults.level),
        experience: quantity_field(row, &["experience", "exp", "xp"]).unwrap_or(0),
        current_health: quantity_field(row, &["current_health", "currentHealth", "hp"])
            .unwrap_or(defaults.current_health),
        max_health: quantity_field(row, &["max_health", "maxHealth", "max_hp"])
            .unwrap_or(defaults.max_health),
        current_shield: quantity_field(row, &["current_shield", "currentShield", "shield"])
            .unwrap_or(defaults.current_shield),
        max_shield: quantity_field(row, &["max_shield", "maxShield"]).unwrap_or(defaults.max_shield),
        is_active: flag_field(row, &["is_active", "isActive", "active"]).unwrap_or(false),
        module_slot: text_field(row, &["module_slot", "moduleSlot", "module"]),
        inventory,
        inventory_capacity: quantity_field(row, &["inventory_capacity", "inventoryCapacity", "capacity"])
            .unwrap_or(defaults.inventory_capacity),
    })
}

/// Blank nicknames and rarities fall back to the starter values; item ids and names are trimmed.
pub fn canonical_pet(pet: &PetState) -> PetState {
    let mut inventory = pet
        .inventory
        .iter()
        .filter(|item| !item.item_id.trim().is_empty() && item.quantity > 0)
        .map(|item| PetItem {
            item_id: item.item_id.trim().to_owned(),
            item_name: item.item_name.trim().to_owned(),
            quantity: item.quantity,
            rarity: match item.rarity.trim() {
                "" => DEFAULT_ITEM_RARITY.to_owned(),
                rarity => rarity.to_owned(),
            },
        })
        .collect::<Vec<_>>();
    inventory.sort_by(|a, b| {
        (&a.item_id, &a.rarity, &a.item_name).cmp(&(&b.item_id, &b.rarity, &b.item_name))
    });

    PetState {
        pet_id: pet.pet_id,
        nickname: match pet.nickname.trim() {
            "" => DEFAULT_PET_NAME.to_owned(),
            nickname => nickname.to_owned(),
        },
        level: pet.level.max(1),
        experience: pet.experience.max(0),
        current_health: pet.current_health.max(0),
        max_health: pet.max_health.max(0),
        current_shield: pet.current_shield.max(0),
        max_shield: pet.max_shield.max(0),
        is_active: pet.is_active,
        module_slot: pet
            .module_slot
            .as_deref()
            .map(str::trim)
            .filter(|slot| !slot.is_empty())
            .map(str::to_owned),
        inventory,
        inventory_capacity: pet.inventory_capacity.max(0),
    }
}

/// Accepts skin rows (`[{skin_id, selected}]`) or an object with the selection and a list.
pub fn normalize_ship_skins(value: &Value) -> ShipSkinState {
    let mut unlocked = BTreeSet::new();
    let mut selected = None;

    match value {
        Value::Array(rows) => {
            for row in rows {
                let Some(skin) = text_field(row, &["skin_id", "skinId", "id"]) else {
                    continue;
                };
                if flag_field(row, &["selected", "is_selected", "isSelected"]).unwrap_or(false) {
                    selected = Some(skin.clone());
                }
                unlocked.insert(skin);
            }
        }
        Value::Object(_) => {
            selected = text_field(value, &["selected_skin_id", "selectedSkinId", "selected"]);
            let listed = field(value, &["unlocked_skin_ids", "unlockedSkinIds", "unlocked"])
                .map(entries)
                .unwrap_or_default();
            for skin in listed {
                if let Some(skin) = skin.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                    unlocked.insert(skin.to_owned());
                }
            }
        }
        _ => {}
    }

    canonical_ship_skins(&ShipSkinState {
        selected_skin_id: selected.unwrap_or_else(|| DEFAULT_SKIN_ID.to_owned()),
        unlocked_skin_ids: unlocked,
    })
}

/// The selected and the default skin are always unlocked.
pub fn canonical_ship_skins(skins: &ShipSkinState) -> ShipSkinState {
    let selected = match skins.selected_skin_id.trim() {
        "" => DEFAULT_SKIN_ID.to_owned(),
        id => id.to_owned(),
    };
    let mut unlocked = skins
        .unlocked_skin_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect::<BTreeSet<_>>();
    unlocked.insert(selected.clone());
    unlocked.insert(DEFAULT_SKIN_ID.to_owned());

    ShipSkinState {
        selected_skin_id: selected,
        unlocked_skin_ids: unlocked,
    }
}

/// Accepts a quest list, quest rows, or a `{quest_id: progress}` map.
pub fn normalize_quests(value: &Value) -> Vec<QuestProgressEntry> {
    let parse = |quest: &Value, fallback_id: Option<&str>| -> Option<QuestProgressEntry> {
        let quest_id = text_field(quest, &["quest_id", "questId", "id"])
            .or_else(|| fallback_id.map(str::to_owned))?;
        let objectives = field(quest, &["objectives", "goals"])
            .map(entries)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|objective| {
                Some(QuestObjective {
                    id: text_field(objective, &["id", "objective_id", "objectiveId"])?,
                    current: quantity_field(objective, &["current", "progress"]).unwrap_or(0),
                    target: quantity_field(objective, &["target", "required", "goal"]).unwrap_or(0),
                    kind: text_field(objective, &["type", "kind"]).unwrap_or_default(),
                })
            })
            .collect();
        Some(QuestProgressEntry {
            quest_id,
            objectives,
            is_completed: flag_field(quest, &["is_completed", "isCompleted", "completed"])
                .unwrap_or(false),
        })
    };

    let quests = match value {
        Value::Array(list) => list.iter().filter_map(|quest| parse(quest, None)).collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(id, quest)| parse(quest, Some(id)))
            .collect(),
        _ => Vec::new(),
    };
    canonical_quests(&quests)
}

/// Sorted by quest id; a repeated quest id keeps its last entry.
pub fn canonical_quests(quests: &[QuestProgressEntry]) -> Vec<QuestProgressEntry> {
    let mut by_id = BTreeMap::new();
    for quest in quests {
        let quest_id = quest.quest_id.trim();
        if quest_id.is_empty() {
            continue;
        }
        let mut objectives = quest
            .objectives
            .iter()
            .filter(|objective| !objective.id.trim().is_empty())
            .map(|objective| QuestObjective {
                id: objective.id.trim().to_owned(),
                current: objective.current.max(0),
                target: objective.target.max(0),
                kind: objective.kind.trim().to_owned(),
            })
            .collect::<Vec<_>>();
        objectives.sort_by(|a, b| a.id.cmp(&b.id));
        objectives.dedup_by(|a, b| a.id == b.id);

        by_id.insert(
            quest_id.to_owned(),
            QuestProgressEntry {
                quest_id: quest_id.to_owned(),
                objectives,
                is_completed: quest.is_completed,
            },
        );
    }
    by_id.into_values().collect()
}

/// Accepts item lists or item rows; entries without an instance id are dropped.
pub fn normalize_items(value: &Value) -> Vec<InventoryItem> {
    let items = entries(value)
        .into_iter()
        .filter_map(|item| {
            Some(InventoryItem {
                item_id: text_field(item, &["item_id", "itemId", "type"])?,
                instance_id: text_field(item, &["instance_id", "instanceId", "uid"])?,
                acquired_at: timestamp_field(item, &["acquired_at", "acquiredAt", "created_at"])
                    .unwrap_or(0),
                slot: text_field(item, &["slot", "equipped_slot", "equippedSlot"]),
            })
        })
        .collect::<Vec<_>>();
    canonical_items(&items)
}

/// Sorted by instance id; a repeated instance id keeps its last entry.
pub fn canonical_items(items: &[InventoryItem]) -> Vec<InventoryItem> {
    let mut by_instance = BTreeMap::new();
    for item in items {
        let instance_id = item.instance_id.trim();
        if instance_id.is_empty() || item.item_id.trim().is_empty() {
            continue;
        }
        by_instance.insert(
            instance_id.to_owned(),
            InventoryItem {
                item_id: item.item_id.trim().to_owned(),
                instance_id: instance_id.to_owned(),
                acquired_at: item.acquired_at.max(0),
                slot: item
                    .slot
                    .as_deref()
                    .map(str::trim)
                    .filter(|slot| !slot.is_empty())
                    .map(str::to_owned),
            },
        );
    }
    by_instance.into_values().collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::player::STARTING_X1_AMMO;

    #[test]
    fn zero_resource_entries_are_pruned() {
        let resources = normalize_resources(&json!({ "ore": 3, "gas": 0 }));
        assert_eq!(resources.0, BTreeMap::from([("ore".to_owned(), 3)]));
    }

    #[test]
    fn quantities_are_floored_and_clamped() {
        let resources = normalize_resources(&json!([
            { "resource_type": "ore", "quantity": 2.9 },
            { "resourceType": "gas", "amount": -4 },
            { "resource": "crystal", "quantity": "7" },
            { "type": "dust", "quantity": "NaN" },
        ]));
        assert_eq!(
            resources.0,
            BTreeMap::from([("crystal".to_owned(), 7), ("ore".to_owned(), 2)])
        );
    }

    #[test]
    fn ledger_keeps_explicit_zero_apart_from_unset() {
        let ledger = normalize_ledger(&json!({ "credits": 0, "currentShield": 0 }));
        assert_eq!(ledger.credits, 0);
        assert_eq!(ledger.current_shield, Some(0));
        assert_eq!(ledger.current_health, None);
        assert_eq!(ledger.cosmos, STARTING_COSMOS);

        let ledger = normalize_ledger(&Value::Null);
        assert_eq!(ledger.credits, STARTING_CREDITS);
    }

    #[test]
    fn ammo_aliases_resolve_to_one_shape() {
        let camel = normalize_ammo(&json!({
            "selectedTier": "X2",
            "tiers": { "x1": 10, "x2": 5 },
            "missiles": { "m1": 3 },
        }));
        let snake = normalize_ammo(&json!({
            "selected_tier": "x2",
            "x1": 10.0,
            "x2": "5",
            "missile": { "m1": 3 },
        }));
        let rows = normalize_ammo(&json!([
            { "tier": "x1", "quantity": 10, "selected": false },
            { "tier": "x2", "quantity": 5, "selected": true },
            { "tier": "x3", "quantity": 0, "selected": false },
            { "tier": "m1", "quantity": 3, "selected": false },
        ]));

        assert_eq!(camel, snake);
        assert_eq!(camel, rows);
        assert_eq!(camel.selected_tier, AmmoTier::X2);
        assert_eq!(camel.missiles()[&AmmoTier::M1], 3);
    }

    #[test]
    fn structured_tiers_win_over_legacy_missile_mirror() {
        let ammo = normalize_ammo(&json!({ "tiers": { "m1": 8 }, "missiles": { "m1": 2 } }));
        assert_eq!(ammo.quantity(AmmoTier::M1), 8);
        assert_eq!(ammo.selected_tier, AmmoTier::X1);
    }

    #[test]
    fn unknown_ammo_shape_falls_back_to_default() {
        assert_eq!(normalize_ammo(&json!("x1")), AmmoInventory::default());
        assert_eq!(AmmoInventory::default().quantity(AmmoTier::X1), STARTING_X1_AMMO);
    }

    #[test]
    fn ship_skins_always_include_selected_and_default() {
        let skins = normalize_ship_skins(&json!({
            "selectedSkinId": "ship_goliath",
            "unlockedSkinIds": ["ship_vengeance"],
        }));
        assert_eq!(skins.selected_skin_id, "ship_goliath");
        assert_eq!(
            skins.unlocked_skin_ids,
            BTreeSet::from([
                "ship_default".to_owned(),
                "ship_goliath".to_owned(),
                "ship_vengeance".to_owned()
            ])
        );

        assert_eq!(normalize_ship_skins(&Value::Null), ShipSkinState::default());
    }

    #[test]
    fn pet_fields_accept_both_namings() {
        let pet = normalize_pet(&json!({
            "petId": 7,
            "nickname": " Rex ",
            "level": 0,
            "currentHealth": 100.6,
            "max_health": 200,
            "isActive": 1,
            "moduleSlot": "",
            "inventory": [
                { "itemId": "ore", "itemName": "Ore", "quantity": 2, "rarity": "common" },
                { "item_id": "gem", "item_name": "Gem", "amount": 1, "rarity": "rare" },
                { "item_id": "junk", "quantity": 0 },
            ],
        }));

        assert_eq!(pet.pet_id, 7);
        assert_eq!(pet.nickname, "Rex");
        assert_eq!(pet.level, 1);
        assert_eq!(pet.current_health, 100);
        assert!(pet.is_active);
        assert_eq!(pet.module_slot, None);
        let ids = pet.inventory.iter().map(|item| item.item_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["gem", "ore"]);
    }

    #[test]
    fn quests_from_map_and_list_agree() {
        let from_map = normalize_quests(&json!({
            "q2": { "completed": true, "objectives": [] },
            "q1": { "objectives": [
                { "objectiveId": "b", "progress": 1, "required": 5, "kind": "kill" },
                { "id": "a", "current": 2, "target": 2, "type": "collect" },
            ] },
        }));
        let from_list = normalize_quests(&json!([
            { "questId": "q1", "objectives": [
                { "id": "a", "current": 2, "target": 2, "type": "collect" },
                { "id": "b", "current": 1, "target": 5, "type": "kill" },
            ] },
            { "quest_id": "q2", "isCompleted": true },
        ]));

        assert_eq!(from_map, from_list);
        assert_eq!(from_map[0].objectives[0].id, "a");
    }

    #[test]
    fn items_parse_rfc3339_and_drop_anonymous_entries() {
        let items = normalize_items(&json!([
            { "itemId": "laser_lf3", "instanceId": "b", "acquiredAt": "1970-01-01T00:00:01Z" },
            { "item_id": "shield_sg3n", "instance_id": "a", "acquired_at": 5, "slot": "gen_1" },
            { "item_id": "ghost" },
        ]));

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].instance_id, "a");
        assert_eq!(items[0].slot.as_deref(), Some("gen_1"));
        assert_eq!(items[1].acquired_at, 1_000);
    }

    #[test]
    fn profile_documents_fill_identity_and_ledger() {
        let record = normalize_profile(
            "fallback",
            &json!({
                "playerId": "12",
                "nickname": "Ace",
                "is_admin": true,
                "currencies": { "credits": 50, "honor": 9 },
                "stats": { "kills": 4, "rankingPoints": 30 },
                "upgrades": { "missileDamage": 2 },
            }),
        );

        assert_eq!(record.auth_id, "fallback");
        assert_eq!(record.player_id, 12);
        assert!(record.is_administrator);
        let ledger = record.inventory.expect("ledger");
        assert_eq!((ledger.credits, ledger.honor), (50, 9));
        assert_eq!(record.stats.ranking_points, 30);
        assert_eq!(record.upgrades.missile_damage, 2);
    }

    #[test]
    fn player_state_without_ledger_stays_unhydrated() {
        let record = normalize_player_state(&json!({ "authId": "a", "inventory": null }));
        assert_eq!(record.auth_id, "a");
        assert!(record.inventory.is_none());
    }
}
