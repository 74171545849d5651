use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::state::player::{
    AmmoInventory, AmmoTier, CurrencyLedger, InventoryItem, PetState, PlayerRecord,
    QuestObjective, QuestProgressEntry, ResourceInventory, ShipSkinState, Stats, Upgrades,
};

/// Aggregate profile document written in a single operation on every flush.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileEntity {
    /// Primary key of the player.
    pub auth_id: String,
    /// Numeric display id.
    pub player_id: i64,
    /// Display name.
    pub nickname: String,
    /// Administrative flag.
    pub is_administrator: bool,
    /// Currency ledger at the time of the write.
    pub currencies: CurrencyEntity,
    /// Combat counters.
    pub stats: StatsEntity,
    /// Upgrade levels.
    pub upgrades: UpgradesEntity,
    /// Quest progress, also mirrored row by row in the quest objectives table.
    pub quests: Vec<QuestEntity>,
    /// Owned items, also mirrored row by row in the inventory items table.
    pub items: Vec<ItemEntity>,
    /// Last time the profile was written (unix milliseconds).
    pub updated_at: i64,
}

impl ProfileEntity {
    /// Project the aggregate part of a player record together with its currency ledger.
    pub fn from_record(record: &PlayerRecord, ledger: &CurrencyLedger) -> Self {
        Self {
            auth_id: record.auth_id.clone(),
            player_id: record.player_id,
            nickname: record.nickname.clone(),
            is_administrator: record.is_administrator,
            currencies: ledger.into(),
            stats: (&record.stats).into(),
            upgrades: (&record.upgrades).into(),
            quests: record.quests.iter().map(Into::into).collect(),
            items: record.items.iter().map(Into::into).collect(),
            updated_at: now_millis(),
        }
    }
}

/// Persisted currency ledger. Unset hit points are omitted rather than written as zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrencyEntity {
    /// Common currency.
    pub credits: i64,
    /// Premium currency.
    pub cosmos: i64,
    /// Pilot experience.
    pub experience: i64,
    /// Honor points.
    pub honor: i64,
    /// Ship hull points, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_health: Option<i64>,
    /// Ship shield points, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_shield: Option<i64>,
}

impl From<&CurrencyLedger> for CurrencyEntity {
    fn from(ledger: &CurrencyLedger) -> Self {
        Self {
            credits: ledger.credits.max(0),
            cosmos: ledger.cosmos.max(0),
            experience: ledger.experience.max(0),
            honor: ledger.honor.max(0),
            current_health: ledger.current_health.map(|hp| hp.max(0)),
            current_shield: ledger.current_shield.map(|shield| shield.max(0)),
        }
    }
}

/// Persisted combat counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsEntity {
    /// Enemies destroyed.
    pub kills: i64,
    /// Times destroyed.
    pub deaths: i64,
    /// Leaderboard points.
    pub ranking_points: i64,
}

impl From<&Stats> for StatsEntity {
    fn from(stats: &Stats) -> Self {
        Self {
            kills: stats.kills.max(0),
            deaths: stats.deaths.max(0),
            ranking_points: stats.ranking_points.max(0),
        }
    }
}

/// Persisted upgrade levels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpgradesEntity {
    /// Hull upgrade level.
    pub hp: i64,
    /// Shield upgrade level.
    pub shield: i64,
    /// Engine upgrade level.
    pub speed: i64,
    /// Laser damage upgrade level.
    pub damage: i64,
    /// Missile damage upgrade level.
    pub missile_damage: i64,
}

impl From<&Upgrades> for UpgradesEntity {
    fn from(upgrades: &Upgrades) -> Self {
        Self {
            hp: upgrades.hp.max(0),
            shield: upgrades.shield.max(0),
            speed: upgrades.speed.max(0),
            damage: upgrades.damage.max(0),
            missile_damage: upgrades.missile_damage.max(0),
        }
    }
}

/// Quest progress as stored in the profile and the quest objectives table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestEntity {
    /// Quest identifier.
    pub quest_id: String,
    /// Whether the quest was turned in.
    pub is_completed: bool,
    /// Objectives, sorted by id.
    pub objectives: Vec<ObjectiveEntity>,
}

impl From<&QuestProgressEntry> for QuestEntity {
    fn from(quest: &QuestProgressEntry) -> Self {
        Self {
            quest_id: quest.quest_id.clone(),
            is_completed: quest.is_completed,
            objectives: quest.objectives.iter().map(Into::into).collect(),
        }
    }
}

/// Stored quest objective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectiveEntity {
    /// Objective identifier.
    pub id: String,
    /// Progress so far.
    pub current: i64,
    /// Progress required.
    pub target: i64,
    /// Objective type.
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&QuestObjective> for ObjectiveEntity {
    fn from(objective: &QuestObjective) -> Self {
        Self {
            id: objective.id.clone(),
            current: objective.current.max(0),
            target: objective.target.max(0),
            kind: objective.kind.clone(),
        }
    }
}

/// Stored inventory item, keyed by instance id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemEntity {
    /// Item type identifier.
    pub item_id: String,
    /// Unique per player.
    pub instance_id: String,
    /// Unix milliseconds.
    pub acquired_at: i64,
    /// Equipment slot, if equipped.
    #[serde(default)]
    pub slot: Option<String>,
}

impl From<&InventoryItem> for ItemEntity {
    fn from(item: &InventoryItem) -> Self {
        Self {
            item_id: item.item_id.clone(),
            instance_id: item.instance_id.clone(),
            acquired_at: item.acquired_at,
            slot: item.slot.clone(),
        }
    }
}

/// One rolling-average sample of a player's honor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HonorSampleEntity {
    /// Player the sample belongs to.
    pub auth_id: String,
    /// Honor at sampling time.
    pub honor: i64,
    /// Unix milliseconds.
    pub recorded_at: i64,
}

/// Dedicated tables backing the optional sub-resources of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubResourceTable {
    /// Stock per ammunition tier, one row per tier.
    Ammo,
    /// Mined resources, one row per resource type.
    WorldResources,
    /// Single pet row.
    Pets,
    /// One row per unlocked skin.
    ShipSkins,
    /// One row per quest.
    QuestObjectives,
    /// One row per item instance.
    InventoryItems,
}

impl SubResourceTable {
    /// Every sub-resource table.
    pub const ALL: [SubResourceTable; 6] = [
        SubResourceTable::Ammo,
        SubResourceTable::WorldResources,
        SubResourceTable::Pets,
        SubResourceTable::ShipSkins,
        SubResourceTable::QuestObjectives,
        SubResourceTable::InventoryItems,
    ];

    /// Table (collection) name in the store.
    pub fn name(self) -> &'static str {
        match self {
            SubResourceTable::Ammo => "player_ammo",
            SubResourceTable::WorldResources => "player_resources",
            SubResourceTable::Pets => "player_pets",
            SubResourceTable::ShipSkins => "player_ship_skins",
            SubResourceTable::QuestObjectives => "player_quest_objectives",
            SubResourceTable::InventoryItems => "player_inventory_items",
        }
    }

    /// Whether loading a player reads this table. Quests and items load from the aggregate
    /// document; their tables only receive writes.
    pub fn read_on_load(self) -> bool {
        !matches!(
            self,
            SubResourceTable::QuestObjectives | SubResourceTable::InventoryItems
        )
    }

    /// Set-like tables delete rows whose key is absent from the written set.
    pub fn prunes_stale_rows(self) -> bool {
        !matches!(self, SubResourceTable::Ammo | SubResourceTable::Pets)
    }
}

/// One `(auth_id, key)` row of a sub-resource table.
#[derive(Debug, Clone, PartialEq)]
pub struct SubResourceRow {
    /// Row key, unique per player within the table.
    pub key: String,
    /// Column values. Backends store them next to `auth_id` and `key`.
    pub data: Value,
}

impl SubResourceRow {
    fn new(key: impl Into<String>, data: Value) -> Self {
        Self {
            key: key.into(),
            data,
        }
    }
}

/// One row per tier so a tier that drops to zero overwrites its previous quantity.
pub fn ammo_rows(ammo: &AmmoInventory) -> Vec<SubResourceRow> {
    AmmoTier::ALL
        .into_iter()
        .map(|tier| {
            SubResourceRow::new(
                tier.as_str(),
                json!({
                    "tier": tier.as_str(),
                    "quantity": ammo.quantity(tier).max(0),
                    "selected": tier == ammo.selected_tier,
                }),
            )
        })
        .collect()
}

/// Rows of the resources table; empty stacks are left out.
pub fn resource_rows(resources: &ResourceInventory) -> Vec<SubResourceRow> {
    resources
        .0
        .iter()
        .filter(|(_, quantity)| **quantity > 0)
        .map(|(resource, quantity)| {
            SubResourceRow::new(
                resource.clone(),
                json!({ "resource_type": resource, "quantity": quantity }),
            )
        })
        .collect()
}

/// The single row of the pets table.
pub fn pet_rows(pet: &PetState) -> Vec<SubResourceRow> {
    let inventory = pet
        .inventory
        .iter()
        .filter(|item| item.quantity > 0)
        .map(|item| {
            json!({
                "item_id": item.item_id,
                "item_name": item.item_name,
                "quantity": item.quantity,
                "rarity": item.rarity,
            })
        })
        .collect::<Vec<_>>();

    vec![SubResourceRow::new(
        "pet",
        json!({
            "pet_id": pet.pet_id,
            "nickname": pet.nickname,
            "level": pet.level.max(1),
            "experience": pet.experience.max(0),
            "current_health": pet.current_health.max(0),
            "max_health": pet.max_health.max(0),
            "current_shield": pet.current_shield.max(0),
            "max_shield": pet.max_shield.max(0),
            "is_active": pet.is_active,
            "module_slot": pet.module_slot,
            "inventory": inventory,
            "inventory_capacity": pet.inventory_capacity.max(0),
        }),
    )]
}

/// Rows of the skins table; the selected skin is always present.
pub fn ship_skin_rows(skins: &ShipSkinState) -> Vec<SubResourceRow> {
    let mut unlocked = skins.unlocked_skin_ids.clone();
    unlocked.insert(skins.selected_skin_id.clone());
    unlocked
        .into_iter()
        .map(|skin_id| {
            let selected = skin_id == skins.selected_skin_id;
            SubResourceRow::new(
                skin_id.clone(),
                json!({ "skin_id": skin_id, "selected": selected }),
            )
        })
        .collect()
}

/// Rows of the quest objectives table.
pub fn quest_rows(quests: &[QuestProgressEntry]) -> Vec<SubResourceRow> {
    quests
        .iter()
        .map(|quest| {
            let entity = QuestEntity::from(quest);
            SubResourceRow::new(
                quest.quest_id.clone(),
                serde_json::to_value(entity).unwrap_or(Value::Null),
            )
        })
        .collect()
}

/// Rows of the inventory items table.
pub fn item_rows(items: &[InventoryItem]) -> Vec<SubResourceRow> {
    items
        .iter()
        .map(|item| {
            let entity = ItemEntity::from(item);
            SubResourceRow::new(
                item.instance_id.clone(),
                serde_json::to_value(entity).unwrap_or(Value::Null),
            )
        })
        .collect()
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
