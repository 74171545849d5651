//! In-memory player state owned by a session and mutated by gameplay code.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::dto::validation::{validate_auth_id, validate_player_id};

/// Credits granted to a freshly created account.
pub const STARTING_CREDITS: i64 = 10_000;
/// Cosmos (premium currency) granted to a freshly created account.
pub const STARTING_COSMOS: i64 = 0;
/// Hull points of the starter ship.
pub const STARTING_SHIP_HEALTH: i64 = 4_000;
/// Shield points of the starter ship.
pub const STARTING_SHIP_SHIELD: i64 = 2_000;
/// Laser ammunition of the base tier handed out on account creation.
pub const STARTING_X1_AMMO: i64 = 1_000;
/// Skin every player owns; always part of the unlocked set.
pub const DEFAULT_SKIN_ID: &str = "ship_default";
/// Identifier of the starter pet.
pub const DEFAULT_PET_ID: i64 = 1;
/// Name given to a pet that was never renamed.
pub const DEFAULT_PET_NAME: &str = "P.E.T.";
/// Rarity of pet cargo that does not state one.
pub const DEFAULT_ITEM_RARITY: &str = "common";
/// Hull points of the starter pet.
pub const DEFAULT_PET_HEALTH: i64 = 50_000;
/// Shield points of the starter pet.
pub const DEFAULT_PET_SHIELD: i64 = 25_000;
/// Number of slots in the starter pet cargo.
pub const DEFAULT_PET_CAPACITY: i64 = 20;

/// Full player state as held in memory for the duration of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    /// Stable account identifier (UUID shaped) and primary persistence key.
    pub auth_id: String,
    /// Numeric id shown in the HUD.
    pub player_id: i64,
    /// Display name; may be empty.
    pub nickname: String,
    /// Grants access to administrative commands.
    pub is_administrator: bool,
    /// Currency ledger. `None` means the session never finished hydrating it.
    pub inventory: Option<CurrencyLedger>,
    /// Combat counters.
    pub stats: Stats,
    /// Purchased upgrade levels.
    pub upgrades: Upgrades,
    /// Ammunition per tier.
    pub ammo: AmmoInventory,
    /// Mined resources.
    pub resources: ResourceInventory,
    /// Companion drone.
    pub pet: PetState,
    /// Unlocked and selected ship skins.
    pub ship_skins: ShipSkinState,
    /// Quest progress, one entry per quest.
    pub quests: Vec<QuestProgressEntry>,
    /// Owned items.
    pub items: Vec<InventoryItem>,
    /// Rolling average of recent honor samples, when history is available.
    #[serde(default)]
    pub recent_honor: Option<i64>,
}

impl PlayerRecord {
    /// Build the baseline record of a brand-new account.
    pub fn new(auth_id: impl Into<String>, player_id: i64) -> Self {
        Self {
            auth_id: auth_id.into(),
            player_id,
            nickname: String::new(),
            is_administrator: false,
            inventory: Some(CurrencyLedger::default()),
            stats: Stats::default(),
            upgrades: Upgrades::default(),
            ammo: AmmoInventory::default(),
            resources: ResourceInventory::default(),
            pet: PetState::default(),
            ship_skins: ShipSkinState::default(),
            quests: Vec::new(),
            items: Vec::new(),
            recent_honor: None,
        }
    }
}

impl Validate for PlayerRecord {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_auth_id(&self.auth_id) {
            errors.add("auth_id", e);
        }
        if let Err(e) = validate_player_id(self.player_id) {
            errors.add("player_id", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Currencies and hit points of the player's ship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyLedger {
    /// Common currency.
    pub credits: i64,
    /// Premium currency.
    pub cosmos: i64,
    /// Pilot experience points.
    pub experience: i64,
    /// Honor points; sampled into the honor history on every load.
    pub honor: i64,
    /// `None` when storage never recorded a value; an explicit zero is kept as `Some(0)`.
    pub current_health: Option<i64>,
    /// Same convention as `current_health`.
    pub current_shield: Option<i64>,
}

impl Default for CurrencyLedger {
    fn default() -> Self {
        Self {
            credits: STARTING_CREDITS,
            cosmos: STARTING_COSMOS,
            experience: 0,
            honor: 0,
            current_health: Some(STARTING_SHIP_HEALTH),
            current_shield: Some(STARTING_SHIP_SHIELD),
        }
    }
}

/// Combat counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Enemies destroyed.
    pub kills: i64,
    /// Times the ship was destroyed.
    pub deaths: i64,
    /// Points used for leaderboard placement.
    pub ranking_points: i64,
}

/// Purchased upgrade levels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upgrades {
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

/// Ammunition tiers: lasers `x1..x3` and missiles `m1..m3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmmoTier {
    /// Basic laser ammunition.
    #[default]
    X1,
    /// Double-damage laser ammunition.
    X2,
    /// Triple-damage laser ammunition.
    X3,
    /// Light missiles.
    M1,
    /// Medium missiles.
    M2,
    /// Heavy missiles.
    M3,
}

impl AmmoTier {
    /// Every tier in display order.
    pub const ALL: [AmmoTier; 6] = [
        AmmoTier::X1,
        AmmoTier::X2,
        AmmoTier::X3,
        AmmoTier::M1,
        AmmoTier::M2,
        AmmoTier::M3,
    ];

    /// Storage key of the tier.
    pub fn as_str(self) -> &'static str {
        match self {
            AmmoTier::X1 => "x1",
            AmmoTier::X2 => "x2",
            AmmoTier::X3 => "x3",
            AmmoTier::M1 => "m1",
            AmmoTier::M2 => "m2",
            AmmoTier::M3 => "m3",
        }
    }

    /// Parse a tier key, accepting any letter case and surrounding whitespace.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|tier| tier.as_str() == value)
    }

    /// Whether the tier belongs to the missile launcher.
    pub fn is_missile(self) -> bool {
        matches!(self, AmmoTier::M1 | AmmoTier::M2 | AmmoTier::M3)
    }
}

/// Ammunition stock per tier plus the tier currently loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmmoInventory {
    /// Tier currently loaded.
    pub selected_tier: AmmoTier,
    /// Stock per tier; absent tiers hold nothing.
    pub tiers: BTreeMap<AmmoTier, i64>,
}

impl AmmoInventory {
    /// Quantity held for `tier`, zero when absent.
    pub fn quantity(&self, tier: AmmoTier) -> i64 {
        self.tiers.get(&tier).copied().unwrap_or(0)
    }

    /// Missile stock (`m1..m3`), derived from `tiers`.
    pub fn missiles(&self) -> BTreeMap<AmmoTier, i64> {
        AmmoTier::ALL
            .into_iter()
            .filter(|tier| tier.is_missile())
            .map(|tier| (tier, self.quantity(tier)))
            .collect()
    }

    /// Flattened ammo value older clients display: the stock of the selected tier.
    pub fn selected_quantity(&self) -> i64 {
        self.quantity(self.selected_tier)
    }
}

impl Default for AmmoInventory {
    fn default() -> Self {
        Self {
            selected_tier: AmmoTier::X1,
            tiers: BTreeMap::from([(AmmoTier::X1, STARTING_X1_AMMO)]),
        }
    }
}

/// Mined resources keyed by resource type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceInventory(pub BTreeMap<String, i64>);

impl ResourceInventory {
    /// Quantity held for `resource`, zero when absent.
    pub fn quantity(&self, resource: &str) -> i64 {
        self.0.get(resource).copied().unwrap_or(0)
    }

    /// Add (or with a negative delta, remove) units of a resource.
    pub fn adjust(&mut self, resource: &str, delta: i64) {
        let entry = self.0.entry(resource.to_owned()).or_insert(0);
        *entry = entry.saturating_add(delta).max(0);
    }
}

/// Companion drone state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetState {
    /// Pet model identifier.
    pub pet_id: i64,
    /// Name shown above the pet.
    pub nickname: String,
    /// Pet level, at least 1.
    pub level: i64,
    /// Experience toward the next level.
    pub experience: i64,
    /// Remaining hull points.
    pub current_health: i64,
    /// Hull capacity.
    pub max_health: i64,
    /// Remaining shield points.
    pub current_shield: i64,
    /// Shield capacity.
    pub max_shield: i64,
    /// Whether the pet is deployed.
    pub is_active: bool,
    /// Equipped behavior module, if any.
    pub module_slot: Option<String>,
    /// Loot carried by the pet.
    pub inventory: Vec<PetItem>,
    /// Number of stacks the pet can carry.
    pub inventory_capacity: i64,
}

impl Default for PetState {
    fn default() -> Self {
        Self {
            pet_id: DEFAULT_PET_ID,
            nickname: DEFAULT_PET_NAME.into(),
            level: 1,
            experience: 0,
            current_health: DEFAULT_PET_HEALTH,
            max_health: DEFAULT_PET_HEALTH,
            current_shield: DEFAULT_PET_SHIELD,
            max_shield: DEFAULT_PET_SHIELD,
            is_active: false,
            module_slot: None,
            inventory: Vec::new(),
            inventory_capacity: DEFAULT_PET_CAPACITY,
        }
    }
}

/// Stack of loot carried by the pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetItem {
    /// Item type identifier.
    pub item_id: String,
    /// Display name.
    pub item_name: String,
    /// Stack size.
    pub quantity: i64,
    /// Rarity label, `common` unless stated.
    pub rarity: String,
}

/// Cosmetic ship skins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipSkinState {
    /// Skin currently applied.
    pub selected_skin_id: String,
    /// Every unlocked skin, including the selected and default ones.
    pub unlocked_skin_ids: BTreeSet<String>,
}

impl ShipSkinState {
    /// Unlock and select a skin.
    pub fn select(&mut self, skin_id: impl Into<String>) {
        let skin_id = skin_id.into();
        self.unlocked_skin_ids.insert(skin_id.clone());
        self.selected_skin_id = skin_id;
    }
}

impl Default for ShipSkinState {
    fn default() -> Self {
        Self {
            selected_skin_id: DEFAULT_SKIN_ID.into(),
            unlocked_skin_ids: BTreeSet::from([DEFAULT_SKIN_ID.to_owned()]),
        }
    }
}

/// Progress on one quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestProgressEntry {
    /// Quest identifier.
    pub quest_id: String,
    /// Objectives of the quest, sorted by id.
    pub objectives: Vec<QuestObjective>,
    /// Whether the quest was turned in.
    pub is_completed: bool,
}

/// One countable goal of a quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestObjective {
    /// Objective identifier, unique within its quest.
    pub id: String,
    /// Progress so far.
    pub current: i64,
    /// Progress required.
    pub target: i64,
    /// Objective type (`kill`, `collect`, ...).
    #[serde(rename = "type")]
    pub kind: String,
}

/// Owned equipment or cargo item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    /// Item type identifier.
    pub item_id: String,
    /// Unique per player.
    pub instance_id: String,
    /// Unix timestamp in milliseconds.
    pub acquired_at: i64,
    /// Equipment slot when the item is equipped.
    pub slot: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missile_view_mirrors_missile_tiers() {
        let mut ammo = AmmoInventory::default();
        ammo.tiers.insert(AmmoTier::M2, 40);
        ammo.tiers.insert(AmmoTier::X3, 7);

        let missiles = ammo.missiles();
        assert_eq!(missiles.len(), 3);
        assert_eq!(missiles[&AmmoTier::M1], 0);
        assert_eq!(missiles[&AmmoTier::M2], 40);
        assert!(!missiles.contains_key(&AmmoTier::X3));
    }

    #[test]
    fn flattened_ammo_follows_selected_tier() {
        let mut ammo = AmmoInventory::default();
        assert_eq!(ammo.selected_quantity(), STARTING_X1_AMMO);
        ammo.selected_tier = AmmoTier::X2;
        assert_eq!(ammo.selected_quantity(), 0);
    }

    #[test]
    fn selecting_a_skin_unlocks_it() {
        let mut skins = ShipSkinState::default();
        skins.select("ship_goliath");
        assert_eq!(skins.selected_skin_id, "ship_goliath");
        assert!(skins.unlocked_skin_ids.contains("ship_goliath"));
        assert!(skins.unlocked_skin_ids.contains(DEFAULT_SKIN_ID));
    }

    #[test]
    fn resource_adjustment_never_goes_negative() {
        let mut resources = ResourceInventory::default();
        resources.adjust("ore", 3);
        resources.adjust("ore", -10);
        assert_eq!(resources.quantity("ore"), 0);
    }

    #[test]
    fn identity_validation_reports_both_fields() {
        let record = PlayerRecord::new("not-a-uuid", 0);
        let errors = record.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("auth_id"));
        assert!(fields.contains_key("player_id"));

        let record = PlayerRecord::new(uuid::Uuid::new_v4().to_string(), 42);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn ammo_tier_parsing_is_lenient_on_case() {
        assert_eq!(AmmoTier::parse(" M3 "), Some(AmmoTier::M3));
        assert_eq!(AmmoTier::parse("x4"), None);
    }
}
