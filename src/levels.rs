//! Level tiers, sign-in bonus multipliers, and title definitions.
//!
//! Tiers are a static ascending table; the lookup scans from the top and
//! returns the first tier whose threshold the experience meets, i.e. the
//! greatest tier not exceeding `total_exp`.

/// One experience tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelTier {
    pub level: u32,
    pub min_exp: i64,
    pub name: &'static str,
    pub icon: &'static str,
    /// Extra fraction applied to level-bonused awards, e.g. 0.10 = +10%.
    pub signin_bonus: f64,
}

/// Level table, ascending by `min_exp`.
pub static LEVEL_TIERS: &[LevelTier] = &[
    LevelTier { level: 1, min_exp: 0, name: "Newcomer", icon: "🌱", signin_bonus: 0.0 },
    LevelTier { level: 2, min_exp: 100, name: "Regular", icon: "🍀", signin_bonus: 0.05 },
    LevelTier { level: 3, min_exp: 300, name: "Familiar Face", icon: "🌿", signin_bonus: 0.10 },
    LevelTier { level: 4, min_exp: 700, name: "Devotee", icon: "🌳", signin_bonus: 0.15 },
    LevelTier { level: 5, min_exp: 1500, name: "Veteran", icon: "⭐", signin_bonus: 0.20 },
    LevelTier { level: 6, min_exp: 3000, name: "Elder", icon: "🌟", signin_bonus: 0.25 },
    LevelTier { level: 7, min_exp: 6000, name: "Sage", icon: "💫", signin_bonus: 0.30 },
    LevelTier { level: 8, min_exp: 10000, name: "Luminary", icon: "🌙", signin_bonus: 0.40 },
    LevelTier { level: 9, min_exp: 20000, name: "Paragon", icon: "☀️", signin_bonus: 0.50 },
    LevelTier { level: 10, min_exp: 50000, name: "Legend", icon: "👑", signin_bonus: 0.60 },
];

/// Greatest tier whose `min_exp` does not exceed `total_exp`.
pub fn level_for(total_exp: i64) -> &'static LevelTier {
    LEVEL_TIERS
        .iter()
        .rev()
        .find(|t| total_exp >= t.min_exp)
        .unwrap_or(&LEVEL_TIERS[0])
}

/// Experience still needed to reach the next tier, `None` at max level.
pub fn exp_to_next_level(total_exp: i64) -> Option<i64> {
    let current = level_for(total_exp);
    LEVEL_TIERS
        .iter()
        .find(|t| t.level == current.level + 1)
        .map(|t| t.min_exp - total_exp)
}

/// Sign-in bonus fraction for a level. Unknown levels get no bonus.
pub fn signin_bonus_for(level: u32) -> f64 {
    LEVEL_TIERS
        .iter()
        .find(|t| t.level == level)
        .map(|t| t.signin_bonus)
        .unwrap_or(0.0)
}

/// Threshold kinds a title can be gated on. `Special` names a predicate the
/// check-in orchestrator evaluates itself (the resolver only declares it).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TitleCondition {
    Level(u32),
    CheckinDays(u32),
    TotalExp(i64),
    Special(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct TitleDef {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub condition: TitleCondition,
    /// Days until the title goes inactive; 0 means permanent.
    pub expire_days: u32,
}

pub static TITLES: &[TitleDef] = &[
    TitleDef { id: "week_one", name: "First Week", icon: "📅", condition: TitleCondition::CheckinDays(7), expire_days: 0 },
    TitleDef { id: "full_month", name: "Full Month", icon: "🗓️", condition: TitleCondition::CheckinDays(30), expire_days: 0 },
    TitleDef { id: "centurion", name: "Centurion", icon: "💯", condition: TitleCondition::CheckinDays(100), expire_days: 0 },
    TitleDef { id: "seasoned", name: "Seasoned", icon: "🎖️", condition: TitleCondition::Level(5), expire_days: 0 },
    TitleDef { id: "exalted", name: "Exalted", icon: "🏆", condition: TitleCondition::Level(8), expire_days: 0 },
    TitleDef { id: "ten_thousand", name: "Ten Thousand Club", icon: "💎", condition: TitleCondition::TotalExp(10000), expire_days: 0 },
    // Streak of pre-08:00 check-ins; expires if the habit lapses.
    TitleDef { id: "early_bird", name: "Early Bird", icon: "🐦", condition: TitleCondition::Special("early_bird"), expire_days: 30 },
];

pub fn title_by_id(id: &str) -> Option<&'static TitleDef> {
    TITLES.iter().find(|t| t.id == id)
}

/// Titles whose threshold condition the given stats meet. `Special`
/// conditions are never returned here.
pub fn eligible_titles(
    level: u32,
    total_checkin_days: u32,
    total_exp: i64,
) -> Vec<&'static TitleDef> {
    TITLES
        .iter()
        .filter(|t| match t.condition {
            TitleCondition::Level(min) => level >= min,
            TitleCondition::CheckinDays(min) => total_checkin_days >= min,
            TitleCondition::TotalExp(min) => total_exp >= min,
            TitleCondition::Special(_) => false,
        })
        .collect()
}
