//! Price suggestion for account listings
//!
//! Sellers get a recommended asking price computed from the account's
//! attributes. Every component is a step function over fixed thresholds;
//! the total is rounded down to a whole thousand.

use serde::{Deserialize, Serialize};

/// Account attributes that drive the suggested price
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAttributes {
    pub vip_level: u32,
    /// Banked speed-up days
    pub speed: u64,
    pub talent: u32,
    pub equipment: u32,
    /// Migration tickets
    pub tickets: u32,
    pub key_rally: bool,
}

const ROUNDING_UNIT: u64 = 1_000;

/// (minimum VIP level, flat base)
const VIP_BASE: [(u32, u64); 6] = [
    (20, 60_000_000),
    (19, 30_000_000),
    (18, 10_000_000),
    (17, 5_000_000),
    (16, 3_000_000),
    (15, 1_000_000),
];
const VIP_FLOOR: u64 = 500_000;

/// 1000 speed-up days are worth 1,000,000 before the VIP multiplier
const SPEED_UNIT_VALUE: u64 = 1_000;
const SPEED_MULTIPLIER: [(u32, u64); 2] = [(20, 3), (18, 2)];

const EQUIPMENT_BONUS: [(u32, u64); 3] = [(56, 15_000_000), (48, 8_000_000), (40, 2_000_000)];
const TALENT_BONUS: [(u32, u64); 3] = [(30, 10_000_000), (20, 5_000_000), (10, 2_000_000)];

const TICKET_THRESHOLD: u32 = 40;
const TICKET_FALLBACK_TALENT: u32 = 30;
const HIGH_VIP: u32 = 18;

const KEY_RALLY_BONUS: [(u32, u64); 4] = [
    (20, 20_000_000),
    (19, 10_000_000),
    (18, 5_000_000),
    (17, 2_000_000),
];

/// First bucket whose threshold `value` reaches, or 0
fn step(table: &[(u32, u64)], value: u32) -> u64 {
    table
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map(|(_, amount)| *amount)
        .unwrap_or(0)
}

fn vip_base(vip_level: u32) -> u64 {
    match step(&VIP_BASE, vip_level) {
        0 => VIP_FLOOR,
        base => base,
    }
}

fn speed_bonus(attrs: &AccountAttributes) -> u64 {
    let multiplier = step(&SPEED_MULTIPLIER, attrs.vip_level).max(1);
    attrs
        .speed
        .saturating_mul(SPEED_UNIT_VALUE)
        .saturating_mul(multiplier)
}

fn ticket_bonus(attrs: &AccountAttributes) -> u64 {
    let high_vip = attrs.vip_level >= HIGH_VIP;
    if attrs.tickets >= TICKET_THRESHOLD {
        if high_vip { 5_000_000 } else { 2_000_000 }
    } else if attrs.talent >= TICKET_FALLBACK_TALENT {
        // Inspects talent, not tickets. Kept as observed in the storefront
        // pricing until product confirms the intended rule.
        if high_vip { 2_000_000 } else { 1_000_000 }
    } else {
        0
    }
}

fn key_rally_bonus(attrs: &AccountAttributes) -> u64 {
    if attrs.key_rally {
        step(&KEY_RALLY_BONUS, attrs.vip_level)
    } else {
        0
    }
}

/// Recommended listing price, always a non-negative multiple of 1000
pub fn suggest_price(attrs: &AccountAttributes) -> u64 {
    let total = [
        vip_base(attrs.vip_level),
        speed_bonus(attrs),
        step(&EQUIPMENT_BONUS, attrs.equipment),
        step(&TALENT_BONUS, attrs.talent),
        ticket_bonus(attrs),
        key_rally_bonus(attrs),
    ]
    .iter()
    .fold(0u64, |acc, part| acc.saturating_add(*part));

    total - total % ROUNDING_UNIT
}

/// Short price label in millions, e.g. `95tr` or `1.5tr`
pub fn format_short(price: u64) -> String {
    if price % 1_000_000 == 0 {
        format!("{}tr", price / 1_000_000)
    } else {
        // one decimal, halves round up
        let tenths = price.saturating_add(50_000) / 100_000;
        format!("{}.{}tr", tenths / 10, tenths % 10)
    }
}
