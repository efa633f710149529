use contracts::{DiffValue, ResourceAmounts, ResourceKind};
use thiserror::Error;

use crate::progression::CostTable;

/// Share of cumulative cost returned when a building is demolished.
pub const DEMOLISH_REFUND_PERCENT: i64 = 80;
/// Moving a building costs its current level's cost divided by this.
pub const MOVE_COST_DIVISOR: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EconomyError {
    #[error("insufficient {kind}: need {required}, have {available}")]
    InsufficientBalance {
        kind: ResourceKind,
        required: i64,
        available: i64,
    },
    #[error("invalid {kind} amount {amount}")]
    InvalidAmount { kind: ResourceKind, amount: i64 },
}

/// One fiefdom's resource counters plus the diffs produced while mutating them.
///
/// Debits are all-or-nothing: a cost that cannot be paid in full leaves every
/// counter untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct FiefdomLedger {
    fiefdom_id: i64,
    balances: ResourceAmounts,
    diffs: Vec<DiffValue>,
}

impl FiefdomLedger {
    pub fn new(fiefdom_id: i64, balances: ResourceAmounts) -> Self {
        Self {
            fiefdom_id,
            balances,
            diffs: Vec::new(),
        }
    }

    pub fn fiefdom_id(&self) -> i64 {
        self.fiefdom_id
    }

    pub fn balance(&self, kind: ResourceKind) -> i64 {
        balance_for_kind(&self.balances, kind)
    }

    pub fn balances(&self) -> &ResourceAmounts {
        &self.balances
    }

    pub fn diffs(&self) -> &[DiffValue] {
        &self.diffs
    }

    pub fn into_parts(self) -> (ResourceAmounts, Vec<DiffValue>) {
        (self.balances, self.diffs)
    }

    /// First resource the fiefdom cannot cover, if any.
    pub fn shortfall(&self, costs: &ResourceAmounts) -> Option<EconomyError> {
        costs.iter().find_map(|(kind, required)| {
            let available = self.balance(*kind);
            (available < *required).then_some(EconomyError::InsufficientBalance {
                kind: *kind,
                required: *required,
                available,
            })
        })
    }

    pub fn can_afford(&self, costs: &ResourceAmounts) -> bool {
        self.shortfall(costs).is_none()
    }

    pub fn deduct(&mut self, costs: &ResourceAmounts) -> Result<(), EconomyError> {
        validate_amounts(costs)?;
        if let Some(err) = self.shortfall(costs) {
            return Err(err);
        }
        for (kind, amount) in costs {
            self.apply(*kind, -amount);
        }
        Ok(())
    }

    pub fn credit(&mut self, amounts: &ResourceAmounts) -> Result<(), EconomyError> {
        validate_amounts(amounts)?;
        for (kind, amount) in amounts {
            self.apply(*kind, *amount);
        }
        Ok(())
    }

    fn apply(&mut self, kind: ResourceKind, delta: i64) {
        if delta == 0 {
            return;
        }
        let (before, after) = apply_delta(&mut self.balances, kind, delta);
        self.diffs
            .push(DiffValue::fiefdom_resource(self.fiefdom_id, kind, before, after));
    }
}

pub fn balance_for_kind(balances: &ResourceAmounts, kind: ResourceKind) -> i64 {
    balances.get(&kind).copied().unwrap_or(0)
}

fn apply_delta(balances: &mut ResourceAmounts, kind: ResourceKind, delta: i64) -> (i64, i64) {
    let before = balance_for_kind(balances, kind);
    let after = before + delta;
    balances.insert(kind, after);
    (before, after)
}

fn validate_amounts(amounts: &ResourceAmounts) -> Result<(), EconomyError> {
    match amounts.iter().find(|(_, amount)| **amount < 0) {
        Some((kind, amount)) => Err(EconomyError::InvalidAmount {
            kind: *kind,
            amount: *amount,
        }),
        None => Ok(()),
    }
}

/// Cost of building the level that follows `current_level`.
pub fn next_level_cost(costs: &CostTable, current_level: u32) -> ResourceAmounts {
    costs.at_index(current_level as usize)
}

/// Levels a building has been charged for. Creation pays for level 1 up
/// front, and an upgrade in progress has already paid for the level after
/// the current one.
pub fn levels_paid(level: u32, construction_start_ts: i64) -> u32 {
    if level == 0 || construction_start_ts > 0 {
        level + 1
    } else {
        level
    }
}

/// 80% of everything paid for levels `1..=level`, floored per resource.
pub fn demolish_refund(costs: &CostTable, level: u32) -> ResourceAmounts {
    costs
        .cumulative(level)
        .into_iter()
        .map(|(kind, total)| (kind, total * DEMOLISH_REFUND_PERCENT / 100))
        .filter(|(_, refund)| *refund > 0)
        .collect()
}

/// A tenth of the current level's cost, floored per resource.
pub fn move_cost(costs: &CostTable, level: u32) -> ResourceAmounts {
    if level == 0 {
        return ResourceAmounts::new();
    }
    costs
        .at_index(level as usize - 1)
        .into_iter()
        .map(|(kind, amount)| (kind, amount / MOVE_COST_DIVISOR))
        .filter(|(_, amount)| *amount > 0)
        .collect()
}
