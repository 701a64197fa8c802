// ============================================================================
// Matching Result
// Per-submission outcome handed back to the caller
// ============================================================================

use smallvec::SmallVec;

use super::{Order, Trade};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Trades produced by one inbound order; most orders produce few.
pub type Trades = SmallVec<[Trade; 4]>;

/// Terminal disposition of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Disposition {
    /// Fully executed
    Filled,
    /// Partially executed; the limit remainder rests in the book
    PartiallyFilledResting,
    /// Nothing executed; the whole order rests in the book
    Resting,
    /// Market order whose unfilled remainder found no liquidity and was
    /// discarded (possibly after some fills)
    MarketRemainderDiscarded,
    /// Partially executed, but the limit remainder could not rest and was
    /// cancelled; the trades stand
    RemainderCancelled { reason: String },
    Rejected { reason: String },
}

impl Disposition {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Disposition::Rejected { .. })
    }

    pub fn rests(&self) -> bool {
        matches!(
            self,
            Disposition::Resting | Disposition::PartiallyFilledResting
        )
    }
}

/// Final state of the inbound order plus everything it traded
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatchingResult {
    pub order: Order,
    pub trades: Trades,
    pub disposition: Disposition,
}

impl MatchingResult {
    pub fn rejected(order: Order, reason: impl Into<String>) -> Self {
        Self {
            order,
            trades: Trades::new(),
            disposition: Disposition::Rejected {
                reason: reason.into(),
            },
        }
    }

    pub fn sequence(&self) -> u64 {
        self.order.sequence
    }
}
