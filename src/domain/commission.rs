use std::fmt;

use serde::{Deserialize, Serialize};

use super::Coins;

/// Platform commission as a whole percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CommissionRate(u8);

impl CommissionRate {
    pub const DEFAULT: CommissionRate = CommissionRate(30);

    pub fn new(percent: u8) -> Result<Self, InvalidRate> {
        if percent > 100 {
            return Err(InvalidRate(percent));
        }
        Ok(Self(percent))
    }

    pub fn percent(&self) -> u8 {
        self.0
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for CommissionRate {
    type Error = InvalidRate;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CommissionRate> for u8 {
    fn from(rate: CommissionRate) -> Self {
        rate.0
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRate(pub u8);

impl fmt::Display for InvalidRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "commission rate {} is outside 0..=100", self.0)
    }
}

impl std::error::Error for InvalidRate {}

/// How a gift price is divided between the recipient and the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub price: Coins,
    pub rate: CommissionRate,
    pub commission: Coins,
    pub recipient_amount: Coins,
}

/// `floor(price * rate / 100)`. Computed in i128 so the product cannot overflow.
/// Callers pass `price >= 0`.
pub fn commission(price: Coins, rate: CommissionRate) -> Coins {
    let scaled = i128::from(price) * i128::from(rate.percent()) / 100;
    // rate <= 100, so the quotient never exceeds price and always fits back into i64
    scaled as Coins
}

pub fn recipient_amount(price: Coins, rate: CommissionRate) -> Coins {
    price - commission(price, rate)
}

pub fn split(price: Coins, rate: CommissionRate) -> CommissionSplit {
    let commission = commission(price, rate);
    CommissionSplit {
        price,
        rate,
        commission,
        recipient_amount: price - commission,
    }
}
