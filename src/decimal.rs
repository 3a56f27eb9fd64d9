use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};

/// currency with ISO code and minor-unit scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    code: [u8; 3],
    minor_units: u32,
}

impl Currency {
    /// create from a three-letter ISO code and minor-unit count
    pub fn new(code: &str, minor_units: u32) -> Self {
        let bytes = code.as_bytes();
        assert!(bytes.len() == 3, "currency code must be three letters");
        Currency {
            code: [bytes[0], bytes[1], bytes[2]],
            minor_units,
        }
    }

    pub fn usd() -> Self {
        Currency::new("USD", 2)
    }

    pub fn eur() -> Self {
        Currency::new("EUR", 2)
    }

    pub fn code(&self) -> &str {
        std::str::from_utf8(&self.code).unwrap_or("???")
    }

    pub fn minor_units(&self) -> u32 {
        self.minor_units
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// currency-scoped monetary amount, always held at the currency's precision
///
/// arithmetic between two `Money` values asserts currency agreement; the
/// orchestrator validates external amounts against the loan currency up
/// front, so inside a pass every amount shares one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// create from a decimal, rounding to the currency's precision
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Money {
            amount: amount.round_dp(currency.minor_units),
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Money {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// create from a whole-unit amount (dollars, euros, ...)
    pub fn from_major(amount: i64, currency: Currency) -> Self {
        Money {
            amount: Decimal::from(amount),
            currency,
        }
    }

    /// create from a minor-unit amount (cents, ...)
    pub fn from_minor(amount: i64, currency: Currency) -> Self {
        Money {
            amount: Decimal::new(amount, currency.minor_units),
            currency,
        }
    }

    pub fn as_decimal(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn min(self, other: Self) -> Self {
        self.assert_same_currency(&other);
        Money {
            amount: self.amount.min(other.amount),
            currency: self.currency,
        }
    }

    pub fn max(self, other: Self) -> Self {
        self.assert_same_currency(&other);
        Money {
            amount: self.amount.max(other.amount),
            currency: self.currency,
        }
    }

    /// clamp a negative result to zero; allocation boundaries never go below
    pub fn clamp_zero(self) -> Self {
        if self.is_negative() {
            Money::zero(self.currency)
        } else {
            self
        }
    }

    /// split into `parts` even shares at currency precision, assigning the
    /// integer-division residue to the last share so no unit is lost
    pub fn split_even(&self, parts: usize) -> Vec<Money> {
        assert!(parts > 0, "cannot split into zero parts");
        let share = (self.amount / Decimal::from(parts))
            .round_dp_with_strategy(self.currency.minor_units, RoundingStrategy::ToZero);
        let mut shares = vec![
            Money {
                amount: share,
                currency: self.currency,
            };
            parts
        ];
        let last = self.amount - share * Decimal::from(parts as i64 - 1);
        shares[parts - 1].amount = last;
        shares
    }

    fn assert_same_currency(&self, other: &Money) {
        assert!(
            self.currency == other.currency,
            "currency mismatch: {} vs {}",
            self.currency,
            other.currency
        );
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        self.amount.partial_cmp(&other.amount)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        self.assert_same_currency(&other);
        Money::new(self.amount + other.amount, self.currency)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        *self = *self + other;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        self.assert_same_currency(&other);
        Money::new(self.amount - other.amount, self.currency)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Money) {
        *self = *self - other;
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, other: Decimal) -> Money {
        Money::new(self.amount * other, self.currency)
    }
}

impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, other: Decimal) -> Money {
        Money::new(self.amount / other, self.currency)
    }
}

/// rate type for interest rates and ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    /// create from decimal (e.g., 0.05 for 5%)
    pub fn from_decimal(d: Decimal) -> Self {
        Rate(d)
    }

    /// create from percentage (e.g., 5 for 5%)
    pub fn from_percentage(p: u32) -> Self {
        Rate(Decimal::from(p) / Decimal::from(100))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn as_percentage(&self) -> Decimal {
        self.0 * Decimal::from(100)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage())
    }
}

impl From<Decimal> for Rate {
    fn from(d: Decimal) -> Self {
        Rate::from_decimal(d)
    }
}
