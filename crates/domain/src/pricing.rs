//! Subtotal/total computation shared by carts and orders.

use common::{Money, Percent};
use serde::{Deserialize, Serialize};

/// A line that contributes to a subtotal and a discounted total.
pub trait PricedLine {
    fn unit_price(&self) -> Money;
    fn quantity(&self) -> u32;
    fn discount(&self) -> Percent;
}

/// Cached money figures of a cart or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    /// Σ(unit price × quantity).
    pub subtotal: Money,
    /// Σ(unit price × quantity × (1 − discount/100)), rounded half-up to the cent.
    pub total: Money,
}

impl Totals {
    /// Computes totals over a set of lines.
    ///
    /// The discounted sum is accumulated exactly in hundredths of a cent and
    /// rounded once, so the result does not depend on line order.
    pub fn of<'a, L, I>(lines: I) -> Self
    where
        L: PricedLine + 'a,
        I: IntoIterator<Item = &'a L>,
    {
        let mut subtotal = Money::zero();
        let mut discounted: i128 = 0;

        for line in lines {
            let gross = line.unit_price().multiply(line.quantity());
            subtotal += gross;
            discounted += i128::from(gross.cents()) * i128::from(line.discount().remaining());
        }

        Self {
            subtotal,
            total: Money::from_hundredths_of_cent(discounted),
        }
    }
}
