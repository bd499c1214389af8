//! Position sizing formulas.
//!
//! Pure functions over the balance; the capital manager wraps them with the
//! ledger's current balance and the configured cap.

use rust_decimal::Decimal;

/// Kelly fraction `W - (1 - W) / R`, clamped to [0, 1]. Zero when `rr <= 0`.
pub fn kelly_fraction(winrate: Decimal, rr: Decimal) -> Decimal {
    if rr <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let kelly = winrate - (Decimal::ONE - winrate) / rr;
    kelly.clamp(Decimal::ZERO, Decimal::ONE)
}

/// Kelly-scaled size: `balance * min(kelly * risk_pct, max_position_pct)`.
pub fn kelly_size(
    balance: Decimal,
    winrate: Decimal,
    rr: Decimal,
    risk_pct: Decimal,
    max_position_pct: Decimal,
) -> Decimal {
    let fraction = (kelly_fraction(winrate, rr) * risk_pct).min(max_position_pct);
    capped(balance * fraction, balance * max_position_pct)
}

/// Flat size: `balance * min(risk_pct, max_position_pct)`.
pub fn fixed_size(balance: Decimal, risk_pct: Decimal, max_position_pct: Decimal) -> Decimal {
    let fraction = risk_pct.min(max_position_pct);
    capped(balance * fraction, balance * max_position_pct)
}

/// Rounds to cents without ever leaving [0, cap].
fn capped(size: Decimal, cap: Decimal) -> Decimal {
    size.round_dp(2).min(cap).max(Decimal::ZERO)
}
