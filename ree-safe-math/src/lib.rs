//! Checked arithmetic for satoshi and rune amounts.
//!
//! Every helper returns a [`MathError`] instead of wrapping or panicking, so callers can
//! propagate overflow with `?` and map it into their own error type.

use num::{CheckedAdd, CheckedDiv, CheckedMul, CheckedSub};
use primitive_types::U256;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    #[error("Addition overflowed")]
    AdditionOverflow,
    #[error("Subtraction underflowed")]
    SubtractionOverflow,
    #[error("Multiplication overflowed")]
    MultiplicationOverflow,
    #[error("Division by zero")]
    DivisionOverflow,
    #[error("Result does not fit in the target integer type")]
    ConversionError,
}

pub fn safe_add<T: CheckedAdd>(a: T, b: T) -> Result<T, MathError> {
    a.checked_add(&b).ok_or(MathError::AdditionOverflow)
}

pub fn safe_sub<T: CheckedSub>(a: T, b: T) -> Result<T, MathError> {
    a.checked_sub(&b).ok_or(MathError::SubtractionOverflow)
}

pub fn safe_mul<T: CheckedMul>(a: T, b: T) -> Result<T, MathError> {
    a.checked_mul(&b).ok_or(MathError::MultiplicationOverflow)
}

pub fn safe_div<T: CheckedDiv>(a: T, b: T) -> Result<T, MathError> {
    a.checked_div(&b).ok_or(MathError::DivisionOverflow)
}

/// Sums an iterator of amounts, failing on the first overflow.
pub fn checked_sum<T, I>(values: I) -> Result<T, MathError>
where
    T: CheckedAdd + Default,
    I: IntoIterator<Item = T>,
{
    values
        .into_iter()
        .try_fold(T::default(), |acc, value| safe_add(acc, value))
}

/// Computes `mul_a * mul_b / div` with a 256-bit intermediate, rounding down.
pub fn mul_div<T>(mul_a: T, mul_b: T, div: T) -> Result<T, MathError>
where
    T: TryFrom<U256>,
    U256: From<T>,
{
    let product = U256::from(mul_a)
        .checked_mul(U256::from(mul_b))
        .ok_or(MathError::MultiplicationOverflow)?;

    let quotient = product
        .checked_div(U256::from(div))
        .ok_or(MathError::DivisionOverflow)?;

    T::try_from(quotient).map_err(|_| MathError::ConversionError)
}

/// `amount * percent / 100`, rounding down.
pub fn percent_of(amount: u128, percent: u8) -> Result<u128, MathError> {
    mul_div(amount, percent as u128, 100)
}
