//! Reference programs for the arithmetic guests and their journal layouts.

use crate::{
    inputs::{AuthenticatedAddInput, BinaryInput, ModexpInput, RangeInput, SqrtInput},
    Journal, JournalError, JournalReader, JournalWriter, ProgramError, SCALE,
};
use alloc::string::String;

/// Journal of `add` and `multiply`: both operands and the result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryJournal {
    pub a: i64,
    pub b: i64,
    pub result: i64,
}

impl Journal for BinaryJournal {
    fn encode(&self, w: &mut JournalWriter) {
        w.write_i64(self.a).write_i64(self.b).write_i64(self.result);
    }

    fn decode(r: &mut JournalReader<'_>) -> Result<Self, JournalError> {
        Ok(Self {
            a: r.read_i64()?,
            b: r.read_i64()?,
            result: r.read_i64()?,
        })
    }
}

/// A single fixed-point or integer value. Used by `sqrt`, the ML guests and
/// every dynamic guest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalarJournal {
    pub value: i64,
}

impl Journal for ScalarJournal {
    fn encode(&self, w: &mut JournalWriter) {
        w.write_i64(self.value);
    }

    fn decode(r: &mut JournalReader<'_>) -> Result<Self, JournalError> {
        Ok(Self {
            value: r.read_i64()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModexpJournal {
    pub base: u64,
    pub exponent: u64,
    pub modulus: u64,
    pub result: u64,
}

impl Journal for ModexpJournal {
    fn encode(&self, w: &mut JournalWriter) {
        w.write_u64(self.base)
            .write_u64(self.exponent)
            .write_u64(self.modulus)
            .write_u64(self.result);
    }

    fn decode(r: &mut JournalReader<'_>) -> Result<Self, JournalError> {
        Ok(Self {
            base: r.read_u64()?,
            exponent: r.read_u64()?,
            modulus: r.read_u64()?,
            result: r.read_u64()?,
        })
    }
}

/// The bounds and the outcome. The secret is never written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeJournal {
    pub min: u64,
    pub max: u64,
    pub in_range: bool,
}

impl Journal for RangeJournal {
    fn encode(&self, w: &mut JournalWriter) {
        w.write_u64(self.min)
            .write_u64(self.max)
            .write_bool(self.in_range);
    }

    fn decode(r: &mut JournalReader<'_>) -> Result<Self, JournalError> {
        Ok(Self {
            min: r.read_u64()?,
            max: r.read_u64()?,
            in_range: r.read_bool()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedAddJournal {
    pub a: i64,
    pub b: i64,
    pub result: i64,
    pub timestamp: u64,
    pub task_id: String,
}

impl Journal for AuthenticatedAddJournal {
    fn encode(&self, w: &mut JournalWriter) {
        w.write_i64(self.a)
            .write_i64(self.b)
            .write_i64(self.result)
            .write_u64(self.timestamp)
            .write_str(&self.task_id);
    }

    fn decode(r: &mut JournalReader<'_>) -> Result<Self, JournalError> {
        Ok(Self {
            a: r.read_i64()?,
            b: r.read_i64()?,
            result: r.read_i64()?,
            timestamp: r.read_u64()?,
            task_id: r.read_string()?,
        })
    }
}

pub fn add(input: &BinaryInput) -> Result<BinaryJournal, ProgramError> {
    let result = input.a.checked_add(input.b).ok_or(ProgramError::Overflow)?;
    Ok(BinaryJournal {
        a: input.a,
        b: input.b,
        result,
    })
}

/// Fixed-point product, truncated toward zero.
pub fn multiply(input: &BinaryInput) -> Result<BinaryJournal, ProgramError> {
    let product = (input.a as i128 * input.b as i128) / SCALE as i128;
    let result = i64::try_from(product).map_err(|_| ProgramError::Overflow)?;
    Ok(BinaryJournal {
        a: input.a,
        b: input.b,
        result,
    })
}

/// Largest fixed-point `r` with `r * r <= n * SCALE`.
pub fn sqrt(input: &SqrtInput) -> Result<ScalarJournal, ProgramError> {
    if input.n < 0 {
        return Err(ProgramError::NegativeInput);
    }
    let root = isqrt(input.n as u128 * SCALE as u128);
    Ok(ScalarJournal { value: root as i64 })
}

fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    // Newton iteration from an over-estimate converges monotonically down.
    let mut x = 1u128 << (128 - n.leading_zeros()).div_ceil(2);
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}

pub fn modexp(input: &ModexpInput) -> ModexpJournal {
    ModexpJournal {
        base: input.base,
        exponent: input.exponent,
        modulus: input.modulus,
        result: modular_exponentiation(input.base, input.exponent, input.modulus),
    }
}

/// Square-and-multiply with `u128` intermediates. A modulus of 0 or 1 yields 0.
pub fn modular_exponentiation(base: u64, mut exponent: u64, modulus: u64) -> u64 {
    if modulus <= 1 {
        return 0;
    }
    let modulus = modulus as u128;
    let mut base = base as u128 % modulus;
    let mut result = 1u128;
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result * base % modulus;
        }
        base = base * base % modulus;
        exponent >>= 1;
    }
    result as u64
}

pub fn range(input: &RangeInput) -> RangeJournal {
    RangeJournal {
        min: input.min,
        max: input.max,
        in_range: input.min <= input.secret && input.secret <= input.max,
    }
}

pub fn authenticated_add(
    input: &AuthenticatedAddInput,
) -> Result<AuthenticatedAddJournal, ProgramError> {
    let result = input.a.checked_add(input.b).ok_or(ProgramError::Overflow)?;
    Ok(AuthenticatedAddJournal {
        a: input.a,
        b: input.b,
        result,
        timestamp: input.timestamp,
        task_id: input.task_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use proptest::prelude::*;

    #[test]
    fn test_modexp() {
        assert_eq!(modular_exponentiation(2, 10, 1000), 24);
        assert_eq!(modular_exponentiation(3, 0, 7), 1);
        assert_eq!(modular_exponentiation(0, 5, 7), 0);
        assert_eq!(modular_exponentiation(5, 3, 1), 0);
        assert_eq!(modular_exponentiation(5, 3, 0), 0);
        assert_eq!(
            modular_exponentiation(u64::MAX, u64::MAX, u64::MAX - 58),
            modular_exponentiation(58, u64::MAX, u64::MAX - 58)
        );
    }

    #[test]
    fn test_sqrt() {
        let root = |n: i64| sqrt(&SqrtInput { n }).unwrap().value;
        assert_eq!(root(0), 0);
        assert_eq!(root(4 * SCALE), 2 * SCALE);
        assert_eq!(root(2 * SCALE), 14142);
        assert_eq!(root(2500), 5000); // sqrt(0.25) = 0.5
        assert_eq!(
            sqrt(&SqrtInput { n: -1 }),
            Err(ProgramError::NegativeInput)
        );
    }

    #[test]
    fn test_multiply_truncates() {
        let j = multiply(&BinaryInput { a: 15_000, b: 15_000 }).unwrap();
        assert_eq!(j.result, 22_500);
        let j = multiply(&BinaryInput { a: -3, b: 5_000 }).unwrap();
        assert_eq!(j.result, -1);
        assert_eq!(
            multiply(&BinaryInput {
                a: i64::MAX,
                b: i64::MAX
            }),
            Err(ProgramError::Overflow)
        );
    }

    #[test]
    fn test_range_journal_hides_secret() {
        for secret in [25u64, 35] {
            let journal = range(&RangeInput {
                secret,
                min: 20,
                max: 30,
            });
            assert_eq!(journal.in_range, secret == 25);
            let bytes = journal.to_bytes();
            assert_eq!(bytes.len(), 20);
            let needle = (secret as u32).to_le_bytes();
            assert!(!bytes.windows(4).any(|w| w == needle));
        }
    }

    #[test]
    fn test_authenticated_journal_layout() {
        let journal = authenticated_add(&AuthenticatedAddInput {
            a: 2,
            b: 3,
            timestamp: 1_700_000_000,
            task_id: "task_1".to_string(),
        })
        .unwrap();
        let bytes = journal.to_bytes();
        assert_eq!(bytes.len(), 3 * 8 + 8 + 4 + 8);
        assert_eq!(AuthenticatedAddJournal::from_bytes(&bytes).unwrap(), journal);
    }

    proptest! {
        #[test]
        fn test_isqrt_is_floor(n in 0u64..u64::MAX) {
            let n = n as u128;
            let r = isqrt(n);
            prop_assert!(r * r <= n);
            prop_assert!((r + 1) * (r + 1) > n);
        }

        #[test]
        fn test_range_for_any_bounds(
            a in any::<u64>(),
            b in any::<u64>(),
            secret in any::<u64>()
        ) {
            let (min, max) = (a.min(b), a.max(b));
            let journal = range(&RangeInput { secret, min, max });
            prop_assert_eq!(journal.in_range, (min..=max).contains(&secret));

            // exactly min, max and the flag word
            let bytes = journal.to_bytes();
            prop_assert_eq!(bytes.len(), 20);
            prop_assert_eq!(&bytes[..8], &min.to_le_bytes()[..]);
            prop_assert_eq!(&bytes[8..16], &max.to_le_bytes()[..]);
            prop_assert_eq!(&bytes[16..], &(journal.in_range as u32).to_le_bytes()[..]);
            if secret != min && secret != max {
                let secret = secret.to_le_bytes();
                prop_assert!(bytes.chunks(8).take(2).all(|field| field != secret));
            }
        }

        #[test]
        fn test_range_secret_inside_bounds(
            min in 0u64..1 << 32,
            span in 0u64..1 << 32,
            offset in any::<u64>()
        ) {
            let max = min + span;
            let secret = min + offset % (span + 1);
            let inside = RangeInput { secret, min, max };
            let above = RangeInput { secret: max + 1, min, max };
            prop_assert!(range(&inside).in_range);
            prop_assert!(!range(&above).in_range);
        }
    }
}
