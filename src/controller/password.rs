//! # Secret Generator
//!
//! Random credential strings under a per-component complexity policy.
//!
//! Values come from the operating system CSPRNG. Generation is only ever
//! triggered when the owning Secret is created, see
//! [`ResourceManager::ensure_secret`](crate::controller::resources::ResourceManager::ensure_secret).

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

const LOWER_LETTERS: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER_LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "~!@#$%^&*()_+`-={}|[]\\:\"<>?,./";

/// Complexity policy of a generated credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Total number of characters
    pub length: usize,
    /// Exact number of digits
    pub digits: usize,
    /// Exact number of symbols
    pub symbols: usize,
    /// Whether letters may be upper case
    pub allow_upper: bool,
    /// Whether a character may appear more than once
    pub allow_repeat: bool,
}

impl PasswordPolicy {
    /// Core secret and secret key
    pub const CORE: Self = Self {
        length: 16,
        digits: 5,
        symbols: 0,
        allow_upper: true,
        allow_repeat: true,
    };

    /// Registry HTTP secret
    pub const REGISTRY: Self = Self {
        length: 15,
        digits: 5,
        symbols: 3,
        allow_upper: true,
        allow_repeat: true,
    };

    /// Registry controller secret
    pub const REGISTRY_CONTROLLER: Self = Self {
        length: 15,
        digits: 5,
        symbols: 5,
        allow_upper: true,
        allow_repeat: true,
    };

    fn letters(&self) -> String {
        if self.allow_upper {
            format!("{LOWER_LETTERS}{UPPER_LETTERS}")
        } else {
            LOWER_LETTERS.to_string()
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("{digits} digits and {symbols} symbols exceed the length {length}")]
    ExceedsLength {
        length: usize,
        digits: usize,
        symbols: usize,
    },
    #[error("cannot pick {wanted} distinct {class} from {available}")]
    NotEnoughDistinct {
        class: &'static str,
        wanted: usize,
        available: usize,
    },
}

/// Generate a credential matching `policy`
pub fn generate(policy: &PasswordPolicy) -> Result<String, PasswordError> {
    generate_with(policy, &mut OsRng)
}

/// Generate a credential with a caller supplied random source
pub fn generate_with<R: Rng + ?Sized>(
    policy: &PasswordPolicy,
    rng: &mut R,
) -> Result<String, PasswordError> {
    let fixed = policy.digits + policy.symbols;
    if fixed > policy.length {
        return Err(PasswordError::ExceedsLength {
            length: policy.length,
            digits: policy.digits,
            symbols: policy.symbols,
        });
    }

    let letters = policy.letters();
    let letter_count = policy.length - fixed;

    let mut chars: Vec<char> = Vec::with_capacity(policy.length);
    pick(&mut chars, &letters, letter_count, "letters", policy.allow_repeat, rng)?;
    pick(&mut chars, DIGITS, policy.digits, "digits", policy.allow_repeat, rng)?;
    pick(&mut chars, SYMBOLS, policy.symbols, "symbols", policy.allow_repeat, rng)?;

    chars.shuffle(rng);
    Ok(chars.into_iter().collect())
}

fn pick<R: Rng + ?Sized>(
    out: &mut Vec<char>,
    alphabet: &str,
    count: usize,
    class: &'static str,
    allow_repeat: bool,
    rng: &mut R,
) -> Result<(), PasswordError> {
    let alphabet: Vec<char> = alphabet.chars().collect();

    if allow_repeat {
        for _ in 0..count {
            out.push(alphabet[rng.gen_range(0..alphabet.len())]);
        }
        return Ok(());
    }

    // Distinct characters also across classes, which never share characters
    if count > alphabet.len() {
        return Err(PasswordError::NotEnoughDistinct {
            class,
            wanted: count,
            available: alphabet.len(),
        });
    }
    out.extend(alphabet.choose_multiple(rng, count).copied());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn count(value: &str, alphabet: &str) -> usize {
        value.chars().filter(|c| alphabet.contains(*c)).count()
    }

    #[test]
    fn test_component_policies_are_honoured() {
        for policy in [
            PasswordPolicy::CORE,
            PasswordPolicy::REGISTRY,
            PasswordPolicy::REGISTRY_CONTROLLER,
        ] {
            for _ in 0..32 {
                let value = generate(&policy).expect("policy is satisfiable");
                assert_eq!(value.chars().count(), policy.length);
                assert_eq!(count(&value, DIGITS), policy.digits, "digits in {value}");
                assert_eq!(count(&value, SYMBOLS), policy.symbols, "symbols in {value}");
            }
        }
    }

    #[test]
    fn test_no_upper_policy() {
        let policy = PasswordPolicy {
            allow_upper: false,
            ..PasswordPolicy::CORE
        };
        let value = generate(&policy).expect("policy is satisfiable");
        assert_eq!(count(&value, UPPER_LETTERS), 0);
    }

    #[test]
    fn test_no_repeat_policy() {
        let policy = PasswordPolicy {
            length: 20,
            digits: 10,
            symbols: 0,
            allow_upper: false,
            allow_repeat: false,
        };
        let value = generate(&policy).expect("policy is satisfiable");
        let distinct: HashSet<char> = value.chars().collect();
        assert_eq!(distinct.len(), value.chars().count());
    }

    #[test]
    fn test_impossible_policies_fail() {
        let too_long = PasswordPolicy {
            length: 4,
            digits: 3,
            symbols: 2,
            allow_upper: true,
            allow_repeat: true,
        };
        assert!(matches!(
            generate(&too_long),
            Err(PasswordError::ExceedsLength { .. })
        ));

        let too_many_digits = PasswordPolicy {
            length: 11,
            digits: 11,
            symbols: 0,
            allow_upper: true,
            allow_repeat: false,
        };
        assert_eq!(
            generate(&too_many_digits),
            Err(PasswordError::NotEnoughDistinct {
                class: "digits",
                wanted: 11,
                available: 10
            })
        );
    }

    #[test]
    fn test_values_differ_between_calls() {
        let a = generate(&PasswordPolicy::CORE).expect("policy is satisfiable");
        let b = generate(&PasswordPolicy::CORE).expect("policy is satisfiable");
        assert_ne!(a, b);
    }
}
