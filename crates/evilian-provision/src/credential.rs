//! One-off VM login credentials
//!
//! Generated right before VM creation, shown once, never written to disk.

use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;

/// Literal prefix of every generated admin username
pub const USERNAME_PREFIX: &str = "evilian";

const USERNAME_SUFFIX_LEN: usize = 6;
const PASSWORD_LEN: usize = 24;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+";

/// Admin username and password for the VM
#[derive(Clone, PartialEq, Eq)]
pub struct VmCredential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for VmCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl VmCredential {
    /// Generate a fresh credential from the thread-local RNG
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Generate a credential from the given RNG
    ///
    /// The password holds at least one lowercase letter, uppercase letter,
    /// digit and symbol, which Azure requires for password logins.
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let lower_digits: Vec<u8> = LOWER.iter().chain(DIGITS).copied().collect();
        let suffix: String = (0..USERNAME_SUFFIX_LEN)
            .map(|_| pick(&mut *rng, &lower_digits))
            .collect();

        let alphabet: Vec<u8> = [LOWER, UPPER, DIGITS, SYMBOLS].concat();
        let mut password: Vec<char> = [LOWER, UPPER, DIGITS, SYMBOLS]
            .iter()
            .map(|class| pick(&mut *rng, class))
            .collect();
        while password.len() < PASSWORD_LEN {
            password.push(pick(rng, &alphabet));
        }
        password.shuffle(rng);

        Self {
            username: format!("{USERNAME_PREFIX}{suffix}"),
            password: password.into_iter().collect(),
        }
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, set: &[u8]) -> char {
    char::from(set[rng.gen_range(0..set.len())])
}
