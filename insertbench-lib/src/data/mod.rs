//! Random users and payloads for synthetic events.
//!
//! Generators take any [`rand::Rng`] so that callers (and tests)
//! decide between a seeded or an entropy backed source.

use std::{
    collections::{BTreeMap, HashSet},
    ops::RangeInclusive,
};

use rand::{Rng, RngExt as _, seq::IndexedRandom as _};

const USER_NAME_LEN: RangeInclusive<usize> = 5..=14;

const PAYLOAD_KEY_COUNT: RangeInclusive<usize> = 1..=20;
const PAYLOAD_KEY_LEN: RangeInclusive<usize> = 1..=10;
const PAYLOAD_VALUE_LEN: RangeInclusive<usize> = 1..=100;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LETTERS_AND_SPACE: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ ";

/// Generate between 1 and `max_users` (inclusive) distinct user names.
///
/// A `max_users` of zero is treated as one.
pub fn random_users<R: Rng + ?Sized>(rng: &mut R, max_users: usize) -> Vec<String> {
    let count = rng.random_range(1..=max_users.max(1));

    let mut seen = HashSet::with_capacity(count);
    let mut users = Vec::with_capacity(count);
    while users.len() < count {
        let len = rng.random_range(USER_NAME_LEN);
        let name = random_string(rng, LETTERS, len);
        if seen.insert(name.clone()) {
            users.push(name);
        }
    }
    users
}

/// Generate a random key/value payload for a single event.
pub fn random_payload<R: Rng + ?Sized>(rng: &mut R) -> BTreeMap<String, String> {
    let count = rng.random_range(PAYLOAD_KEY_COUNT);

    let mut data = BTreeMap::new();
    // keys may collide, keep drawing until the map has the requested size
    while data.len() < count {
        let key_len = rng.random_range(PAYLOAD_KEY_LEN);
        let value_len = rng.random_range(PAYLOAD_VALUE_LEN);
        data.insert(
            random_string(rng, LETTERS_AND_SPACE, key_len),
            random_string(rng, LETTERS_AND_SPACE, value_len),
        );
    }
    data
}

fn random_string<R: Rng + ?Sized>(rng: &mut R, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .filter_map(|_| alphabet.choose(rng).map(|b| *b as char))
        .collect()
}
