//! Short opaque identifiers for columns, subjects and chapters.
//!
//! Ids are 9 random base-36 characters. They are probabilistically unique and
//! never checked for collisions.

use rand::Rng;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 9;

/// Generates a new random id.
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    (0..ID_LEN)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Source of fresh ids for newly created entities.
pub trait IdGenerator {
    fn next_id(&mut self) -> String;
}

/// Random ids, used everywhere outside tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&mut self) -> String {
        generate_id()
    }
}

/// Predictable ids (`<prefix>1`, `<prefix>2`, ...).
#[derive(Debug, Clone)]
pub struct SequentialIds {
    prefix: String,
    next: u64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> String {
        let id = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}
