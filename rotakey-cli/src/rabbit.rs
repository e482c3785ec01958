//! Demo data: rabbits and the magic words they respond to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Field of [`Rabbit`] stored encrypted.
pub const ENCRYPTED_FIELD: &str = "magicWord";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rabbit {
    pub name: String,
    pub magic_word: String,
}

impl Rabbit {
    pub fn new(name: impl Into<String>, magic_word: impl Into<String>) -> Self {
        Self { name: name.into(), magic_word: magic_word.into() }
    }
}

impl fmt::Display for Rabbit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} responds to '{}'", self.name, self.magic_word)
    }
}

/// Look out, hare they come!
pub fn rolodex() -> Vec<Rabbit> {
    vec![
        Rabbit::new("Nibbles", "Alakazam"),
        Rabbit::new("Floppy", "Ajji Majji la Tarajji"),
        Rabbit::new("Booper", "Xyzzy"),
    ]
}
