//! Scope classes.
//!
//! A scope class (`plenti-AB12cd`) ties one logical element of one component
//! instance to its rewritten CSS selectors and script queries. Classes are
//! drawn from a seedable generator so test output is reproducible.

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

use crate::options::RenderOptions;

/// Fingerprint of one scoped element: what CSS and JS can refer to it by.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedElement {
    pub tag: String,
    pub id: Option<String>,
    /// Author classes; generated scope classes are not listed here.
    pub classes: Vec<String>,
    pub scope_class: String,
}

/// How a selector fragment names an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Tag,
    Class,
    Id,
}

/// First element matching `name` by the given kind of reference.
pub fn lookup<'e>(elements: &'e [ScopedElement], target: Target, name: &str) -> Option<&'e str> {
    elements
        .iter()
        .find(|e| match target {
            Target::Tag => e.tag == name,
            Target::Id => e.id.as_deref() == Some(name),
            Target::Class => e.classes.iter().any(|c| c == name),
        })
        .map(|e| e.scope_class.as_str())
}

/// Colliding draws tolerated before the token length grows.
const MAX_DRAWS: usize = 256;

#[derive(Debug)]
pub struct ClassGenerator {
    rng: StdRng,
    prefix: String,
    length: usize,
    issued: HashSet<String>,
}

impl ClassGenerator {
    pub fn new(options: &RenderOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            prefix: options.class_prefix.clone(),
            length: options.token_length.max(1),
            issued: HashSet::new(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(&RenderOptions::seeded(seed))
    }

    /// A random alphanumeric token never handed out before by this generator.
    /// When draws keep colliding the token space is treated as exhausted and
    /// tokens grow by one character.
    pub fn token(&mut self) -> String {
        loop {
            for _ in 0..MAX_DRAWS {
                let token: String = (&mut self.rng)
                    .sample_iter(&Alphanumeric)
                    .take(self.length)
                    .map(char::from)
                    .collect();
                if self.issued.insert(token.clone()) {
                    return token;
                }
            }
            self.length += 1;
        }
    }

    pub fn class(&mut self) -> String {
        let token = self.token();
        format!("{}{}", self.prefix, token)
    }

    pub fn is_scope_class(&self, class: &str) -> bool {
        class.len() > self.prefix.len() && class.starts_with(&self.prefix)
    }
}
