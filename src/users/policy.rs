//! Password strength rules applied at signup and superuser creation.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::config::PasswordPolicyConfig;

const BUILTIN_COMMON_PASSWORDS: &str = include_str!("common_passwords.txt");
const MIN_SIMILARITY: f64 = 0.1;

/// Attributes of the user being created, compared against the password.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAttributes<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

impl<'a> UserAttributes<'a> {
    fn labelled(&self) -> [(&'static str, &'a str); 3] {
        [
            ("email address", self.email),
            ("first name", self.first_name),
            ("last name", self.last_name),
        ]
    }
}

pub trait PasswordValidator: Send + Sync {
    /// Returns a message when the password breaks the rule.
    fn validate(&self, password: &str, user: &UserAttributes<'_>) -> Option<String>;
}

pub struct MinimumLength(pub usize);

impl PasswordValidator for MinimumLength {
    fn validate(&self, password: &str, _user: &UserAttributes<'_>) -> Option<String> {
        if password.chars().count() >= self.0 {
            return None;
        }
        let unit = if self.0 == 1 { "character" } else { "characters" };
        Some(format!(
            "This password is too short. It must contain at least {} {unit}.",
            self.0
        ))
    }
}

pub struct CommonPasswords {
    passwords: HashSet<String>,
}

impl CommonPasswords {
    pub fn builtin() -> Self {
        Self::from_list(BUILTIN_COMMON_PASSWORDS)
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read common passwords file {path}"))?;
        Ok(Self::from_list(&raw))
    }

    fn from_list(raw: &str) -> Self {
        let passwords = raw
            .lines()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        Self { passwords }
    }

    pub fn len(&self) -> usize {
        self.passwords.len()
    }

    pub fn contains(&self, password: &str) -> bool {
        self.passwords.contains(&password.trim().to_lowercase())
    }
}

impl PasswordValidator for CommonPasswords {
    fn validate(&self, password: &str, _user: &UserAttributes<'_>) -> Option<String> {
        self.contains(password)
            .then(|| "This password is too common.".to_string())
    }
}

pub struct NumericPassword;

impl PasswordValidator for NumericPassword {
    fn validate(&self, password: &str, _user: &UserAttributes<'_>) -> Option<String> {
        let numeric = !password.is_empty() && password.chars().all(|c| c.is_ascii_digit());
        numeric.then(|| "This password is entirely numeric.".to_string())
    }
}

pub struct AttributeSimilarity {
    max_similarity: f64,
}

impl AttributeSimilarity {
    pub fn new(max_similarity: f64) -> anyhow::Result<Self> {
        if max_similarity < MIN_SIMILARITY {
            anyhow::bail!("max_similarity must be at least {MIN_SIMILARITY}");
        }
        Ok(Self { max_similarity })
    }

    /// Long passwords are not compared against short attribute fragments.
    fn exceeds_length_ratio(&self, password_len: usize, part_len: usize) -> bool {
        let bound = self.max_similarity / 2.0 * password_len as f64;
        password_len >= 10 * part_len && (part_len as f64) < bound
    }

    fn too_similar(&self, password: &[char], part: &[char]) -> bool {
        if self.exceeds_length_ratio(password.len(), part.len()) {
            return false;
        }
        quick_ratio(password, part) >= self.max_similarity
            && ratio(password, part) >= self.max_similarity
    }
}

impl PasswordValidator for AttributeSimilarity {
    fn validate(&self, password: &str, user: &UserAttributes<'_>) -> Option<String> {
        lazy_static! {
            static ref NON_WORD: Regex = Regex::new(r"\W+").unwrap();
        }
        let password: Vec<char> = password.to_lowercase().chars().collect();
        for (label, value) in user.labelled() {
            if value.is_empty() {
                continue;
            }
            let value = value.to_lowercase();
            let parts = NON_WORD
                .split(&value)
                .chain(std::iter::once(value.as_str()))
                .filter(|p| !p.is_empty());
            for part in parts {
                let part: Vec<char> = part.chars().collect();
                if self.too_similar(&password, &part) {
                    return Some(format!("The password is too similar to the {label}."));
                }
            }
        }
        None
    }
}

/// Upper bound on `ratio`, from character counts alone.
fn quick_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let mut available: HashMap<char, usize> = HashMap::new();
    for c in b {
        *available.entry(*c).or_default() += 1;
    }
    let mut matches = 0;
    for c in a {
        if let Some(n) = available.get_mut(c) {
            if *n > 0 {
                *n -= 1;
                matches += 1;
            }
        }
    }
    2.0 * matches as f64 / total as f64
}

/// Ratcliff/Obershelp similarity: 2 * matched / total length.
fn ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(a, b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, k) = longest_common_block(a, b);
    if k == 0 {
        return 0;
    }
    k + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + k..], &b[j + k..])
}

/// Earliest longest common substring as (start in a, start in b, length).
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb { prev[j] + 1 } else { 0 };
            let k = cur[j + 1];
            if k > best.2 {
                best = (i + 1 - k, j + 1 - k, k);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}

pub struct PasswordPolicy {
    validators: Vec<Box<dyn PasswordValidator>>,
}

impl PasswordPolicy {
    pub fn new(validators: Vec<Box<dyn PasswordValidator>>) -> Self {
        Self { validators }
    }

    pub fn from_config(cfg: &PasswordPolicyConfig) -> anyhow::Result<Self> {
        let mut validators: Vec<Box<dyn PasswordValidator>> = Vec::new();
        if cfg.reject_similar {
            validators.push(Box::new(AttributeSimilarity::new(cfg.max_similarity)?));
        }
        validators.push(Box::new(MinimumLength(cfg.min_length)));
        if cfg.reject_common {
            let common = match &cfg.common_passwords_file {
                Some(path) => CommonPasswords::from_file(path)?,
                None => CommonPasswords::builtin(),
            };
            debug!(count = common.len(), "common password list loaded");
            validators.push(Box::new(common));
        }
        if cfg.reject_numeric {
            validators.push(Box::new(NumericPassword));
        }
        Ok(Self::new(validators))
    }

    /// Runs every rule and returns all violations in rule order.
    pub fn validate(&self, password: &str, user: &UserAttributes<'_>) -> Result<(), Vec<String>> {
        let violations: Vec<String> = self
            .validators
            .iter()
            .filter_map(|v| v.validate(password, user))
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
