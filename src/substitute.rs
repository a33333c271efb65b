//! Per-request placeholder expansion for URL and body templates.
//!
//! Recognised tokens:
//! - `__RANDI64_<low>_<high>__` uniform integer in `[low, high]`
//! - `__RANDHEX_<n>__` exactly `n` lowercase hex characters from the OS CSPRNG
//! - `__RANDSTR_<letters|digits|lettersdigits>_<n>__` exactly `n` characters of that class
//! - `__SEQ_<low>_<high>__` counter shared by every use of the same literal token
//!
//! Anything that does not parse is left in place untouched.

use std::{
    borrow::Cow,
    collections::HashMap,
    sync::{Arc, LazyLock, Mutex, PoisonError},
};

use rand::{rngs::OsRng, Rng, RngCore};
use regex::{Captures, Regex};

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const LETTERS_DIGITS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"__(?:",
        r"RANDI64_(?P<int_lo>[+-]?\d{1,19})_(?P<int_hi>[+-]?\d{1,19})",
        r"|RANDHEX_(?P<hex>\d{1,3})",
        r"|RANDSTR_(?P<class>lettersdigits|letters|digits)_(?P<str>\d{1,3})",
        r"|SEQ_(?P<seq_lo>[+-]?\d{1,19})_(?P<seq_hi>[+-]?\d{1,19})",
        r")__"
    ))
    .expect("placeholder pattern is a valid regex")
});

/// Next value per literal `__SEQ_..__` token text.
#[derive(Debug, Default)]
pub struct SequenceState {
    counters: Mutex<HashMap<String, i64>>,
}

impl SequenceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value for `token` and advances it, wrapping to `low` after `high`.
    pub fn next(&self, token: &str, low: i64, high: i64) -> i64 {
        let (low, high) = ordered(low, high);
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let value = counters.get(token).copied().unwrap_or(low).clamp(low, high);
        let next = if value >= high { low } else { value + 1 };
        match counters.get_mut(token) {
            Some(slot) => *slot = next,
            None => {
                counters.insert(token.to_owned(), next);
            }
        }
        value
    }
}

/// Cheap to clone; clones share one [`SequenceState`].
#[derive(Debug, Clone, Default)]
pub struct Substituter {
    sequences: Arc<SequenceState>,
}

impl Substituter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sequences(sequences: Arc<SequenceState>) -> Self {
        Self { sequences }
    }

    pub fn sequences(&self) -> &Arc<SequenceState> {
        &self.sequences
    }

    pub fn render<'a>(&self, template: &'a str) -> Cow<'a, str> {
        if !has_marker(template) {
            return Cow::Borrowed(template);
        }
        TOKEN.replace_all(template, |caps: &Captures<'_>| {
            self.expand(caps).unwrap_or_else(|| caps[0].to_owned())
        })
    }

    fn expand(&self, caps: &Captures<'_>) -> Option<String> {
        if let (Some(lo), Some(hi)) = (caps.name("int_lo"), caps.name("int_hi")) {
            let (lo, hi) = ordered(lo.as_str().parse().ok()?, hi.as_str().parse().ok()?);
            return Some(rand::thread_rng().gen_range(lo..=hi).to_string());
        }
        if let Some(len) = caps.name("hex") {
            return random_hex(positive_len(len.as_str())?);
        }
        if let (Some(class), Some(len)) = (caps.name("class"), caps.name("str")) {
            let charset = match class.as_str() {
                "letters" => LETTERS,
                "digits" => DIGITS,
                "lettersdigits" => LETTERS_DIGITS,
                _ => return None,
            };
            return Some(random_string(charset, positive_len(len.as_str())?));
        }
        if let (Some(lo), Some(hi)) = (caps.name("seq_lo"), caps.name("seq_hi")) {
            let lo = lo.as_str().parse().ok()?;
            let hi = hi.as_str().parse().ok()?;
            return Some(self.sequences.next(&caps[0], lo, hi).to_string());
        }
        None
    }
}

fn has_marker(template: &str) -> bool {
    template.contains("__RAND") || template.contains("__SEQ_")
}

fn ordered(low: i64, high: i64) -> (i64, i64) {
    if high < low {
        (high, low)
    } else {
        (low, high)
    }
}

fn positive_len(raw: &str) -> Option<usize> {
    raw.parse().ok().filter(|len| *len > 0)
}

fn random_hex(len: usize) -> Option<String> {
    let mut buf = vec![0u8; len.div_ceil(2)];
    OsRng.try_fill_bytes(&mut buf).ok()?;
    let mut out = hex::encode(buf);
    out.truncate(len);
    Some(out)
}

fn random_string(charset: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}
