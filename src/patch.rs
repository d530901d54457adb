//! Patching of string-encoded lists.
//!
//! Two list shapes are supported: flat string sets (group memberships, keys)
//! and ordered `key:value` lists (untyped metadata). Keys may carry a
//! trailing ordinal such as `mail{0}`, `mail{1}` to express LDAP-style
//! ranked values; fuzzy matching ignores that ordinal.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::errors::OrreryError;

static ORDINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\d+\}$").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    Upsert,
    ClearFuzzy,
    ClearExact,
    Read,
}

impl PatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchMode::Upsert => "UPSERT",
            PatchMode::ClearFuzzy => "CLEARFUZZY",
            PatchMode::ClearExact => "CLEAREXACT",
            PatchMode::Read => "READ",
        }
    }
}

impl fmt::Display for PatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatchMode {
    type Err = OrreryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UPSERT" => Ok(PatchMode::Upsert),
            "CLEARFUZZY" => Ok(PatchMode::ClearFuzzy),
            "CLEAREXACT" => Ok(PatchMode::ClearExact),
            "READ" => Ok(PatchMode::Read),
            _ => Err(OrreryError::InvalidMode(s.to_string())),
        }
    }
}

/// The key portion of a `key:value` entry. An entry without `:` is all key.
pub fn entry_key(entry: &str) -> &str {
    entry.split(':').next().unwrap_or(entry)
}

/// Split a `key:value` entry, failing when there is no separator.
pub fn split_entry(entry: &str) -> Result<(&str, &str), OrreryError> {
    entry.split_once(':').ok_or_else(|| {
        OrreryError::MalformedRequest(format!("`{entry}` is not a key:value entry"))
    })
}

fn strip_ordinal(key: &str) -> &str {
    match ORDINAL.find(key) {
        Some(m) => &key[..m.start()],
        None => key,
    }
}

/// Apply a patch to an ordered `key:value` list.
///
/// Mutating modes return the list deduplicated and sorted; `Read` returns the
/// matching entries sorted and never modifies the input.
pub fn patch_key_values(entries: &[String], mode: PatchMode, key: &str, value: &str) -> Vec<String> {
    match mode {
        PatchMode::Upsert => {
            let replacement = format!("{key}:{value}");
            let mut inserted = false;
            let mut out: Vec<String> = entries
                .iter()
                .map(|e| {
                    if entry_key(e) == key {
                        inserted = true;
                        replacement.clone()
                    } else {
                        e.clone()
                    }
                })
                .collect();
            if !inserted {
                out.push(replacement);
            }
            dedup_strings(out)
        }
        PatchMode::ClearFuzzy => {
            let stripped = strip_ordinal(key);
            dedup_strings(
                entries
                    .iter()
                    .filter(|e| strip_ordinal(entry_key(e)) != stripped)
                    .cloned(),
            )
        }
        PatchMode::ClearExact => dedup_strings(
            entries
                .iter()
                .filter(|e| entry_key(e) != key)
                .cloned(),
        ),
        PatchMode::Read => {
            let mut out: Vec<String> = if key == "*" {
                entries.to_vec()
            } else {
                let stripped = strip_ordinal(key);
                entries
                    .iter()
                    .filter(|e| strip_ordinal(entry_key(e)) == stripped)
                    .cloned()
                    .collect()
            };
            out.sort();
            out
        }
    }
}

/// String-mode front end: the mode is parsed first and rejected with
/// `InvalidMode` if unrecognized.
pub fn patch(entries: &[String], mode: &str, key: &str, value: &str) -> Result<Vec<String>, OrreryError> {
    let mode: PatchMode = mode.parse()?;
    Ok(patch_key_values(entries, mode, key, value))
}

/// Insert or remove `item` in a flat string set.
///
/// With `exact` the match is string equality, otherwise any entry containing
/// `item` matches. Inserting an already matched item is a no-op; removing
/// drops every matching entry. The result is deduplicated and sorted.
pub fn patch_string_set(entries: &[String], item: &str, insert: bool, exact: bool) -> Vec<String> {
    let matches = |s: &str| if exact { s == item } else { s.contains(item) };

    let mut present = false;
    let mut out = Vec::with_capacity(entries.len() + 1);
    for e in entries {
        if matches(e) {
            if !insert {
                continue;
            }
            present = true;
        }
        out.push(e.clone());
    }
    if insert && !present {
        out.push(item.to_string());
    }
    dedup_strings(out)
}

/// Deduplicate by exact match, dropping empty strings, in sorted order.
pub fn dedup_strings<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    items
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
