// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;

/// Order-preserving view of a cell `style` attribute (`ellipse;rounded=0;html=1;`).
///
/// Bare entries (`ellipse`) are tokens, `key=value` entries are pairs. Re-serializing an
/// unmodified style yields the same entries in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Style {
    entries: Vec<StyleEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleEntry {
    Token(String),
    Pair(String, String),
}

impl Style {
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((key, value)) => StyleEntry::Pair(key.trim().to_owned(), value.to_owned()),
                None => StyleEntry::Token(part.to_owned()),
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[StyleEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find_map(|entry| match entry {
            StyleEntry::Pair(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    /// Bare tokens in order of appearance.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|entry| match entry {
            StyleEntry::Token(token) => Some(token.as_str()),
            StyleEntry::Pair(..) => None,
        })
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.tokens().any(|t| t == token)
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("1" | "true"))
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        for entry in &mut self.entries {
            if let StyleEntry::Pair(k, v) = entry {
                if k == key {
                    *v = value;
                    return;
                }
            }
        }
        self.entries.push(StyleEntry::Pair(key.to_owned(), value));
    }

    pub fn remove(&mut self, key: &str) {
        self.entries
            .retain(|entry| !matches!(entry, StyleEntry::Pair(k, _) if k == key));
    }

    pub fn remove_token(&mut self, token: &str) {
        self.entries
            .retain(|entry| !matches!(entry, StyleEntry::Token(t) if t == token));
    }

    /// Inserts entries at the front, keeping their relative order.
    pub fn prepend(&mut self, entries: impl IntoIterator<Item = StyleEntry>) {
        let mut front: Vec<StyleEntry> = entries.into_iter().collect();
        front.append(&mut self.entries);
        self.entries = front;
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            match entry {
                StyleEntry::Token(token) => write!(f, "{token};")?,
                StyleEntry::Pair(key, value) => write!(f, "{key}={value};")?,
            }
        }
        Ok(())
    }
}
