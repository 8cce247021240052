// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Label text helpers.
//!
//! Cell labels with `html=1` carry markup (`<div>Review<br>order</div>`). The form surface
//! shows and compares the plain text.

use std::sync::OnceLock;

use regex::Regex;

fn markup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)<[a-z/!][^>]*>").expect("valid markup pattern"))
}

fn whitespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

/// Strips markup, decodes the common entities and collapses whitespace.
pub fn plain_text(label: &str) -> String {
    let stripped = markup_pattern().replace_all(label, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    whitespace_pattern()
        .replace_all(decoded.trim(), " ")
        .into_owned()
}

/// Key used to compare step names: plain text, case-insensitive.
pub fn name_key(label: &str) -> String {
    plain_text(label).to_lowercase()
}
