// Voucher codes and the patterns used to find them in documents

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Wire-exact code format: two letters, three digits, five digits.
static CODE_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}-[0-9]{3}-[0-9]{5}$").expect("code format regex"));

/// `FOLIO` label followed by a code, as printed on the voucher body.
static LABELED_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)FOLIO[\s:#.]*([A-Z]{2}-[0-9]{3}-[0-9]{5})\b").expect("labeled code regex")
});

/// A code anywhere in free text, not glued to surrounding alphanumerics.
static BARE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Z]{2}-[0-9]{3}-[0-9]{5})\b").expect("bare code regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{input}' does not match the voucher code format AA-000-00000")]
pub struct InvalidCode {
    pub input: String,
}

/// Identifying code of a voucher, always uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoucherCode(String);

impl VoucherCode {
    /// Normalize (trim, uppercase) and validate user-supplied input.
    pub fn parse(input: &str) -> Result<Self, InvalidCode> {
        let normalized = input.trim().to_ascii_uppercase();
        if CODE_FORMAT.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(InvalidCode {
                input: input.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Regex captures already satisfy the format; only case needs fixing.
    fn from_capture(capture: &str) -> Self {
        Self(capture.to_ascii_uppercase())
    }
}

impl fmt::Display for VoucherCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VoucherCode {
    type Err = InvalidCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VoucherCode {
    type Error = InvalidCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VoucherCode> for String {
    fn from(code: VoucherCode) -> Self {
        code.0
    }
}

/// Find a code in document text: labeled occurrence first, then any bare one.
pub fn find_in_text(text: &str) -> Option<VoucherCode> {
    first_capture(&LABELED_TEXT, text).or_else(|| first_capture(&BARE_CODE, text))
}

/// Matcher for visual-code payloads, which are URL-like strings such as
/// `https://host/vale/CP-143-00001`.
#[derive(Debug, Clone)]
pub struct PayloadPattern {
    labeled: Regex,
}

impl PayloadPattern {
    /// `path_fragment` is the path segment that precedes the code, e.g. `/vale/`.
    pub fn new(path_fragment: &str) -> Result<Self, regex::Error> {
        let labeled = Regex::new(&format!(
            r"(?i){}([A-Z]{{2}}-[0-9]{{3}}-[0-9]{{5}})\b",
            regex::escape(path_fragment)
        ))?;
        Ok(Self { labeled })
    }

    pub fn find(&self, payload: &str) -> Option<VoucherCode> {
        first_capture(&self.labeled, payload).or_else(|| first_capture(&BARE_CODE, payload))
    }
}

fn first_capture(pattern: &Regex, haystack: &str) -> Option<VoucherCode> {
    pattern
        .captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| VoucherCode::from_capture(m.as_str()))
}
