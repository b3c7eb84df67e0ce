//! Name templates for batch creation.
//!
//! A template carries at most one printf-style integer placeholder:
//! `%d`, `%Nd` (space padded) or `%0Nd` (zero padded). `%%` is a literal
//! percent sign. `web%02d` with a count of 3 expands to `web01`, `web02`,
//! `web03`.

use uuid::Uuid;

use crate::profitbricks_error::{ProfitbricksError, Result};

/// Parsed name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    prefix: String,
    suffix: String,
    placeholder: Option<Placeholder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placeholder {
    width: usize,
    zero_pad: bool,
}

impl NameTemplate {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for unsupported conversions or more than one placeholder.
    pub fn parse(template: &str) -> Result<Self> {
        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut placeholder = None;
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            let out = if placeholder.is_some() {
                &mut suffix
            } else {
                &mut prefix
            };

            if c != '%' {
                out.push(c);
                continue;
            }

            if chars.peek() == Some(&'%') {
                chars.next();
                out.push('%');
                continue;
            }

            let zero_pad = chars.peek() == Some(&'0');
            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }

            if chars.next() != Some('d') {
                return Err(ProfitbricksError::validation(format!(
                    "name '{template}' has an unsupported format conversion, only %d is allowed"
                )));
            }
            if placeholder.is_some() {
                return Err(ProfitbricksError::validation(format!(
                    "name '{template}' has more than one number placeholder"
                )));
            }

            let width = if digits.is_empty() {
                0
            } else {
                digits.parse::<usize>().map_err(|_| {
                    ProfitbricksError::validation(format!("name '{template}' has an invalid width"))
                })?
            };
            placeholder = Some(Placeholder { width, zero_pad });
        }

        Ok(Self {
            prefix,
            suffix,
            placeholder,
        })
    }

    /// Whether the template contains a number placeholder.
    #[must_use]
    pub const fn has_placeholder(&self) -> bool {
        self.placeholder.is_some()
    }

    /// Append a bare `%d` placeholder to a template that has none.
    #[must_use]
    pub fn with_trailing_number(mut self) -> Self {
        if self.placeholder.is_none() {
            self.placeholder = Some(Placeholder {
                width: 0,
                zero_pad: false,
            });
        }
        self
    }

    /// Render the name for `number`.
    #[must_use]
    pub fn render(&self, number: u32) -> String {
        let digits = match self.placeholder {
            Some(Placeholder {
                width,
                zero_pad: true,
            }) => format!("{number:0width$}"),
            Some(Placeholder {
                width,
                zero_pad: false,
            }) => format!("{number:width$}"),
            None => String::new(),
        };
        format!("{}{digits}{}", self.prefix, self.suffix)
    }
}

/// Expand a name (template) into the names of a batch.
///
/// - `auto_increment = false`: the name is used verbatim, once.
/// - placeholder present: numbers `1..=count` are substituted.
/// - no placeholder and `count > 1`: a bare number is appended.
/// - no placeholder and `count == 1`: the name is used as-is.
///
/// # Errors
///
/// Returns a `Validation` error for a zero count or an invalid template.
pub fn expand_names(name: &str, count: u32, auto_increment: bool) -> Result<Vec<String>> {
    if count == 0 {
        return Err(ProfitbricksError::validation("count must be at least 1"));
    }
    if !auto_increment {
        return Ok(vec![name.to_string()]);
    }

    let template = NameTemplate::parse(name)?;
    if !template.has_placeholder() && count == 1 {
        return Ok(vec![template.render(0)]);
    }

    let template = template.with_trailing_number();
    Ok((1..=count).map(|n| template.render(n)).collect())
}

/// Random 10-character name used for generated volumes and NICs.
#[must_use]
pub fn random_name() -> String {
    Uuid::new_v4().simple().to_string().chars().take(10).collect()
}
