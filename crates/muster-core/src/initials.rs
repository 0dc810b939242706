//! Operating-initials assignment.
//!
//! Initials identify a person within one facility's roster. When a person
//! joins a roster without explicit initials, [`assign`] picks them
//! deterministically from the person's record and the initials already in use:
//!
//! 1. the person's preferred initials;
//! 2. first letter of first name + first letter of last name;
//! 3. the step-2 initials followed by the smallest free number (`JD1`, `JD2`, …).

use std::collections::HashSet;

use crate::{Error, Result, person::Person};

/// Pick initials for `person` that do not appear in `taken`.
///
/// `taken` must contain the initials of the facility's live memberships.
pub fn assign<'a, I>(person: &Person, taken: I) -> String
where
  I: IntoIterator<Item = &'a str>,
{
  let taken: HashSet<&str> = taken.into_iter().collect();

  let preferred = person.preferred_initials.trim().to_ascii_uppercase();
  if !preferred.is_empty() && !taken.contains(preferred.as_str()) {
    return preferred;
  }

  let from_name = name_initials(person);
  if !taken.contains(from_name.as_str()) {
    return from_name;
  }

  let mut n = 1u32;
  loop {
    let candidate = format!("{from_name}{n}");
    if !taken.contains(candidate.as_str()) {
      return candidate;
    }
    n += 1;
  }
}

/// First letter of each name. Anything but an ASCII letter becomes `X` so
/// the result always passes [`normalize`].
fn name_initials(person: &Person) -> String {
  let first = |name: &str| match name.trim().chars().next() {
    Some(c) if c.is_ascii_alphabetic() => c.to_ascii_uppercase(),
    _ => 'X',
  };
  [first(&person.first_name), first(&person.last_name)]
    .into_iter()
    .collect()
}

/// Normalise manually supplied initials: trimmed, upper-cased, 2–4 ASCII
/// letters or digits, starting with a letter.
pub fn normalize(initials: &str) -> Result<String> {
  let normalized = initials.trim().to_ascii_uppercase();
  let valid = (2..=4).contains(&normalized.len())
    && normalized.starts_with(|c: char| c.is_ascii_uppercase())
    && normalized
      .bytes()
      .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
  if valid {
    Ok(normalized)
  } else {
    Err(Error::InvalidInitials(initials.to_owned()))
  }
}
