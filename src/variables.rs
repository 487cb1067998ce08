//! Variable table for descriptor placeholder substitution
//!
//! Descriptors declare variables in a `<Variables>` block:
//!
//! ```xml
//! <Variables>
//!   <Variable Name="ModName" Value="MyMod"/>
//!   <Variable Name="Dist" Value="@ModName\dist"/>
//! </Variables>
//! ```
//!
//! and reference them anywhere as `@Name`. At each `@`, the longest declared
//! name that prefixes the following text is replaced; an `@` that does not
//! start a declared name is kept as-is.
//!
//! # Example
//!
//! ```
//! use pyro::variables::VariableTable;
//!
//! let table = VariableTable::from_declarations([
//!     ("Root", "C:\\Mods"),
//!     ("Mod", "@Root\\MyMod"),
//! ])
//! .unwrap();
//!
//! assert_eq!(table.substitute("@Mod\\Scripts"), "C:\\Mods\\MyMod\\Scripts");
//! ```

use std::collections::HashMap;
use thiserror::Error;

/// Characters a variable value may not contain.
pub const RESERVED_CHARACTERS: &[char] = &['!', '#', '$', '%', '^', '&', '*'];

/// Placeholder sigil.
pub const SIGIL: char = '@';

/// Error type for variable declarations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum VariableError {
    /// Name is empty or contains non-alphanumeric characters
    #[error("The name of the variable \"{0}\" must be an alphanumeric string.")]
    InvalidName(String),
    /// Value contains a reserved character
    #[error("The value of the variable \"{name}\" contains a reserved character: {value}")]
    InvalidValue {
        /// Variable name
        name: String,
        /// Offending raw value
        value: String,
    },
    /// A variable was declared twice
    #[error("The variable \"{0}\" is declared more than once")]
    Duplicate(String),
}

/// A declared variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Declared name (without the sigil)
    pub name: String,
    /// Value as written in the descriptor
    pub raw: String,
    /// Value after both substitution passes
    pub resolved: String,
}

/// Resolved set of declared variables, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    variables: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl VariableTable {
    /// Create an empty table. Substitution is the identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and resolve a list of `(name, raw value)` declarations.
    ///
    /// Values are substituted in declaration order against the variables
    /// declared before them, then once more in reverse order against the full
    /// table, so an earlier variable may reference a later one. Name lookup
    /// always considers every declared name. Circular references are not
    /// detected; they remain as placeholders (see [`is_fully_resolved`]).
    ///
    /// [`is_fully_resolved`]: VariableTable::is_fully_resolved
    pub fn from_declarations<I, N, V>(declarations: I) -> Result<Self, VariableError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let mut table = Self::new();

        for (name, raw) in declarations {
            let (name, raw) = (name.into(), raw.into());
            validate_name(&name)?;
            if raw.contains(RESERVED_CHARACTERS) {
                return Err(VariableError::InvalidValue { name, value: raw });
            }
            if table.index.contains_key(&name) {
                return Err(VariableError::Duplicate(name));
            }
            table.index.insert(name.clone(), table.variables.len());
            table.variables.push(Variable { name, resolved: raw.clone(), raw });
        }

        // Every name is known up front so a reference to a later variable is
        // never mistaken for an earlier, shorter one.
        for i in 0..table.variables.len() {
            let resolved = table.substitute_before(&table.variables[i].raw, i);
            table.variables[i].resolved = resolved;
        }
        for i in (0..table.variables.len()).rev() {
            let resolved = table.substitute(&table.variables[i].resolved);
            table.variables[i].resolved = resolved;
        }

        Ok(table)
    }

    /// Replace every `@Name` reference in `text` with its resolved value.
    ///
    /// Applying this to already-substituted text returns it unchanged unless a
    /// resolved value itself still carries a placeholder.
    pub fn substitute(&self, text: &str) -> String {
        self.substitute_before(text, self.variables.len())
    }

    /// Substitute only variables declared before position `limit`; references
    /// to the others are kept verbatim.
    fn substitute_before(&self, text: &str, limit: usize) -> String {
        if self.variables.is_empty() || !text.contains(SIGIL) {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(at) = rest.find(SIGIL) {
            out.push_str(&rest[..at]);
            let after = &rest[at + SIGIL.len_utf8()..];
            match self.longest_match(after) {
                Some((i, var)) => {
                    if i < limit {
                        out.push_str(&var.resolved);
                    } else {
                        out.push(SIGIL);
                        out.push_str(&var.name);
                    }
                    rest = &after[var.name.len()..];
                }
                None => {
                    out.push(SIGIL);
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Whether `text` holds no reference to a declared variable.
    pub fn is_fully_resolved(&self, text: &str) -> bool {
        text.match_indices(SIGIL)
            .all(|(at, _)| self.longest_match(&text[at + SIGIL.len_utf8()..]).is_none())
    }

    /// Variables whose resolved value still carries a placeholder.
    pub fn unresolved(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|v| !self.is_fully_resolved(&v.resolved))
    }

    /// Resolved value of a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.index.get(name).map(|&i| self.variables[i].resolved.as_str())
    }

    /// Declared variables in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    /// Name to resolved value mapping.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.variables.iter().map(|v| (v.name.clone(), v.resolved.clone())).collect()
    }

    /// Number of declared variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Check if no variables are declared
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    fn longest_match(&self, text: &str) -> Option<(usize, &Variable)> {
        let candidate_len = text.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(text.len());
        (1..=candidate_len)
            .rev()
            .find_map(|len| self.index.get(&text[..len]))
            .map(|&i| (i, &self.variables[i]))
    }
}

fn validate_name(name: &str) -> Result<(), VariableError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(VariableError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_substitution() {
        let table = VariableTable::from_declarations([("Game", "C:\\Fallout 4")]).unwrap();
        assert_eq!(table.substitute("@Game\\Data"), "C:\\Fallout 4\\Data");
    }

    #[test]
    fn test_forward_reference() {
        let table =
            VariableTable::from_declarations([("Root", "/mods"), ("Mod", "@Root/MyMod")]).unwrap();
        assert_eq!(table.get("Mod"), Some("/mods/MyMod"));
    }

    #[test]
    fn test_backward_reference_resolved_by_reverse_pass() {
        let table =
            VariableTable::from_declarations([("Mod", "@Root/MyMod"), ("Root", "/mods")]).unwrap();
        assert_eq!(table.get("Mod"), Some("/mods/MyMod"));
        assert_eq!(table.unresolved().count(), 0);
    }

    #[test]
    fn test_longest_name_wins() {
        let table =
            VariableTable::from_declarations([("Mod", "short"), ("ModName", "long")]).unwrap();
        assert_eq!(table.substitute("@ModName-@Mod"), "long-short");
    }

    #[test]
    fn test_later_longer_name_not_shadowed_by_earlier_prefix() {
        let table = VariableTable::from_declarations([
            ("Mod", "X"),
            ("Path", "@ModName\\Scripts"),
            ("ModName", "Y"),
        ])
        .unwrap();
        assert_eq!(table.get("Path"), Some("Y\\Scripts"));
        assert_eq!(table.unresolved().count(), 0);
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        let table = VariableTable::from_declarations([("Mod", "x")]).unwrap();
        assert_eq!(table.substitute("user@example @Other"), "user@example @Other");
    }

    #[test]
    fn test_substitution_is_idempotent() {
        let table =
            VariableTable::from_declarations([("A", "@B/one"), ("B", "two"), ("C", "@A/three")])
                .unwrap();
        let once = table.substitute("@C and @A");
        assert_eq!(once, "two/one/three and two/one");
        assert_eq!(table.substitute(&once), once);
    }

    #[test]
    fn test_rejects_non_alphanumeric_name() {
        for name in ["Mod Name", "Mod-Name", "", "Mod_Name"] {
            let err = VariableTable::from_declarations([(name, "x")]).unwrap_err();
            assert_eq!(err, VariableError::InvalidName(name.to_string()));
        }
    }

    #[test]
    fn test_rejects_reserved_characters_in_value() {
        for c in RESERVED_CHARACTERS {
            let value = format!("a{}b", c);
            let err = VariableTable::from_declarations([("Name", value.as_str())]).unwrap_err();
            assert!(matches!(err, VariableError::InvalidValue { .. }), "char {}", c);
        }
    }

    #[test]
    fn test_rejects_duplicate() {
        let err = VariableTable::from_declarations([("A", "1"), ("A", "2")]).unwrap_err();
        assert_eq!(err, VariableError::Duplicate("A".to_string()));
    }

    #[test]
    fn test_cycle_left_unresolved() {
        let table = VariableTable::from_declarations([("A", "@B"), ("B", "@A")]).unwrap();
        let unresolved: Vec<_> = table.unresolved().map(|v| v.name.as_str()).collect();
        assert!(!unresolved.is_empty());
        assert!(!table.is_fully_resolved(table.get("A").unwrap()));
    }

    #[test]
    fn test_empty_table_is_identity() {
        let table = VariableTable::new();
        assert_eq!(table.substitute("@Anything"), "@Anything");
        assert!(table.is_fully_resolved("@Anything"));
    }
}
