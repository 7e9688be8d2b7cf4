//! Validation of the pieces of prefixed names used by the RDF text syntaxes:
//! SPARQL variables, QName prefixes and local parts, and blank node labels.
//!
//! Each kind of name is an XML 1.1 `Name` with a set of relaxations layered
//! on top of it.

/// Which kind of name is being checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NameCheck {
    VarName,
    QNamePrefix,
    QNameLocal,
    Blank,
}

#[derive(derive_more::Error, derive_more::Display, Debug, PartialEq, Eq)]
pub enum NameCheckError {
    #[display("cannot check an empty name")]
    Empty,

    #[display("unknown name check {_0}")]
    UnknownCheck(#[error(not(source))] i32),
}

impl TryFrom<i32> for NameCheck {
    type Error = NameCheckError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NameCheck::VarName),
            1 => Ok(NameCheck::QNamePrefix),
            2 => Ok(NameCheck::QNameLocal),
            3 => Ok(NameCheck::Blank),
            other => Err(NameCheckError::UnknownCheck(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Allow(u8);

impl Allow {
    const DIGIT_FIRST: Allow = Allow(1);
    const MINUS_REST: Allow = Allow(2);
    const DOT_REST: Allow = Allow(4);
    const UNDERSCORE_FIRST: Allow = Allow(8);
    const COLON: Allow = Allow(16);
    const HEX: Allow = Allow(32);
    const EXTRA_UNICODE: Allow = Allow(64);
    const BACKSLASH_ESCAPE: Allow = Allow(128);

    const fn union(self, other: Allow) -> Allow {
        Allow(self.0 | other.0)
    }

    fn contains(self, other: Allow) -> bool {
        self.0 & other.0 == other.0
    }
}

impl NameCheck {
    fn allowed(self) -> Allow {
        match self {
            NameCheck::VarName => Allow::DIGIT_FIRST
                .union(Allow::UNDERSCORE_FIRST)
                .union(Allow::EXTRA_UNICODE),
            NameCheck::QNamePrefix => Allow::MINUS_REST
                .union(Allow::DOT_REST)
                .union(Allow::EXTRA_UNICODE),
            NameCheck::QNameLocal => Allow::DIGIT_FIRST
                .union(Allow::MINUS_REST)
                .union(Allow::DOT_REST)
                .union(Allow::COLON)
                .union(Allow::HEX)
                .union(Allow::EXTRA_UNICODE)
                .union(Allow::BACKSLASH_ESCAPE),
            NameCheck::Blank => Allow::DIGIT_FIRST
                .union(Allow::MINUS_REST)
                .union(Allow::DOT_REST)
                .union(Allow::EXTRA_UNICODE),
        }
    }
}

const ESCAPABLE: &str = "_~.-!$&'()*+,;=/?#@%";

/// Checks `name` (UTF-8 bytes) against the rules for `check`.
///
/// Invalid UTF-8 makes the name invalid; only an empty input is an error.
pub fn prefixed_name_check(name: &[u8], check: NameCheck) -> Result<bool, NameCheckError> {
    if name.is_empty() {
        return Err(NameCheckError::Empty);
    }

    let Ok(name) = std::str::from_utf8(name) else {
        return Ok(false);
    };

    Ok(check_chars(name, check.allowed()))
}

fn check_chars(name: &str, allow: Allow) -> bool {
    let mut chars = name.chars();
    let mut first = true;
    let mut last = '\0';

    while let Some(c) = chars.next() {
        let at_start = std::mem::replace(&mut first, false);
        last = c;

        if c == '\\' {
            if !allow.contains(Allow::BACKSLASH_ESCAPE) {
                return false;
            }
            match chars.next() {
                Some(escaped) if ESCAPABLE.contains(escaped) => last = escaped,
                _ => return false,
            }
            continue;
        }

        if c == ':' {
            if !allow.contains(Allow::COLON) {
                return false;
            }
            continue;
        }

        if c == '%' {
            if !allow.contains(Allow::HEX) {
                return false;
            }
            for _ in 0..2 {
                match chars.next() {
                    Some(hex) if hex.is_ascii_hexdigit() => last = hex,
                    _ => return false,
                }
            }
            continue;
        }

        let allowed = if at_start {
            if c.is_ascii_digit() {
                allow.contains(Allow::DIGIT_FIRST)
            } else if c == '_' {
                allow.contains(Allow::UNDERSCORE_FIRST)
            } else {
                is_name_start_char(c)
            }
        } else if matches!(c, '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}') {
            allow.contains(Allow::EXTRA_UNICODE)
        } else if c == '.' {
            allow.contains(Allow::DOT_REST)
        } else if c == '-' {
            allow.contains(Allow::MINUS_REST)
        } else {
            is_name_char(c)
        };

        if !allowed {
            return false;
        }
    }

    // a name never ends with a dot, escaped or otherwise
    last != '.'
}

fn is_name_start_char(c: char) -> bool {
    let mut buf = [0; 4];
    rxml_validation::validate_name(c.encode_utf8(&mut buf)).is_ok()
}

fn is_name_char(c: char) -> bool {
    let name: String = ['a', c].into_iter().collect();
    rxml_validation::validate_name(&name).is_ok()
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    fn check(name: &str, kind: NameCheck) -> bool {
        prefixed_name_check(name.as_bytes(), kind).unwrap()
    }

    #[rstest]
    #[case("foo", true)]
    #[case("1abc", true)]
    #[case("_x", true)]
    #[case("a.b", false)]
    #[case("a-b", false)]
    #[case("a\u{B7}b", true)]
    #[case("a:b", false)]
    fn variable_names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(check(name, NameCheck::VarName), valid, "{name}");
    }

    #[rstest]
    #[case("ex", true)]
    #[case("ex.ns", true)]
    #[case("ex-ns", true)]
    #[case("ex.", false)]
    #[case("1ex", false)]
    #[case("_ex", false)]
    #[case("-ex", false)]
    #[case("\u{E9}t\u{E9}", true)]
    fn qname_prefixes(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(check(name, NameCheck::QNamePrefix), valid, "{name}");
    }

    #[rstest]
    #[case("local", true)]
    #[case("1local", true)]
    #[case("a:b", true)]
    #[case("a%20b", true)]
    #[case("a%2", false)]
    #[case("a%zz", false)]
    #[case("a\\~b", true)]
    #[case("a\\xb", false)]
    #[case("trailing\\", false)]
    #[case("a.b", true)]
    #[case("ab.", false)]
    #[case("ab\\.", false)]
    #[case(":start", true)]
    fn qname_locals(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(check(name, NameCheck::QNameLocal), valid, "{name}");
    }

    #[rstest]
    #[case("b0", true)]
    #[case("0", true)]
    #[case("_b", false)]
    #[case("b-1.x", true)]
    #[case("b.", false)]
    #[case("b\\-", false)]
    fn blank_node_labels(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(check(name, NameCheck::Blank), valid, "{name}");
    }

    #[test]
    fn empty_name_is_an_error() {
        assert_eq!(
            prefixed_name_check(b"", NameCheck::Blank),
            Err(NameCheckError::Empty)
        );
    }

    #[test]
    fn invalid_utf8_is_invalid() {
        assert_eq!(
            prefixed_name_check(b"ab\xFF", NameCheck::VarName),
            Ok(false)
        );
    }

    #[test]
    fn unknown_check_is_an_error() {
        assert_eq!(
            NameCheck::try_from(7),
            Err(NameCheckError::UnknownCheck(7))
        );
        assert_eq!(NameCheck::try_from(2), Ok(NameCheck::QNameLocal));
    }
}
