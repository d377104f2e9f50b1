// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package dependency expression handling.

Dependencies come in one of two canonical forms: `name` and `name (op version)`.
Expressions in other forms, such as `name op version` or gem-style pessimistic
constraints, are rewritten into the canonical form. Normalization never fails:
anything that can't be understood passes through.

See <https://www.debian.org/doc/debian-policy/ch-relationships.html> for the
relationship syntax.
*/

use {once_cell::sync::Lazy, regex::Regex};

/// A single dependency in canonical or near-canonical form.
static RE_DEPENDS_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^ ]+)(?: \(([>=<]+) ([^)]+)\))?$").unwrap());

/// Separator between entries of a `Depends` field.
static RE_DEPENDS_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r", *").unwrap());

/// The package name at the start of an expression.
static RE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^ (]+").unwrap());

static RE_NOT_EQUAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\S+)\s+\(!= (.+)\)").unwrap());

static RE_EQUAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\S+)\s+\(= (.+)\)").unwrap());

/// Result of normalizing a single dependency expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DependencyRewrite {
    /// The expression becomes zero or more direct dependencies.
    Depends(Vec<String>),

    /// The expression is a negative constraint and becomes a conflict.
    Conflicts(String),
}

/// Rewrite relational operators to their Debian spelling.
///
/// Debian operators are `<<`, `<=`, `=`, `>=` and `>>`. Strict `<` and `>` are
/// doubled. Everything else is returned as is.
pub fn debianize_op(op: &str) -> &str {
    match op {
        "<" => "<<",
        ">" => ">>",
        _ => op,
    }
}

/// Split a `Depends` field value into its entries.
///
/// Entries of the form `name (op version)` are canonicalized for whitespace.
/// Other entries are retained as is.
pub fn parse_depends(data: &str) -> Vec<String> {
    if data.is_empty() {
        return vec![];
    }

    RE_DEPENDS_SEPARATOR
        .split(data)
        .map(|dep| match RE_DEPENDS_ENTRY.captures(dep) {
            Some(caps) => match (caps.get(2), caps.get(3)) {
                (Some(op), Some(version)) => format!(
                    "{} ({} {})",
                    &caps[1],
                    op.as_str(),
                    version.as_str()
                )
                .trim()
                .to_string(),
                _ => caps[1].trim().to_string(),
            },
            None => dep.to_string(),
        })
        .collect()
}

/// Normalize a dependency expression.
///
/// `ignore_iteration` rewrites exact `= V` constraints into a range admitting
/// any iteration of `V`.
pub fn normalize_dependency_expression(dep: &str, ignore_iteration: bool) -> DependencyRewrite {
    let mut dep = dep.to_string();

    // Expressions containing these are already well formed or compound.
    if !dep.contains(&['(', ',', '|'][..]) {
        let parts = dep.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>();

        if let [name, op, version, ..] = parts.as_slice() {
            dep = format!("{} ({} {})", name, debianize_op(op), version);
        }
    }

    if let Some(m) = RE_NAME.find(&dep) {
        if m.as_str().chars().any(|c| c.is_uppercase()) {
            dep = format!("{}{}", m.as_str().to_lowercase(), &dep[m.end()..]);
        }
    }

    let dep = dep.replace('_', "-");

    if dep.contains("(~>") {
        let stripped = dep.replace(&['(', ')', '~', '>'][..], "");
        let mut words = stripped.split(' ').filter(|s| !s.is_empty());

        if let (Some(name), Some(version)) = (words.next(), words.next()) {
            return DependencyRewrite::Depends(vec![
                format!("{} (>= {})", name, version),
                format!("{} (<< {})", name, pessimistic_upper_bound(version)),
            ]);
        }

        DependencyRewrite::Depends(vec![dep.trim_end().to_string()])
    } else if RE_NOT_EQUAL.is_match(&dep) {
        DependencyRewrite::Conflicts(dep.replace("!=", "="))
    } else if let Some(caps) = RE_EQUAL.captures(&dep).filter(|_| ignore_iteration) {
        let name = &caps[1];
        let version = &caps[2];

        let mut next = numeric_components(version);
        if let Some(last) = next.last_mut() {
            *last = increment_decimal(last);
        }

        DependencyRewrite::Depends(vec![
            format!("{} (>= {})", name, version),
            format!("{} (<< {})", name, join_components(&next)),
        ])
    } else {
        DependencyRewrite::Depends(vec![dep.trim_end().to_string()])
    }
}

/// Upper bound of a `~> X` constraint.
///
/// The second-to-last component is incremented and the last component zeroed.
/// A single component version has that component incremented.
fn pessimistic_upper_bound(version: &str) -> String {
    let mut next = numeric_components(version);

    match next.len() {
        0 => {}
        1 => next[0] = increment_decimal(&next[0]),
        len => {
            next[len - 2] = increment_decimal(&next[len - 2]);
            next[len - 1] = "0".to_string();
        }
    }

    join_components(&next)
}

/// Split a dotted version into numeric components.
///
/// Each component evaluates to its leading digits without leading zeros, or `0`
/// when there are none. Components are kept as decimal strings so arbitrarily
/// large numbers survive.
fn numeric_components(version: &str) -> Vec<String> {
    version
        .split('.')
        .map(|part| {
            let digits = part
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .skip_while(|c| *c == '0')
                .collect::<String>();

            if digits.is_empty() {
                "0".to_string()
            } else {
                digits
            }
        })
        .collect()
}

/// Add one to a string of ASCII decimal digits.
fn increment_decimal(digits: &str) -> String {
    let mut out = digits.as_bytes().to_vec();

    for b in out.iter_mut().rev() {
        if *b == b'9' {
            *b = b'0';
        } else {
            *b += 1;
            return String::from_utf8_lossy(&out).into_owned();
        }
    }

    out.insert(0, b'1');
    String::from_utf8_lossy(&out).into_owned()
}

fn join_components(components: &[String]) -> String {
    components.join(".")
}

#[cfg(test)]
mod test {
    use super::*;

    fn depends(values: &[&str]) -> DependencyRewrite {
        DependencyRewrite::Depends(values.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn parse_depends_entries() {
        assert!(parse_depends("").is_empty());
        assert_eq!(
            parse_depends("libc6 (>= 2.14), zlib1g,curl (<< 8)"),
            vec!["libc6 (>= 2.14)", "zlib1g", "curl (<< 8)"]
        );
        assert_eq!(
            parse_depends("foo | bar, baz >= 1.0"),
            vec!["foo | bar", "baz >= 1.0"]
        );
    }

    #[test]
    fn name_op_version_is_parenthesized() {
        assert_eq!(
            normalize_dependency_expression("foo >= 1.0", false),
            depends(&["foo (>= 1.0)"])
        );
        assert_eq!(
            normalize_dependency_expression("foo < 1.0", false),
            depends(&["foo (<< 1.0)"])
        );
        assert_eq!(
            normalize_dependency_expression("foo > 1.0", false),
            depends(&["foo (>> 1.0)"])
        );
        assert_eq!(
            normalize_dependency_expression("foo <= 1.0", false),
            depends(&["foo (<= 1.0)"])
        );
    }

    #[test]
    fn name_is_lowercased_and_underscores_replaced() {
        assert_eq!(
            normalize_dependency_expression("Foo_Bar", false),
            depends(&["foo-bar"])
        );
        assert_eq!(
            normalize_dependency_expression("Foo (>= 1.0_RC1)", false),
            depends(&["foo (>= 1.0-RC1)"])
        );
    }

    #[test]
    fn pessimistic_constraint() {
        assert_eq!(
            normalize_dependency_expression("foo (~> 1.2.3)", false),
            depends(&["foo (>= 1.2.3)", "foo (<< 1.3.0)"])
        );
        assert_eq!(
            normalize_dependency_expression("foo ~> 1.2", false),
            depends(&["foo (>= 1.2)", "foo (<< 2.0)"])
        );
        assert_eq!(
            normalize_dependency_expression("foo (~> 2)", false),
            depends(&["foo (>= 2)", "foo (<< 3)"])
        );
    }

    #[test]
    fn bounds_beyond_machine_integers() {
        assert_eq!(
            normalize_dependency_expression("foo (~> 18446744073709551615.0)", false),
            depends(&[
                "foo (>= 18446744073709551615.0)",
                "foo (<< 18446744073709551616.0)"
            ])
        );
        assert_eq!(
            normalize_dependency_expression("foo (= 18446744073709551615)", true),
            depends(&[
                "foo (>= 18446744073709551615)",
                "foo (<< 18446744073709551616)"
            ])
        );
        assert_eq!(
            normalize_dependency_expression("foo (~> 1.99.4)", false),
            depends(&["foo (>= 1.99.4)", "foo (<< 1.100.0)"])
        );
        assert_eq!(
            normalize_dependency_expression("foo (= 1.09)", true),
            depends(&["foo (>= 1.09)", "foo (<< 1.10)"])
        );
    }

    #[test]
    fn not_equal_becomes_conflict() {
        assert_eq!(
            normalize_dependency_expression("foo (!= 1.0)", false),
            DependencyRewrite::Conflicts("foo (= 1.0)".to_string())
        );
    }

    #[test]
    fn exact_version_with_ignored_iteration() {
        assert_eq!(
            normalize_dependency_expression("foo (= 1.2.3)", true),
            depends(&["foo (>= 1.2.3)", "foo (<< 1.2.4)"])
        );
        assert_eq!(
            normalize_dependency_expression("foo (= 1.2.3)", false),
            depends(&["foo (= 1.2.3)"])
        );
    }

    #[test]
    fn other_forms_pass_through() {
        assert_eq!(
            normalize_dependency_expression("foo (>= 1.0)  ", false),
            depends(&["foo (>= 1.0)"])
        );
        assert_eq!(
            normalize_dependency_expression("foo | bar", false),
            depends(&["foo | bar"])
        );
        assert_eq!(
            normalize_dependency_expression("foo bar", false),
            depends(&["foo bar"])
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        for dep in ["foo (>= 1.2.3)", "foo (<< 1.3.0)", "bar"] {
            assert_eq!(
                normalize_dependency_expression(dep, true),
                depends(&[dep])
            );
        }
    }
}
