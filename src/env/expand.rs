//! Order-sensitive expansion of environment declarations
//!
//! Declarations are resolved in a single forward pass. Each value may only
//! reference keys that are already present in the working map at the moment it
//! is processed: the base context plus every declaration before it. Its own key
//! and anything declared later resolve to the empty string, so self references
//! and reference cycles collapse to empty values instead of erroring.
//!
//! ```
//! use stepline::env::{expand, EnvironmentEntry};
//!
//! let declarations = vec![
//!     EnvironmentEntry::new("B", "iPhone 8 ($os)"),
//!     EnvironmentEntry::new("os", "13.3"),
//!     EnvironmentEntry::new("C", "iPhone 8 ($os)"),
//! ];
//! let snapshot = expand(&declarations, Vec::<(String, String)>::new());
//!
//! assert_eq!(snapshot.get("B"), Some("iPhone 8 ()"));
//! assert_eq!(snapshot.get("C"), Some("iPhone 8 (13.3)"));
//! ```

use super::entry::EnvironmentEntry;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Matches `${NAME}` (group 1) or `$NAME` (group 2)
static REFERENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("Valid regex pattern")
});

/// Final key/value state of an expansion pass
///
/// Keeps the last value per key in first-declaration order. Keys declared
/// sensitive stay readable through [`EnvironmentSnapshot::get`] for later
/// passes but never appear in [`EnvironmentSnapshot::visible`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    values: IndexMap<String, String>,
    sensitive: HashSet<String>,
}

impl EnvironmentSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a snapshot from a base context such as the host process environment
    pub fn from_base<I, K, V>(base: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: base
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            sensitive: HashSet::new(),
        }
    }

    /// Apply a batch of declarations on top of the current state
    pub fn apply(&mut self, declarations: &[EnvironmentEntry]) {
        for entry in declarations {
            let resolved = if entry.options.is_expand {
                expand_value(&entry.value, &self.values)
            } else {
                entry.value.clone()
            };

            if entry.options.skip_if_empty && resolved.is_empty() {
                trace!("Skipping empty value for {}", entry.key);
                continue;
            }

            self.values.insert(entry.key.clone(), resolved);
            if entry.options.is_sensitive {
                self.sensitive.insert(entry.key.clone());
            }
        }
    }

    /// Read a value, sensitive or not
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        self.sensitive.contains(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Externally visible view with sensitive keys removed
    pub fn visible(&self) -> IndexMap<String, String> {
        self.values
            .iter()
            .filter(|(key, _)| !self.sensitive.contains(*key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Non-empty values of sensitive keys, used for output redaction
    pub fn sensitive_values(&self) -> Vec<&str> {
        self.values
            .iter()
            .filter(|(key, value)| self.sensitive.contains(*key) && !value.is_empty())
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Full environment handed to a step process, sensitive values included
    pub fn to_process_env(&self) -> HashMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Expand a batch of declarations against a base context
pub fn expand<I, K, V>(declarations: &[EnvironmentEntry], base: I) -> EnvironmentSnapshot
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut snapshot = EnvironmentSnapshot::from_base(base);
    snapshot.apply(declarations);
    snapshot
}

/// Substitute `$NAME` and `${NAME}` references; unknown names become empty
///
/// Substituted text is not scanned again, so a value containing `$` is inserted
/// verbatim.
pub fn expand_value(raw: &str, lookup: &IndexMap<String, String>) -> String {
    if !raw.contains('$') {
        return raw.to_string();
    }

    REFERENCE_REGEX
        .replace_all(raw, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup.get(name).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Expanded inputs of a single step
#[derive(Debug, Clone)]
pub struct StepInputs {
    keys: Vec<String>,
    environment: EnvironmentSnapshot,
}

impl StepInputs {
    /// Value of an input (sensitive inputs included)
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.keys.iter().any(|k| k == key) {
            self.environment.get(key)
        } else {
            None
        }
    }

    /// Declared input keys in declaration order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Input values without sensitive ones
    pub fn visible(&self) -> IndexMap<String, String> {
        self.keys
            .iter()
            .filter(|key| !self.environment.is_sensitive(key))
            .filter_map(|key| {
                self.environment
                    .get(key)
                    .map(|value| (key.clone(), value.to_string()))
            })
            .collect()
    }

    /// Working environment after the inputs were applied
    pub fn environment(&self) -> &EnvironmentSnapshot {
        &self.environment
    }

    /// Keys of required inputs that resolved to nothing
    pub fn missing_required(&self, declarations: &[EnvironmentEntry]) -> Vec<String> {
        declarations
            .iter()
            .filter(|entry| entry.options.is_required)
            .filter(|entry| self.environment.get(&entry.key).unwrap_or_default().is_empty())
            .map(|entry| entry.key.clone())
            .collect()
    }
}

/// Expand step inputs on top of the cumulative run environment
///
/// The run environment is cloned, so input declarations never leak into the
/// environment of later steps.
pub fn expand_step_inputs(
    inputs: &[EnvironmentEntry],
    environment: &EnvironmentSnapshot,
) -> StepInputs {
    let mut working = environment.clone();
    working.apply(inputs);

    let mut keys: Vec<String> = Vec::with_capacity(inputs.len());
    for entry in inputs {
        if !keys.contains(&entry.key) {
            keys.push(entry.key.clone());
        }
    }

    StepInputs {
        keys,
        environment: working,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_base() -> Vec<(String, String)> {
        Vec::new()
    }

    fn entry(key: &str, value: &str) -> EnvironmentEntry {
        EnvironmentEntry::new(key, value)
    }

    fn inputs_of(envs: &[EnvironmentEntry], inputs: &[EnvironmentEntry]) -> IndexMap<String, String> {
        let environment = expand(envs, no_base());
        expand_step_inputs(inputs, &environment).visible()
    }

    fn map(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_braced_and_plain_references() {
        let lookup = map(&[("NAME", "World"), ("COUNT", "42")]);
        assert_eq!(expand_value("Hello ${NAME}!", &lookup), "Hello World!");
        assert_eq!(expand_value("Count: $COUNT", &lookup), "Count: 42");
        assert_eq!(expand_value("$NAME$COUNT", &lookup), "World42");
    }

    #[test]
    fn test_unknown_reference_is_empty() {
        let lookup = map(&[]);
        assert_eq!(expand_value("a${MISSING}b$MISSING", &lookup), "ab");
    }

    #[test]
    fn test_literal_dollar_passes_through() {
        let lookup = map(&[("A", "x")]);
        assert_eq!(expand_value("cost: 5$", &lookup), "cost: 5$");
        assert_eq!(expand_value("$1 and $$ and ${", &lookup), "$1 and $$ and ${");
        assert_eq!(expand_value("${not closed $A", &lookup), "${not closed x");
    }

    #[test]
    fn test_longest_name_wins() {
        let lookup = map(&[("similar", "short"), ("similar2", "long")]);
        assert_eq!(expand_value("$similar2", &lookup), "long");
    }

    #[test]
    fn test_substituted_value_is_not_rescanned() {
        let lookup = map(&[("A", "$B"), ("B", "deep")]);
        assert_eq!(expand_value("$A", &lookup), "$B");
    }

    #[test]
    fn test_self_reference_is_empty() {
        let snapshot = expand(&[entry("A", "$A")], no_base());
        assert_eq!(snapshot.get("A"), Some(""));
    }

    #[test]
    fn test_self_reference_with_prefix_keeps_prefix() {
        let snapshot = expand(&[entry("ENV_LOOP", "Env Something: $ENV_LOOP")], no_base());
        assert_eq!(snapshot.get("ENV_LOOP"), Some("Env Something: "));
    }

    #[test]
    fn test_self_reference_sees_base_value() {
        let snapshot = expand(&[entry("PATH", "/opt/bin:$PATH")], vec![("PATH", "/usr/bin")]);
        assert_eq!(snapshot.get("PATH"), Some("/opt/bin:/usr/bin"));
    }

    #[test]
    fn test_cycle_resolves_to_empty() {
        let snapshot = expand(&[entry("a", "$b"), entry("b", "$c"), entry("c", "$a")], no_base());
        assert_eq!(snapshot.get("a"), Some(""));
        assert_eq!(snapshot.get("b"), Some(""));
        assert_eq!(snapshot.get("c"), Some(""));
    }

    #[test]
    fn test_order_sensitivity() {
        let forward = expand(&[entry("os", "13.3"), entry("B", "iPhone 8 ($os)")], no_base());
        assert_eq!(forward.get("B"), Some("iPhone 8 (13.3)"));

        let backward = expand(&[entry("B", "iPhone 8 ($os)"), entry("os", "13.3")], no_base());
        assert_eq!(backward.get("B"), Some("iPhone 8 ()"));
    }

    #[test]
    fn test_later_entry_shadows_earlier() {
        let snapshot = expand(&[entry("K", "one"), entry("K", "two")], no_base());
        assert_eq!(snapshot.get("K"), Some("two"));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_literal_entry_is_verbatim() {
        let snapshot = expand(&[entry("A", "x"), entry("B", "$A").literal()], no_base());
        assert_eq!(snapshot.get("B"), Some("$A"));
    }

    #[test]
    fn test_skip_if_empty_keeps_previous_value() {
        let snapshot = expand(
            &[entry("A", "kept"), entry("A", "$MISSING").skip_if_empty(), entry("B", "").skip_if_empty()],
            no_base(),
        );
        assert_eq!(snapshot.get("A"), Some("kept"));
        assert!(!snapshot.contains_key("B"));
    }

    #[test]
    fn test_sensitive_hidden_but_usable() {
        let snapshot = expand(
            &[entry("TOKEN", "s3cr3t").sensitive(), entry("HEADER", "Bearer $TOKEN")],
            no_base(),
        );
        assert_eq!(snapshot.get("HEADER"), Some("Bearer s3cr3t"));
        assert!(!snapshot.visible().contains_key("TOKEN"));
        assert_eq!(snapshot.sensitive_values(), vec!["s3cr3t"]);
        assert_eq!(snapshot.to_process_env().get("TOKEN").map(String::as_str), Some("s3cr3t"));
    }

    #[test]
    fn test_env_does_not_depend_on_input() {
        let envs = [entry("simulator_device", "$simulator_major")];
        let inputs = [
            entry("simulator_major", "12"),
            entry("simulator_os_version", "$simulator_device"),
        ];
        assert_eq!(
            inputs_of(&envs, &inputs),
            map(&[("simulator_major", "12"), ("simulator_os_version", "")])
        );

        let switched = [
            entry("simulator_os_version", "$simulator_device"),
            entry("simulator_major", "12"),
        ];
        assert_eq!(
            inputs_of(&envs, &switched),
            map(&[("simulator_os_version", ""), ("simulator_major", "12")])
        );
    }

    #[test]
    fn test_secret_inputs_are_removed() {
        let inputs = [
            entry("simulator_os_version", "13.3"),
            entry("simulator_device", "iPhone 8 Plus"),
            entry("secret_input", "top secret").sensitive(),
        ];
        let expanded = expand_step_inputs(&inputs, &EnvironmentSnapshot::new());
        assert_eq!(
            expanded.visible(),
            map(&[("simulator_os_version", "13.3"), ("simulator_device", "iPhone 8 Plus")])
        );
        assert_eq!(expanded.get("secret_input"), Some("top secret"));
    }

    #[test]
    fn test_inputs_reference_env_chain() {
        let envs = [
            entry("SIMULATOR_OS_MAJOR_VERSION", "13"),
            entry("SIMULATOR_OS_MINOR_VERSION", "3"),
            entry(
                "SIMULATOR_OS_VERSION",
                "$SIMULATOR_OS_MAJOR_VERSION.$SIMULATOR_OS_MINOR_VERSION",
            ),
        ];
        let inputs = [entry("simulator_os_version", "$SIMULATOR_OS_VERSION")];
        assert_eq!(inputs_of(&envs, &inputs), map(&[("simulator_os_version", "13.3")]));
    }

    #[test]
    fn test_input_cannot_see_later_input() {
        let envs = [entry("simulator_os_version", "12.1")];

        let earlier = [
            entry("simulator_os_version", "13.3"),
            entry("simulator_device", "iPhone 8 ($simulator_os_version)"),
        ];
        assert_eq!(
            inputs_of(&envs, &earlier),
            map(&[("simulator_os_version", "13.3"), ("simulator_device", "iPhone 8 (13.3)")])
        );

        let later = [
            entry("simulator_device", "iPhone 8 ($simulator_os_version)"),
            entry("simulator_os_version", "13.3"),
        ];
        assert_eq!(
            inputs_of(&envs, &later),
            map(&[("simulator_device", "iPhone 8 (12.1)"), ("simulator_os_version", "13.3")])
        );
    }

    #[test]
    fn test_loops_across_batches_are_empty() {
        let envs = [entry("B", "$A"), entry("A", "$B")];
        let inputs = [
            entry("a", "$b"),
            entry("b", "$c"),
            entry("c", "$a"),
            entry("env", "$A"),
        ];
        assert_eq!(
            inputs_of(&envs, &inputs),
            map(&[("a", ""), ("b", ""), ("c", ""), ("env", "")])
        );
    }

    #[test]
    fn test_input_chain_with_prefix() {
        let inputs = [
            entry("similar2", "anything"),
            entry("similar", "$similar2"),
            entry("env", "Something: $similar"),
        ];
        assert_eq!(
            inputs_of(&[], &inputs),
            map(&[("similar2", "anything"), ("similar", "anything"), ("env", "Something: anything")])
        );
    }

    #[test]
    fn test_inputs_do_not_leak_into_run_environment() {
        let environment = expand(&[entry("A", "1")], no_base());
        let _ = expand_step_inputs(&[entry("A", "2"), entry("B", "3")], &environment);
        assert_eq!(environment.get("A"), Some("1"));
        assert!(!environment.contains_key("B"));
    }

    #[test]
    fn test_missing_required_inputs() {
        let inputs = [entry("project_path", "$PROJECT").required(), entry("scheme", "App").required()];
        let expanded = expand_step_inputs(&inputs, &EnvironmentSnapshot::new());
        assert_eq!(expanded.missing_required(&inputs), vec!["project_path".to_string()]);
    }
}
