// kestrel_core/src/parameters.rs

use serde::{Deserialize, Serialize};

/// A single named numeric parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: String,
    pub value: f64,
}

/// A flat, ordered list of named numeric parameters.
///
/// Every model exposes its tunables (standard deviations, timeouts, gains)
/// through one of these. Nested models are merged in with a `"name/"` prefix,
/// so a full estimator exposes keys like `"gps/position_stddev"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterList(Vec<Parameter>);

impl ParameterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `add`.
    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.add(key, value);
        self
    }

    /// Adds a parameter, replacing the value if the key already exists.
    pub fn add(&mut self, key: &str, value: f64) {
        match self.0.iter_mut().find(|p| p.key == key) {
            Some(existing) => existing.value = value,
            None => self.0.push(Parameter {
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.iter().find(|p| p.key == key).map(|p| p.value)
    }

    /// Merges `other` into this list, prefixing each of its keys with `"prefix/"`.
    pub fn extend_prefixed(&mut self, prefix: &str, other: ParameterList) {
        for p in other.0 {
            self.add(&format!("{}/{}", prefix, p.key), p.value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Splits `"gps/position_stddev"` into `("gps", "position_stddev")`.
pub fn split_key(path: &str) -> Option<(&str, &str)> {
    path.split_once('/')
}

/// Converts a parameter value to a flag, anything non-zero is `true`.
pub fn as_flag(value: f64) -> bool {
    value != 0.0
}

pub fn from_flag(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_replaces_existing_keys() {
        let mut list = ParameterList::new().with("stddev", 1.0);
        list.add("stddev", 2.0);
        assert_eq!(list.len(), 1);
        assert_eq!(list.get("stddev"), Some(2.0));
    }

    #[test]
    fn nested_lists_are_prefixed() {
        let inner = ParameterList::new().with("rate_drift", 0.5);
        let mut outer = ParameterList::new().with("gravity", -9.8);
        outer.extend_prefixed("gyro", inner);

        assert_eq!(outer.get("gyro/rate_drift"), Some(0.5));
        assert_eq!(outer.get("gravity"), Some(-9.8));
        assert_eq!(split_key("system/gyro/rate_drift"), Some(("system", "gyro/rate_drift")));
    }
}
