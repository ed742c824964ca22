//! # Key=value parameter strings
//!
//! Components are configured with flat strings such as
//! `"epsilonInitial = 0.2, epsilonDecayRate = 0.999, epsilonMin = 0.01"`.
//! Each component declares the keys it recognises as a slice of [`ParamDef`];
//! parsing a string against those definitions rejects unknown keys and values
//! of the wrong type, so a misspelt key fails construction instead of being
//! silently ignored.
//!
//! ```rust
//! use pallas::params::{ParamDef, ParamSet, ParamType};
//!
//! const DEFS: &[ParamDef] = &[
//!     ParamDef::new("gamma", ParamType::Float),
//!     ParamDef::new("updateEpochs", ParamType::Int),
//! ];
//!
//! let params = ParamSet::parse("algorithm", "gamma = 0.9, updateEpochs = 3", DEFS).unwrap();
//! assert_eq!(params.float("gamma"), Some(0.9));
//! assert_eq!(params.int("updateEpochs"), Some(3));
//! assert!(ParamSet::parse("algorithm", "gama = 0.9", DEFS).is_err());
//! ```

use std::collections::BTreeMap;

use crate::error::{PallasError, Result};

/// Declared type of a parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Float,
    Int,
    Bool,
}

impl ParamType {
    fn name(&self) -> &'static str {
        match self {
            ParamType::Float => "float",
            ParamType::Int => "integer",
            ParamType::Bool => "boolean",
        }
    }
}

/// A recognised key and its type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDef {
    pub name: &'static str,
    pub kind: ParamType,
}

impl ParamDef {
    pub const fn new(name: &'static str, kind: ParamType) -> Self {
        ParamDef { name, kind }
    }
}

/// A parsed parameter value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i64),
    Bool(bool),
}

/// Parameters parsed for one component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    component: String,
    values: BTreeMap<String, ParamValue>,
}

impl ParamSet {
    /// An empty set; every getter returns `None` so defaults apply.
    pub fn empty(component: &str) -> Self {
        ParamSet {
            component: component.to_string(),
            values: BTreeMap::new(),
        }
    }

    /// Parse `text` against `defs`. Later duplicates override earlier ones.
    pub fn parse(component: &str, text: &str, defs: &[ParamDef]) -> Result<Self> {
        let mut set = ParamSet::empty(component);
        for (key, raw) in split_pairs(text)? {
            let def = defs.iter().find(|d| d.name == key).ok_or_else(|| {
                PallasError::UnknownParameter {
                    component: component.to_string(),
                    key: key.clone(),
                }
            })?;
            let value = parse_value(&key, &raw, def.kind)?;
            set.values.insert(key, value);
        }
        Ok(set)
    }

    /// Parse a shared string and route each key to the components declaring it.
    ///
    /// Returns one set per entry of `components`, in order. A key declared by
    /// none of them is reported against `owner`.
    pub fn split_for(
        owner: &str,
        text: &str,
        components: &[(&str, &[ParamDef])],
    ) -> Result<Vec<ParamSet>> {
        let mut sets: Vec<ParamSet> = components
            .iter()
            .map(|(name, _)| ParamSet::empty(name))
            .collect();

        for (key, raw) in split_pairs(text)? {
            let mut claimed = false;
            for ((_, defs), set) in components.iter().zip(sets.iter_mut()) {
                if let Some(def) = defs.iter().find(|d| d.name == key) {
                    let value = parse_value(&key, &raw, def.kind)?;
                    set.values.insert(key.clone(), value);
                    claimed = true;
                }
            }
            if !claimed {
                return Err(PallasError::UnknownParameter {
                    component: owner.to_string(),
                    key,
                });
            }
        }
        Ok(sets)
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.values.get(name)? {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f32),
            ParamValue::Bool(_) => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name)? {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn float_or(&self, name: &str, default: f32) -> f32 {
        self.float(name).unwrap_or(default)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.bool(name).unwrap_or(default)
    }

    /// Integer parameter that must be non-negative.
    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize> {
        match self.int(name) {
            None => Ok(default),
            Some(v) if v >= 0 => Ok(v as usize),
            Some(v) => Err(PallasError::invalid_parameter(
                name.to_string(),
                format!("must be non-negative, got {}", v),
            )),
        }
    }

    /// Float parameter constrained to the closed range `[lo, hi]`.
    pub fn float_in(&self, name: &str, default: f32, lo: f32, hi: f32) -> Result<f32> {
        let value = self.float_or(name, default);
        if !(lo..=hi).contains(&value) {
            return Err(PallasError::invalid_parameter(
                name.to_string(),
                format!("must be within [{}, {}], got {}", lo, hi, value),
            ));
        }
        Ok(value)
    }
}

fn split_pairs(text: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for item in text.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (key, value) = item.split_once('=').ok_or_else(|| PallasError::ParseError {
            key: item.to_string(),
            value: String::new(),
            expected: "key = value".to_string(),
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(PallasError::ParseError {
                key: String::new(),
                value: value.trim().to_string(),
                expected: "non-empty key".to_string(),
            });
        }
        pairs.push((key.to_string(), value.trim().to_string()));
    }
    Ok(pairs)
}

fn parse_value(key: &str, raw: &str, kind: ParamType) -> Result<ParamValue> {
    let err = || PallasError::ParseError {
        key: key.to_string(),
        value: raw.to_string(),
        expected: kind.name().to_string(),
    };
    match kind {
        ParamType::Float => raw.parse::<f32>().map(ParamValue::Float).map_err(|_| err()),
        ParamType::Int => raw.parse::<i64>().map(ParamValue::Int).map_err(|_| err()),
        ParamType::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(ParamValue::Bool(true)),
            "false" => Ok(ParamValue::Bool(false)),
            _ => Err(err()),
        },
    }
}
