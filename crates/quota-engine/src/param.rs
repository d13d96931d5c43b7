use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Reserve `num` units of resource `name` for `associated_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    #[serde(alias = "AssociatedID")]
    pub associated_id: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Num")]
    pub num: u64,
}

impl Param {
    pub fn new(associated_id: impl Into<String>, name: impl Into<String>, num: u64) -> Self {
        Self {
            associated_id: associated_id.into(),
            name: name.into(),
            num,
        }
    }
}

/// One `(resource, account)` record to resync.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncTarget {
    #[serde(alias = "AssociatedID")]
    pub associated_id: String,
    #[serde(alias = "Name")]
    pub name: String,
}

impl SyncTarget {
    pub fn new(associated_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            associated_id: associated_id.into(),
            name: name.into(),
        }
    }
}

impl From<&Param> for SyncTarget {
    fn from(param: &Param) -> Self {
        Self::new(param.associated_id.clone(), param.name.clone())
    }
}

/// Sums params sharing `(name, associated_id)` and drops zero amounts.
/// Output keeps the order in which each pair first appeared.
pub fn merge_params(params: &[Param]) -> Vec<Param> {
    let mut merged: Vec<Param> = Vec::new();
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    for param in params.iter().filter(|param| param.num > 0) {
        match index.get(&(param.name.as_str(), param.associated_id.as_str())) {
            Some(&at) => merged[at].num = merged[at].num.saturating_add(param.num),
            None => {
                index.insert(
                    (param.name.as_str(), param.associated_id.as_str()),
                    merged.len(),
                );
                merged.push(param.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_duplicates_and_drops_zero() {
        let merged = merge_params(&[
            Param::new("a", "CPU", 1),
            Param::new("a", "NET", 0),
            Param::new("b", "CPU", 2),
            Param::new("a", "CPU", 3),
        ]);
        assert_eq!(
            merged,
            vec![Param::new("a", "CPU", 4), Param::new("b", "CPU", 2)]
        );
    }

    #[test]
    fn all_zero_is_empty() {
        assert!(merge_params(&[Param::new("a", "CPU", 0)]).is_empty());
    }

    #[test]
    fn accepts_both_field_spellings() {
        let target: SyncTarget =
            serde_json::from_str(r#"{"AssociatedID":"a","Name":"CPU"}"#).unwrap();
        assert_eq!(target, SyncTarget::new("a", "CPU"));
        let param: Param =
            serde_json::from_str(r#"{"associated_id":"a","name":"CPU","num":2}"#).unwrap();
        assert_eq!(param, Param::new("a", "CPU", 2));
    }
}
