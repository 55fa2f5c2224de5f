//! Change records exchanged with the persistence executor.

use std::fmt;
use std::str::FromStr;

use crate::storage::{Columns, EntityName};

/// Discriminator of a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Command,
}

impl ChangeKind {
    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
            ChangeKind::Command => "command",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    /// Case-insensitive, so `Insert` and `INSERT` are accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(ChangeKind::Insert),
            "update" => Ok(ChangeKind::Update),
            "delete" => Ok(ChangeKind::Delete),
            "command" => Ok(ChangeKind::Command),
            _ => Err(s.to_string()),
        }
    }
}

/// One entry of a change batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Full snapshot of a new row.
    Insert { entity: EntityName, data: Columns },
    /// Changed fields of the row identified by `keys`.
    Update {
        entity: EntityName,
        keys: Columns,
        data: Columns,
    },
    Delete { entity: EntityName, keys: Columns },
    /// Parameterized statement run by the executor as is.
    Command {
        entity: EntityName,
        parameters: Columns,
        filter: Option<String>,
    },
}

impl Change {
    pub fn entity(&self) -> &EntityName {
        match self {
            Change::Insert { entity, .. }
            | Change::Update { entity, .. }
            | Change::Delete { entity, .. }
            | Change::Command { entity, .. } => entity,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Insert { .. } => ChangeKind::Insert,
            Change::Update { .. } => ChangeKind::Update,
            Change::Delete { .. } => ChangeKind::Delete,
            Change::Command { .. } => ChangeKind::Command,
        }
    }

    /// Field values written by the change, if it writes any.
    pub fn data(&self) -> Option<&Columns> {
        match self {
            Change::Insert { data, .. } | Change::Update { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Key values identifying the target row, for updates and deletes.
    pub fn keys(&self) -> Option<&Columns> {
        match self {
            Change::Update { keys, .. } | Change::Delete { keys, .. } => Some(keys),
            _ => None,
        }
    }

    /// Whether the change touches rows directly (everything but commands).
    pub fn is_data_change(&self) -> bool {
        !matches!(self, Change::Command { .. })
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.entity())?;
        if let Some(keys) = self.keys() {
            let keys: Vec<String> = keys.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            write!(f, " [{}]", keys.join(", "))?;
        }
        match self {
            Change::Insert { data, .. } | Change::Update { data, .. } => {
                write!(f, " ({} fields)", data.len())
            }
            Change::Command { parameters, .. } => write!(f, " ({} parameters)", parameters.len()),
            Change::Delete { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;

    #[test]
    fn test_kind_is_case_insensitive() {
        assert_eq!("insert".parse::<ChangeKind>(), Ok(ChangeKind::Insert));
        assert_eq!("Update".parse::<ChangeKind>(), Ok(ChangeKind::Update));
        assert_eq!("DELETE".parse::<ChangeKind>(), Ok(ChangeKind::Delete));
        assert_eq!("upsert".parse::<ChangeKind>(), Err("upsert".to_string()));
    }

    #[test]
    fn test_change_accessors() {
        let mut keys = Columns::new();
        keys.insert("id".to_string(), Value::Integer(3));
        let delete = Change::Delete {
            entity: EntityName::new("goods").unwrap(),
            keys,
        };

        assert_eq!(delete.kind(), ChangeKind::Delete);
        assert_eq!(delete.entity().as_str(), "goods");
        assert!(delete.data().is_none());
        assert!(delete.is_data_change());
        assert_eq!(delete.to_string(), "delete goods [id=3]");
    }
}
