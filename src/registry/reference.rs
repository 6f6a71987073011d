use dbridge_core::EntityKind;
use std::fmt;

use crate::error::{BridgeError, BridgeResult};

/// Registry key of one entity: `kind@id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: u64,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: u64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind.prefix(), self.id)
    }
}

/// Hierarchical address of a live entity, rooted at a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    segments: Vec<EntityKey>,
}

impl Reference {
    pub fn root(id: u64) -> Self {
        Self {
            segments: vec![EntityKey::new(EntityKind::Connection, id)],
        }
    }

    pub fn child(&self, key: EntityKey) -> Self {
        let mut segments = self.segments.clone();
        segments.push(key);
        Self { segments }
    }

    pub fn segments(&self) -> &[EntityKey] {
        &self.segments
    }

    /// Key of the addressed entity.
    pub fn key(&self) -> EntityKey {
        // Parsing and construction both guarantee at least the root segment.
        self.segments[self.segments.len() - 1]
    }

    /// Id of the root connection, which is also the session id.
    pub fn session_id(&self) -> u64 {
        self.segments[0].id
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn parent(&self) -> Option<Reference> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn url(&self) -> String {
        let mut url = String::new();
        for key in &self.segments {
            url.push('/');
            url.push_str(key.kind.prefix());
            url.push('/');
            url.push_str(&key.id.to_string());
        }
        url
    }

    /// Splits a request path into the entity reference and the trailing
    /// action segments.
    ///
    /// Segments are consumed greedily while they form `kind/id` pairs, so
    /// `/connection/1/statement/2/resultset/3/int/index/1` addresses the
    /// result set with action `int/index/1`.
    pub fn parse_path(path: &str) -> BridgeResult<(Reference, Vec<String>)> {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

        let root_id = match parts.as_slice() {
            ["connection", id, ..] => id.parse::<u64>().ok(),
            _ => None,
        }
        .ok_or_else(|| BridgeError::Protocol(format!("'{}' is not an entity path", path)))?;

        let mut reference = Reference::root(root_id);
        let mut i = 2;
        while i + 1 < parts.len() {
            let kind = match EntityKind::from_prefix(parts[i]) {
                Some(EntityKind::Connection) | None => break,
                Some(kind) => kind,
            };
            let id = match parts[i + 1].parse::<u64>() {
                Ok(id) => id,
                Err(_) => break,
            };
            reference = reference.child(EntityKey::new(kind, id));
            i += 2;
        }

        let action = parts[i..].iter().map(|s| s.to_string()).collect();
        Ok((reference, action))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_path_with_action() {
        let (reference, action) =
            Reference::parse_path("/connection/1/statement/2/resultset/3/int/index/1").unwrap();
        assert_eq!(reference.segments().len(), 3);
        assert_eq!(reference.key(), EntityKey::new(EntityKind::ResultSet, 3));
        assert_eq!(reference.session_id(), 1);
        assert_eq!(action, vec!["int", "index", "1"]);
        assert_eq!(reference.url(), "/connection/1/statement/2/resultset/3");
    }

    #[test]
    fn test_parse_create_action_is_not_a_segment() {
        let (reference, action) = Reference::parse_path("connection/7/blob").unwrap();
        assert!(reference.is_root());
        assert_eq!(action, vec!["blob"]);

        let (reference, action) = Reference::parse_path("/connection/7/savepoint/2").unwrap();
        assert!(reference.is_root());
        assert_eq!(action, vec!["savepoint", "2"]);
    }

    #[test]
    fn test_parse_rejects_non_entity_paths() {
        assert!(Reference::parse_path("/statement/1").is_err());
        assert!(Reference::parse_path("/connection/abc").is_err());
        assert!(Reference::parse_path("").is_err());
    }

    #[test]
    fn test_parent_and_display() {
        let reference = Reference::root(4)
            .child(EntityKey::new(EntityKind::PreparedStatement, 5))
            .child(EntityKey::new(EntityKind::ResultSet, 9));
        assert_eq!(
            reference.parent().unwrap().to_string(),
            "/connection/4/prepared-statement/5"
        );
        assert_eq!(reference.key().to_string(), "resultset@9");
        assert!(Reference::root(4).parent().is_none());
    }
}
