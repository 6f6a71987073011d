//! Entity registry: live native objects addressed by hierarchical references.
//!
//! Each root connection owns a [`Session`]; every entity created under it is
//! stored in the session under `kind@id` and recorded in its parent's child
//! set, so closing any entity closes everything it spawned.

pub mod entity;
pub mod reference;

pub use entity::{lob_entity_kind, Entity};
pub use reference::{EntityKey, Reference};

use dashmap::DashMap;
use dbridge_core::{CoercionEngine, ConversionPolicy, EntityDescriptor, EntityKind};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::native::{Canceller, NativeConnection};

/// Who opened a session and against what.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub subject: String,
    pub backend: String,
    pub url: String,
    pub policy: Arc<ConversionPolicy>,
}

pub struct Slot {
    pub key: EntityKey,
    pub reference: Reference,
    parent: Option<EntityKey>,
    entity: Mutex<Entity>,
    children: Mutex<Vec<EntityKey>>,
    closed: AtomicBool,
    canceller: Option<Arc<dyn Canceller>>,
}

impl Slot {
    fn new(reference: Reference, parent: Option<EntityKey>, entity: Entity) -> Self {
        Self {
            key: reference.key(),
            canceller: entity.canceller(),
            reference,
            parent,
            entity: Mutex::new(entity),
            children: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Canceller of a statement, usable while another request holds the
    /// entity lock.
    pub fn canceller(&self) -> Option<Arc<dyn Canceller>> {
        self.canceller.clone()
    }

    pub fn children(&self) -> Vec<EntityKey> {
        self.children.lock().clone()
    }
}

pub struct Session {
    pub id: u64,
    pub info: SessionInfo,
    pub engine: CoercionEngine,
    entities: DashMap<EntityKey, Arc<Slot>>,
}

impl Session {
    fn slot(&self, key: &EntityKey) -> Option<Arc<Slot>> {
        self.entities.get(key).map(|s| s.value().clone())
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub sessions: usize,
    pub entities: usize,
    pub by_kind: BTreeMap<String, usize>,
}

#[derive(Default)]
pub struct Registry {
    sessions: DashMap<u64, Arc<Session>>,
    generation: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Registers a root connection and returns its descriptor, carrying the
    /// session policy and backend name.
    pub fn open_session(
        &self,
        info: SessionInfo,
        connection: Box<dyn NativeConnection>,
    ) -> BridgeResult<EntityDescriptor> {
        let engine = CoercionEngine::shared(info.policy.clone())?;
        let id = self.next_id();
        let reference = Reference::root(id);
        let slot = Arc::new(Slot::new(reference.clone(), None, Entity::Connection(connection)));

        let descriptor = EntityDescriptor::new(reference.url(), EntityKind::Connection)
            .with_field("policy", info.policy.as_ref())
            .with_field("backend", &info.backend);

        tracing::info!(
            "Opened session {} for '{}' on {} ({})",
            id,
            info.subject,
            info.url,
            info.backend
        );

        let session = Session {
            id,
            info,
            engine,
            entities: DashMap::new(),
        };
        session.entities.insert(slot.key, slot);
        self.sessions.insert(id, Arc::new(session));
        Ok(descriptor)
    }

    pub fn session(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|s| s.value().clone())
    }

    /// Looks up the live slot behind a reference. Every ancestor must still
    /// be registered and open.
    pub fn resolve(&self, reference: &Reference) -> BridgeResult<(Arc<Session>, Arc<Slot>)> {
        let not_found = || BridgeError::ReferenceNotFound(reference.url());
        let session = self.session(reference.session_id()).ok_or_else(not_found)?;

        let mut found = None;
        for (depth, key) in reference.segments().iter().enumerate() {
            let slot = session.slot(key).ok_or_else(not_found)?;
            if slot.is_closed() || slot.reference.segments() != &reference.segments()[..=depth] {
                return Err(not_found());
            }
            found = Some(slot);
        }
        let slot = found.ok_or_else(not_found)?;
        Ok((session, slot))
    }

    /// Runs `f` against the native object under the slot lock.
    pub fn with_entity<T>(
        &self,
        reference: &Reference,
        f: impl FnOnce(&Session, &mut Entity) -> BridgeResult<T>,
    ) -> BridgeResult<T> {
        let (session, slot) = self.resolve(reference)?;
        let mut entity = slot.entity.lock();
        if slot.is_closed() {
            return Err(BridgeError::ReferenceNotFound(reference.url()));
        }
        f(&session, &mut *entity)
    }

    /// Runs `factory` against the parent's native object. A `None` result
    /// registers nothing.
    pub fn create(
        &self,
        parent: &Reference,
        kind: EntityKind,
        factory: impl FnOnce(&Session, &mut Entity) -> BridgeResult<Option<Entity>>,
    ) -> BridgeResult<Option<EntityDescriptor>> {
        let (session, parent_slot) = self.resolve(parent)?;
        let made = {
            let mut entity = parent_slot.entity.lock();
            if parent_slot.is_closed() {
                return Err(BridgeError::ReferenceNotFound(parent.url()));
            }
            factory(&session, &mut *entity)?
        };
        match made {
            Some(entity) => self.attach(&session, &parent_slot, kind, entity).map(Some),
            None => Ok(None),
        }
    }

    /// Registers an already built entity as a child of `parent`, e.g. a LOB
    /// cell read from a cursor row.
    pub fn register_value(
        &self,
        parent: &Reference,
        kind: EntityKind,
        entity: Entity,
    ) -> BridgeResult<EntityDescriptor> {
        let (session, parent_slot) = self.resolve(parent)?;
        self.attach(&session, &parent_slot, kind, entity)
    }

    fn attach(
        &self,
        session: &Session,
        parent: &Slot,
        kind: EntityKind,
        mut entity: Entity,
    ) -> BridgeResult<EntityDescriptor> {
        let key = EntityKey::new(kind, self.next_id());
        let reference = parent.reference.child(key);
        let descriptor = EntityDescriptor {
            url: reference.url(),
            kind,
            fields: entity.fields(),
        };

        let mut children = parent.children.lock();
        if parent.is_closed() {
            drop(children);
            if let Err(e) = entity.close() {
                tracing::warn!("Failed to close orphaned {}: {}", key, e);
            }
            return Err(BridgeError::ReferenceNotFound(parent.reference.url()));
        }
        session
            .entities
            .insert(key, Arc::new(Slot::new(reference, Some(parent.key), entity)));
        children.push(key);

        tracing::debug!("Registered {} under {}", key, parent.key);
        Ok(descriptor)
    }

    /// Closes an entity and, first, every entity it spawned. Closing a root
    /// connection ends the whole session.
    pub fn close(&self, reference: &Reference) -> BridgeResult<()> {
        let (session, slot) = self.resolve(reference)?;
        self.close_slot(&session, &slot);

        match slot.parent {
            Some(parent) => {
                if let Some(parent) = session.slot(&parent) {
                    parent.children.lock().retain(|k| *k != slot.key);
                }
            }
            None => {
                self.sessions.remove(&session.id);
                tracing::info!("Closed session {}", session.id);
            }
        }
        Ok(())
    }

    fn close_slot(&self, session: &Session, slot: &Slot) {
        let children = {
            let mut children = slot.children.lock();
            if slot.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *children)
        };

        for child in children.iter().rev() {
            if let Some(child) = session.slot(child) {
                self.close_slot(session, &child);
            }
        }

        if let Err(e) = slot.entity.lock().close() {
            tracing::warn!("Error closing {}: {}", slot.key, e);
        }
        session.entities.remove(&slot.key);
        tracing::debug!("Closed {}", slot.key);
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            sessions: self.sessions.len(),
            ..Default::default()
        };
        for session in self.sessions.iter() {
            for entry in session.entities.iter() {
                stats.entities += 1;
                *stats
                    .by_kind
                    .entry(entry.key().kind.prefix().to_string())
                    .or_default() += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{DriverSet, MemoryLob};
    use dbridge_core::LargeObject;

    fn registry_with_session() -> (Registry, Reference) {
        let registry = Registry::new();
        let driver = DriverSet::with_defaults().find("sqlite::memory:").unwrap();
        let conn = driver.connect("sqlite::memory:", &BTreeMap::new()).unwrap();
        let info = SessionInfo {
            subject: "tester".into(),
            backend: "sqlite".into(),
            url: "sqlite::memory:".into(),
            policy: Arc::new(ConversionPolicy::default()),
        };
        let descriptor = registry.open_session(info, conn).unwrap();
        let (reference, _) = Reference::parse_path(&descriptor.url).unwrap();
        (registry, reference)
    }

    fn create_statement(registry: &Registry, conn: &Reference) -> Reference {
        let descriptor = registry
            .create(conn, EntityKind::Statement, |_, entity| {
                Ok(Some(Entity::Statement(entity.connection()?.create_statement()?)))
            })
            .unwrap()
            .unwrap();
        Reference::parse_path(&descriptor.url).unwrap().0
    }

    fn create_cursor(registry: &Registry, stmt: &Reference) -> Reference {
        let descriptor = registry
            .create(stmt, EntityKind::ResultSet, |_, entity| {
                Ok(Some(Entity::Cursor(
                    entity.statement()?.execute_query(Some("SELECT 1 AS one"))?,
                )))
            })
            .unwrap()
            .unwrap();
        assert!(descriptor.fields.contains_key("metadata"));
        Reference::parse_path(&descriptor.url).unwrap().0
    }

    #[test]
    fn test_descriptor_carries_policy() {
        let registry = Registry::new();
        let conn = DriverSet::with_defaults()
            .find("sqlite::memory:")
            .unwrap()
            .connect("sqlite::memory:", &BTreeMap::new())
            .unwrap();
        let info = SessionInfo {
            subject: "tester".into(),
            backend: "sqlite".into(),
            url: "sqlite::memory:".into(),
            policy: Arc::new(ConversionPolicy::default()),
        };
        let descriptor = registry.open_session(info, conn).unwrap();
        assert_eq!(descriptor.kind, EntityKind::Connection);
        assert!(descriptor.field::<ConversionPolicy>("policy").is_some());
        assert_eq!(descriptor.field::<String>("backend").unwrap(), "sqlite");
    }

    #[test]
    fn test_close_cascades_to_descendants() {
        let (registry, conn) = registry_with_session();
        let stmt = create_statement(&registry, &conn);
        let cursor = create_cursor(&registry, &stmt);
        assert!(registry.resolve(&cursor).is_ok());

        registry.close(&stmt).unwrap();

        assert!(matches!(
            registry.resolve(&cursor),
            Err(BridgeError::ReferenceNotFound(_))
        ));
        assert!(matches!(
            registry.resolve(&stmt),
            Err(BridgeError::ReferenceNotFound(_))
        ));
        assert!(registry.resolve(&conn).is_ok());
        assert_eq!(registry.stats().entities, 1);
    }

    #[test]
    fn test_double_close_leaves_others_intact() {
        let (registry, conn) = registry_with_session();
        let first = create_statement(&registry, &conn);
        let second = create_statement(&registry, &conn);

        registry.close(&first).unwrap();
        assert!(matches!(
            registry.close(&first),
            Err(BridgeError::ReferenceNotFound(_))
        ));
        assert!(registry.resolve(&second).is_ok());
        assert!(registry.resolve(&conn).is_ok());
    }

    #[test]
    fn test_closing_root_removes_session() {
        let (registry, conn) = registry_with_session();
        let stmt = create_statement(&registry, &conn);
        let cursor = create_cursor(&registry, &stmt);

        registry.close(&conn).unwrap();

        assert_eq!(registry.stats().sessions, 0);
        assert!(registry.resolve(&cursor).is_err());
        assert!(registry.close(&conn).is_err());
    }

    #[test]
    fn test_none_factory_registers_nothing() {
        let (registry, conn) = registry_with_session();
        let made = registry
            .create(&conn, EntityKind::ResultSet, |_, _| Ok(None))
            .unwrap();
        assert!(made.is_none());
        assert_eq!(registry.stats().entities, 1);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let (registry, conn) = registry_with_session();
        let first = create_statement(&registry, &conn);
        registry.close(&first).unwrap();
        let second = create_statement(&registry, &conn);
        assert_ne!(first.key().id, second.key().id);
        assert!(registry.resolve(&first).is_err());
    }

    #[test]
    fn test_mismatched_lineage_is_not_found() {
        let (registry, conn) = registry_with_session();
        let stmt = create_statement(&registry, &conn);
        let cursor = create_cursor(&registry, &stmt);

        // Same key, wrong parent path.
        let forged = conn.child(cursor.key());
        assert!(registry.resolve(&forged).is_err());
    }

    #[test]
    fn test_register_value_and_stats() {
        let (registry, conn) = registry_with_session();
        let stmt = create_statement(&registry, &conn);
        let cursor = create_cursor(&registry, &stmt);
        let lob = Entity::Lob(Box::new(MemoryLob::new(LargeObject::blob(vec![1, 2, 3]))));

        let descriptor = registry
            .register_value(&cursor, EntityKind::Blob, lob)
            .unwrap();
        assert_eq!(descriptor.field::<u64>("length"), Some(3));

        let stats = registry.stats();
        assert_eq!(stats.entities, 4);
        assert_eq!(stats.by_kind.get("blob"), Some(&1));

        registry.close(&stmt).unwrap();
        assert_eq!(registry.stats().entities, 1);
    }
}
