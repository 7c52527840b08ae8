//! In-memory repository.
//!
//! Backs tests and demos. Rows live in a `BTreeMap` keyed by id, ids come
//! from a monotonically increasing counter. Transactions belong to the thread
//! that began them: every level keeps an undo journal holding the prior state
//! of each row it touched, so a rollback reverts that thread's writes only.
//! Lock requests are recorded instead of enforced so tests can assert on them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::thread::{self, ThreadId};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Repository, Transactional};
use crate::framework::{lock, LockMode, Model, ModelId, OpError};

/// Row states from before a transaction level first wrote them. `None` means
/// the row did not exist.
type Journal<M> = BTreeMap<ModelId, Option<M>>;

#[derive(Debug)]
struct Store<M> {
    rows: BTreeMap<ModelId, M>,
    next_id: ModelId,
    journals: HashMap<ThreadId, Vec<Journal<M>>>,
    lock_requests: Vec<(ModelId, LockMode)>,
}

impl<M: Model> Store<M> {
    /// Remembers the current state of `id` in the calling thread's open level.
    fn record(&mut self, id: ModelId) {
        let prior = self.rows.get(&id).cloned();
        if let Some(journal) = self
            .journals
            .get_mut(&thread::current().id())
            .and_then(|levels| levels.last_mut())
        {
            journal.entry(id).or_insert(prior);
        }
    }

    fn pop_journal(&mut self) -> Option<Journal<M>> {
        let thread_id = thread::current().id();
        let levels = self.journals.get_mut(&thread_id)?;
        let journal = levels.pop();
        if levels.is_empty() {
            self.journals.remove(&thread_id);
        }
        journal
    }
}

#[derive(Debug)]
pub struct MemoryRepository<M: Model> {
    store: Mutex<Store<M>>,
}

impl<M: Model> MemoryRepository<M> {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store {
                rows: BTreeMap::new(),
                next_id: 1,
                journals: HashMap::new(),
                lock_requests: Vec::new(),
            }),
        }
    }

    /// Stores a row as-is, bypassing validations. Returns its id.
    pub fn insert(&self, mut model: M) -> ModelId {
        let mut store = lock(&self.store);
        let id = match model.id() {
            Some(id) => {
                store.next_id = store.next_id.max(id + 1);
                id
            }
            None => {
                let id = store.next_id;
                store.next_id += 1;
                model.set_id(id);
                id
            }
        };
        store.rows.insert(id, model);
        id
    }

    pub fn get(&self, id: ModelId) -> Option<M> {
        lock(&self.store).rows.get(&id).cloned()
    }

    pub fn all(&self) -> Vec<M> {
        lock(&self.store).rows.values().cloned().collect()
    }

    pub fn contains(&self, id: ModelId) -> bool {
        lock(&self.store).rows.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        lock(&self.store).rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every `(id, mode)` a lookup asked to lock, oldest first.
    pub fn lock_requests(&self) -> Vec<(ModelId, LockMode)> {
        lock(&self.store).lock_requests.clone()
    }
}

impl<M: Model> Default for MemoryRepository<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn id_from_value(value: &Value) -> Option<ModelId> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl<M: Model> Repository<M> for MemoryRepository<M> {
    fn find_by(
        &self,
        field: &str,
        value: &Value,
        lock_mode: Option<LockMode>,
    ) -> Result<Option<M>, OpError> {
        let entity_type = M::NAME;
        let mut store = lock(&self.store);
        let found = if field == "id" {
            id_from_value(value).and_then(|id| store.rows.get(&id).cloned())
        } else {
            store
                .rows
                .values()
                .find(|row| row.read_attribute(field).as_ref() == Some(value))
                .cloned()
        };
        debug!(entity_type, field, %value, found = found.is_some(), "Find");

        if let (Some(mode), Some(id)) = (lock_mode, found.as_ref().and_then(|row| row.id())) {
            store.lock_requests.push((id, mode));
        }
        Ok(found)
    }

    fn save(&self, model: &mut M) -> Result<(), OpError> {
        let entity_type = M::NAME;
        let mut store = lock(&self.store);
        let id = match model.id() {
            Some(id) => id,
            None => {
                let id = store.next_id;
                store.next_id += 1;
                model.set_id(id);
                id
            }
        };
        store.record(id);
        store.rows.insert(id, model.clone());
        info!(entity_type, id, size = store.rows.len(), "Saved");
        Ok(())
    }

    fn destroy(&self, model: &M) -> Result<(), OpError> {
        let entity_type = M::NAME;
        let Some(id) = model.id() else {
            return Err(OpError::Persistence(format!(
                "Can't destroy a {entity_type} that was never saved."
            )));
        };
        let mut store = lock(&self.store);
        store.record(id);
        match store.rows.remove(&id) {
            Some(_) => {
                info!(entity_type, id, size = store.rows.len(), "Deleted");
                Ok(())
            }
            None => {
                warn!(entity_type, id, "Not found");
                Err(OpError::NotFound {
                    model: entity_type,
                    field: "id".to_string(),
                    value: id.to_string(),
                })
            }
        }
    }
}

impl<M: Model> Transactional for MemoryRepository<M> {
    fn begin(&self) {
        lock(&self.store)
            .journals
            .entry(thread::current().id())
            .or_default()
            .push(BTreeMap::new());
    }

    /// Hands the level's journal to the enclosing level, if there is one.
    fn commit(&self) {
        let mut store = lock(&self.store);
        let Some(journal) = store.pop_journal() else {
            return;
        };
        if let Some(parent) = store
            .journals
            .get_mut(&thread::current().id())
            .and_then(|levels| levels.last_mut())
        {
            for (id, prior) in journal {
                parent.entry(id).or_insert(prior);
            }
        }
    }

    fn rollback(&self) {
        let mut store = lock(&self.store);
        let Some(journal) = store.pop_journal() else {
            return;
        };
        let reverted = journal.len();
        for (id, prior) in journal {
            match prior {
                Some(row) => store.rows.insert(id, row),
                None => store.rows.remove(&id),
            };
        }
        debug!(entity_type = M::NAME, reverted, size = store.rows.len(), "Rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Group;
    use serde_json::json;

    fn group(name: &str) -> Group {
        Group {
            name: Some(name.to_string()),
            ..Group::default()
        }
    }

    #[test]
    fn save_assigns_ids() {
        let repo = MemoryRepository::<Group>::new();
        let mut first = group("a");
        let mut second = group("b");

        repo.save(&mut first).unwrap();
        repo.save(&mut second).unwrap();

        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn find_by_id_or_attribute() {
        let repo = MemoryRepository::<Group>::new();
        let id = repo.insert(group("admins"));

        let by_id = repo.find_by("id", &json!(id), None).unwrap();
        let by_string_id = repo.find_by("id", &json!(id.to_string()), None).unwrap();
        let by_name = repo.find_by("name", &json!("admins"), None).unwrap();
        let missing = repo.find_by("name", &json!("nobody"), None).unwrap();

        assert_eq!(by_id.unwrap().id, Some(id));
        assert!(by_string_id.is_some());
        assert_eq!(by_name.unwrap().id, Some(id));
        assert!(missing.is_none());
    }

    #[test]
    fn lock_requests_are_recorded() {
        let repo = MemoryRepository::<Group>::new();
        let id = repo.insert(group("a"));

        repo.find_by("id", &json!(id), Some(LockMode::Exclusive)).unwrap();
        repo.find_by("id", &json!(id), None).unwrap();

        assert_eq!(repo.lock_requests(), vec![(id, LockMode::Exclusive)]);
    }

    #[test]
    fn rollback_restores_rows() {
        let repo = MemoryRepository::<Group>::new();
        repo.insert(group("kept"));

        repo.begin();
        repo.save(&mut group("dropped")).unwrap();
        assert_eq!(repo.len(), 2);
        repo.rollback();

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.all()[0].name.as_deref(), Some("kept"));
    }

    #[test]
    fn rollback_reverts_updates_and_deletes() {
        let repo = MemoryRepository::<Group>::new();
        let renamed = repo.insert(group("before"));
        let deleted = repo.insert(group("gone"));

        repo.begin();
        let mut row = repo.get(renamed).unwrap();
        row.name = Some("after".to_string());
        repo.save(&mut row).unwrap();
        repo.destroy(&repo.get(deleted).unwrap()).unwrap();
        repo.rollback();

        assert_eq!(repo.get(renamed).unwrap().name.as_deref(), Some("before"));
        assert!(repo.contains(deleted));
    }

    #[test]
    fn committed_inner_levels_roll_back_with_outer() {
        let repo = MemoryRepository::<Group>::new();

        repo.begin();
        repo.save(&mut group("outer")).unwrap();
        repo.begin();
        repo.save(&mut group("inner")).unwrap();
        repo.commit();
        assert_eq!(repo.len(), 2);
        repo.rollback();

        assert!(repo.is_empty());
    }

    #[test]
    fn rollback_keeps_rows_written_by_other_threads() {
        let repo = MemoryRepository::<Group>::new();

        repo.begin();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                repo.begin();
                repo.save(&mut group("other")).unwrap();
                repo.commit();
            });
        });
        repo.save(&mut group("mine")).unwrap();
        repo.rollback();

        let names: Vec<_> = repo.all().into_iter().filter_map(|g| g.name).collect();
        assert_eq!(names, vec!["other".to_string()]);
    }

    #[test]
    fn destroying_unsaved_rows_fails() {
        let repo = MemoryRepository::<Group>::new();
        assert!(matches!(
            repo.destroy(&group("new")),
            Err(OpError::Persistence(_))
        ));
    }
}
