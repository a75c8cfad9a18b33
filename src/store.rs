// ============================================================================
// User store abstraction
// ============================================================================
//
// Identity records live behind this trait so the default in-process map can
// be swapped for a persistent store without touching the token manager.
// All mutations go through the store; callers never hold references into it.
//
// ============================================================================

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::auth::users::User;

/// Record store for identity data.
///
/// `update` applies a closure under the store's own synchronization, which is
/// what makes read-modify-write sequences (failed-login counters, lock flags)
/// safe under concurrent logins.
pub trait UserStore: Send + Sync {
    fn get(&self, id: Uuid) -> Option<User>;
    fn get_by_username(&self, username: &str) -> Option<User>;
    /// Insert or replace a record
    fn put(&self, user: User);
    /// Atomically mutate a record in place; returns false if absent
    fn update(&self, id: Uuid, f: &mut dyn FnMut(&mut User)) -> bool;
    fn list(&self) -> Vec<User>;
}

#[derive(Default)]
struct Tables {
    by_id: HashMap<Uuid, User>,
    id_by_username: HashMap<String, Uuid>,
}

/// Concurrency-safe in-process store, the default implementation
#[derive(Default)]
pub struct MemoryUserStore {
    tables: RwLock<Tables>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn get(&self, id: Uuid) -> Option<User> {
        self.tables
            .read()
            .expect("user store lock poisoned")
            .by_id
            .get(&id)
            .cloned()
    }

    fn get_by_username(&self, username: &str) -> Option<User> {
        let tables = self.tables.read().expect("user store lock poisoned");
        tables
            .id_by_username
            .get(username)
            .and_then(|id| tables.by_id.get(id))
            .cloned()
    }

    fn put(&self, user: User) {
        let mut tables = self.tables.write().expect("user store lock poisoned");
        tables.id_by_username.insert(user.username.clone(), user.id);
        tables.by_id.insert(user.id, user);
    }

    fn update(&self, id: Uuid, f: &mut dyn FnMut(&mut User)) -> bool {
        let mut tables = self.tables.write().expect("user store lock poisoned");
        match tables.by_id.get_mut(&id) {
            Some(user) => {
                f(user);
                true
            }
            None => false,
        }
    }

    fn list(&self) -> Vec<User> {
        self.tables
            .read()
            .expect("user store lock poisoned")
            .by_id
            .values()
            .cloned()
            .collect()
    }
}
