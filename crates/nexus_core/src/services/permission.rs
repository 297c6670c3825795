//! Permission resolution over weighted roles with cycle-safe inheritance.

use crate::error::CoreError;
use crate::store::{CounterRepository, RoleRepository};
use dashmap::DashMap;
use nexus_types::{current_timestamp_ms, PlayerId, Profile, Role, RoleId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolves and caches effective permission sets.
///
/// The role table is loaded wholesale at enable time (roles are a small
/// set) and refreshed on role edits. Effective sets are cached per player
/// uuid with no TTL; staleness is bounded only by explicit invalidation
/// (role edit, profile reload, module disable).
pub struct PermissionService {
    repo: Arc<dyn RoleRepository>,
    counters: Arc<dyn CounterRepository>,
    roles: DashMap<RoleId, Role>,
    cache: DashMap<PlayerId, HashSet<String>>,
}

impl PermissionService {
    pub fn new(repo: Arc<dyn RoleRepository>, counters: Arc<dyn CounterRepository>) -> Self {
        Self {
            repo,
            counters,
            roles: DashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Loads the full role table from the store, replacing the local copy,
    /// and drops every cached effective set.
    pub async fn reload_roles(&self) -> Result<(), CoreError> {
        let roles = self.repo.find_all().await?;
        self.roles.clear();
        let count = roles.len();
        for role in roles {
            self.roles.insert(role.id, role);
        }
        self.clear_all_cache();
        info!(count, "role table loaded");
        Ok(())
    }

    /// Writes a role to the store and the local table, then drops all
    /// cached sets (any profile may reference the edited role).
    pub async fn save_role(&self, role: Role) -> Result<(), CoreError> {
        self.repo.upsert(&role).await?;
        self.roles.insert(role.id, role);
        self.clear_all_cache();
        Ok(())
    }

    /// Creates a role with the next id from the counters collection and
    /// persists it.
    pub async fn create_role(&self, name: &str, weight: i32) -> Result<Role, CoreError> {
        let id = RoleId(self.counters.next_id("roles").await? as i32);
        let role = Role::new(id, name, weight);
        self.save_role(role.clone()).await?;
        info!(role = %id, name, weight, "role created");
        Ok(role)
    }

    pub fn role(&self, id: RoleId) -> Option<Role> {
        self.roles.get(&id).map(|r| r.clone())
    }

    /// A role's own permissions plus everything inherited transitively.
    ///
    /// The inheritance graph may contain cycles; a role already in the
    /// visited set contributes nothing further, so resolution always
    /// terminates.
    pub fn resolve_role_permissions(&self, id: RoleId) -> HashSet<String> {
        let mut permissions = HashSet::new();
        let mut visited = HashSet::new();
        let mut pending = vec![id];

        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(role) = self.roles.get(&current) else {
                warn!(role = %current, "unknown role referenced in inheritance");
                continue;
            };
            permissions.extend(role.permissions.iter().cloned());
            pending.extend(role.inherits.iter().copied());
        }

        permissions
    }

    /// The profile's effective permission set: union over all active role
    /// grants plus individually-granted extras. Cached per uuid.
    pub fn effective_permissions(&self, profile: &Profile) -> HashSet<String> {
        if let Some(cached) = self.cache.get(&profile.uuid) {
            return cached.clone();
        }

        let now = current_timestamp_ms();
        let mut effective = HashSet::new();
        for grant in &profile.roles {
            if grant.is_expired(now) {
                continue;
            }
            effective.extend(self.resolve_role_permissions(grant.role_id));
        }
        effective.extend(profile.extra_permissions.iter().cloned());

        self.cache.insert(profile.uuid, effective.clone());
        debug!(uuid = %profile.uuid, count = effective.len(), "effective permission set cached");
        effective
    }

    /// Permission check with the precedence: explicit deny beats `*`,
    /// which beats exact match, which beats suffix wildcards.
    pub fn has_permission(&self, profile: &Profile, perm: &str) -> bool {
        let effective = self.effective_permissions(profile);
        Self::check(&effective, perm)
    }

    /// Pure check against an already-resolved set.
    pub fn check(effective: &HashSet<String>, perm: &str) -> bool {
        if effective.contains(&format!("-{perm}")) {
            return false;
        }
        if effective.contains("*") || effective.contains(perm) {
            return true;
        }
        // Suffix wildcard: "foo.*" grants "foo.bar".
        let mut prefix = perm;
        while let Some(dot) = prefix.rfind('.') {
            prefix = &prefix[..dot];
            if effective.contains(&format!("{prefix}.*")) {
                return true;
            }
        }
        false
    }

    /// The highest-weight role among the profile's active grants, used for
    /// display and chat formatting.
    pub fn primary_role(&self, profile: &Profile) -> Option<Role> {
        let now = current_timestamp_ms();
        profile
            .roles
            .iter()
            .filter(|g| !g.is_expired(now))
            .filter_map(|g| self.role(g.role_id))
            .max_by_key(|role| role.weight)
    }

    /// Drops the cached set for one player.
    pub fn clear_cache(&self, uuid: PlayerId) {
        if self.cache.remove(&uuid).is_some() {
            debug!(%uuid, "permission cache entry cleared");
        }
    }

    /// Drops every cached set.
    pub fn clear_all_cache(&self) {
        let count = self.cache.len();
        self.cache.clear();
        debug!(count, "permission cache cleared");
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}
