//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of [`ClusterClient`] that
//! behaves closely enough to an API server for controller tests:
//! - objects get `uid`, `resourceVersion` and `generation` on create
//! - `generation` is bumped when `spec` changes
//! - `status` is only writable through `patch_status`
//! - deleting an object with finalizers only sets `deletionTimestamp`;
//!   the object disappears once its last finalizer is removed
//!
//! Every write is recorded so tests can assert on idempotence, failures can
//! be injected per verb and kind, and create reactors can simulate other
//! actors (e.g. a platform granting a request).

mod records;

pub use records::{Verb, WriteRecord};

use crate::client::ClusterClient;
use crate::error::ClusterError;
use crate::merge::json_merge_patch;
use crate::typed::api_resource;
use kube::Resource;
use kube::discovery::ApiResource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Timestamp the mock stamps on objects whose deletion is blocked by finalizers
pub const MOCK_DELETION_TIMESTAMP: &str = "2026-01-01T00:00:00Z";

type Reactor = Arc<dyn Fn(&mut Value) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    kind: String,
    namespace: Option<String>,
    name: String,
}

impl ObjectKey {
    fn new(resource: &ApiResource, namespace: Option<&str>, name: &str) -> Self {
        let kind = if resource.group.is_empty() {
            resource.kind.clone()
        } else {
            format!("{}.{}", resource.kind, resource.group)
        };
        Self {
            kind,
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }
}

/// Mock ClusterClient for testing
///
/// Cloning is cheap and clones share the same store, so a test can keep a
/// handle while the code under test owns another.
#[derive(Clone)]
pub struct MockClusterClient {
    name: String,
    objects: Arc<Mutex<BTreeMap<ObjectKey, Value>>>,
    writes: Arc<Mutex<Vec<WriteRecord>>>,
    failures: Arc<Mutex<Vec<(Verb, String)>>>,
    reactors: Arc<Mutex<Vec<(String, Reactor)>>>,
    next_version: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient")
            .field("name", &self.name)
            .field("objects", &locked(&self.objects).len())
            .finish_non_exhaustive()
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockClusterClient {
    /// Create a new, empty mock cluster
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            writes: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(Vec::new())),
            reactors: Arc::new(Mutex::new(Vec::new())),
            next_version: Arc::new(Mutex::new(1)),
        }
    }

    /// Store an object as-is, without recording a write (for test setup)
    pub fn insert<K>(&self, object: &K)
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let resource = api_resource::<K>();
        let meta = object.meta();
        let key = ObjectKey::new(
            &resource,
            meta.namespace.as_deref(),
            meta.name.as_deref().unwrap_or_default(),
        );
        if let Ok(value) = serde_json::to_value(object) {
            locked(&self.objects).insert(key, value);
        }
    }

    /// Read back a typed object
    pub fn object<K>(&self, namespace: Option<&str>, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let key = ObjectKey::new(&api_resource::<K>(), namespace, name);
        locked(&self.objects)
            .get(&key)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Whether an object exists
    pub fn contains<K>(&self, namespace: Option<&str>, name: &str) -> bool
    where
        K: Resource<DynamicType = ()>,
    {
        let key = ObjectKey::new(&api_resource::<K>(), namespace, name);
        locked(&self.objects).contains_key(&key)
    }

    /// Mutate a stored object in place, without recording a write.
    ///
    /// Used to simulate other actors, e.g. the deployment controller
    /// updating a Deployment's status.
    pub fn update_object<K, F>(&self, namespace: Option<&str>, name: &str, f: F) -> bool
    where
        K: Resource<DynamicType = ()>,
        F: FnOnce(&mut Value),
    {
        let key = ObjectKey::new(&api_resource::<K>(), namespace, name);
        match locked(&self.objects).get_mut(&key) {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    /// Number of stored objects of a kind
    pub fn count<K>(&self) -> usize
    where
        K: Resource<DynamicType = ()>,
    {
        let kind = ObjectKey::new(&api_resource::<K>(), None, "").kind;
        locked(&self.objects).keys().filter(|k| k.kind == kind).count()
    }

    /// All writes recorded so far
    pub fn writes(&self) -> Vec<WriteRecord> {
        locked(&self.writes).clone()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        locked(&self.writes).clear();
    }

    /// Make every `verb` on `kind` (e.g. "Deployment") fail with a 500
    pub fn fail_on(&self, verb: Verb, kind: &str) {
        locked(&self.failures).push((verb, kind.to_string()));
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        locked(&self.failures).clear();
    }

    /// Run `reactor` on every object of `kind` right after it is created
    pub fn on_create<F>(&self, kind: &str, reactor: F)
    where
        F: Fn(&mut Value) + Send + Sync + 'static,
    {
        locked(&self.reactors).push((kind.to_string(), Arc::new(reactor)));
    }

    fn check_failure(&self, verb: Verb, resource: &ApiResource, name: &str) -> Result<(), ClusterError> {
        let failing = locked(&self.failures)
            .iter()
            .any(|(v, kind)| *v == verb && *kind == resource.kind);
        if failing {
            return Err(ClusterError::Api {
                cluster: self.name.clone(),
                code: 500,
                message: format!("injected {:?} failure for {} {}", verb, resource.kind, name),
            });
        }
        Ok(())
    }

    fn record(&self, verb: Verb, resource: &ApiResource, namespace: Option<&str>, name: &str) {
        locked(&self.writes).push(WriteRecord {
            verb,
            kind: resource.kind.clone(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        });
    }

    fn bump_version(&self) -> u64 {
        let mut next = locked(&self.next_version);
        let version = *next;
        *next += 1;
        version
    }

    fn not_found(resource: &ApiResource, namespace: Option<&str>, name: &str) -> ClusterError {
        match namespace {
            Some(ns) => ClusterError::NotFound(format!("{} {}/{} not found", resource.kind, ns, name)),
            None => ClusterError::NotFound(format!("{} {} not found", resource.kind, name)),
        }
    }

    /// Stores `updated` in place of `existing`, applying server-side rules.
    fn commit_update(&self, key: ObjectKey, existing: &Value, mut updated: Value) -> Value {
        match existing.get("status") {
            Some(status) => updated["status"] = status.clone(),
            None => {
                if let Some(map) = updated.as_object_mut() {
                    map.remove("status");
                }
            }
        }

        let generation = existing["metadata"]["generation"].as_i64().unwrap_or(1);
        let generation = if existing.get("spec") != updated.get("spec") {
            generation + 1
        } else {
            generation
        };

        let version = self.bump_version();
        for field in ["uid", "creationTimestamp", "deletionTimestamp"] {
            match existing["metadata"].get(field) {
                Some(value) => updated["metadata"][field] = value.clone(),
                None => {
                    if let Some(meta) = updated["metadata"].as_object_mut() {
                        meta.remove(field);
                    }
                }
            }
        }
        updated["metadata"]["generation"] = json!(generation);
        updated["metadata"]["resourceVersion"] = json!(version.to_string());

        let deleting = updated["metadata"].get("deletionTimestamp").is_some();
        let finalizers_empty = updated["metadata"]["finalizers"]
            .as_array()
            .is_none_or(Vec::is_empty);

        let mut objects = locked(&self.objects);
        if deleting && finalizers_empty {
            objects.remove(&key);
        } else {
            objects.insert(key, updated.clone());
        }
        updated
    }
}

#[async_trait::async_trait]
impl ClusterClient for MockClusterClient {
    fn cluster_name(&self) -> &str {
        &self.name
    }

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, ClusterError> {
        self.check_failure(Verb::Get, resource, name)?;
        let key = ObjectKey::new(resource, namespace, name);
        Ok(locked(&self.objects).get(&key).cloned())
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Value>, ClusterError> {
        self.check_failure(Verb::List, resource, "")?;
        let kind = ObjectKey::new(resource, None, "").kind;
        let matching = locked(&self.objects)
            .iter()
            .filter(|(key, _)| key.kind == kind && (namespace.is_none() || key.namespace.as_deref() == namespace))
            .filter(|(_, object)| {
                labels
                    .iter()
                    .all(|(k, v)| object["metadata"]["labels"][k].as_str() == Some(v.as_str()))
            })
            .map(|(_, object)| object.clone())
            .collect();
        Ok(matching)
    }

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<Value, ClusterError> {
        let name = object["metadata"]["name"]
            .as_str()
            .ok_or_else(|| ClusterError::InvalidObject(format!("{} without name", resource.kind)))?
            .to_string();
        self.check_failure(Verb::Create, resource, &name)?;

        let key = ObjectKey::new(resource, namespace, &name);
        if locked(&self.objects).contains_key(&key) {
            return Err(ClusterError::Conflict(format!("{} {} already exists", resource.kind, name)));
        }

        let version = self.bump_version();
        let mut created = object.clone();
        if let Some(ns) = namespace {
            created["metadata"]["namespace"] = json!(ns);
        }
        created["metadata"]["uid"] = json!(format!("uid-{}", version));
        created["metadata"]["resourceVersion"] = json!(version.to_string());
        created["metadata"]["generation"] = json!(1);
        if let Some(map) = created.as_object_mut() {
            map.remove("status");
        }

        let reactors: Vec<Reactor> = locked(&self.reactors)
            .iter()
            .filter(|(kind, _)| *kind == resource.kind)
            .map(|(_, reactor)| Arc::clone(reactor))
            .collect();
        for reactor in reactors {
            reactor(&mut created);
        }

        locked(&self.objects).insert(key, created.clone());
        self.record(Verb::Create, resource, namespace, &name);
        Ok(created)
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
    ) -> Result<Value, ClusterError> {
        self.check_failure(Verb::Replace, resource, name)?;
        let key = ObjectKey::new(resource, namespace, name);
        let existing = locked(&self.objects)
            .get(&key)
            .cloned()
            .ok_or_else(|| Self::not_found(resource, namespace, name))?;

        let updated = self.commit_update(key, &existing, object.clone());
        self.record(Verb::Replace, resource, namespace, name);
        Ok(updated)
    }

    async fn patch(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<Value, ClusterError> {
        self.check_failure(Verb::Patch, resource, name)?;
        let key = ObjectKey::new(resource, namespace, name);
        let existing = locked(&self.objects)
            .get(&key)
            .cloned()
            .ok_or_else(|| Self::not_found(resource, namespace, name))?;

        // a resourceVersion in the patch is a precondition
        if let Some(expected) = patch["metadata"]["resourceVersion"].as_str() {
            if existing["metadata"]["resourceVersion"].as_str() != Some(expected) {
                return Err(ClusterError::Conflict(format!(
                    "{} {} was modified, resourceVersion {} is stale",
                    resource.kind, name, expected
                )));
            }
        }

        let mut merged = existing.clone();
        json_merge_patch(&mut merged, patch);
        let updated = self.commit_update(key, &existing, merged);
        self.record(Verb::Patch, resource, namespace, name);
        Ok(updated)
    }

    async fn patch_status(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        status: &Value,
    ) -> Result<Value, ClusterError> {
        self.check_failure(Verb::PatchStatus, resource, name)?;
        let key = ObjectKey::new(resource, namespace, name);
        let version = self.bump_version();
        let mut objects = locked(&self.objects);
        let object = objects
            .get_mut(&key)
            .ok_or_else(|| Self::not_found(resource, namespace, name))?;

        let mut merged = object.get("status").cloned().unwrap_or_else(|| json!({}));
        json_merge_patch(&mut merged, status);
        object["status"] = merged;
        object["metadata"]["resourceVersion"] = json!(version.to_string());
        let updated = object.clone();
        drop(objects);

        self.record(Verb::PatchStatus, resource, namespace, name);
        Ok(updated)
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, ClusterError> {
        self.check_failure(Verb::Delete, resource, name)?;
        let key = ObjectKey::new(resource, namespace, name);
        let mut objects = locked(&self.objects);
        let Some(object) = objects.get_mut(&key) else {
            return Ok(false);
        };

        let has_finalizers = object["metadata"]["finalizers"]
            .as_array()
            .is_some_and(|f| !f.is_empty());
        if has_finalizers {
            if object["metadata"].get("deletionTimestamp").is_none() {
                object["metadata"]["deletionTimestamp"] = json!(MOCK_DELETION_TIMESTAMP);
            }
        } else {
            objects.remove(&key);
        }
        drop(objects);

        self.record(Verb::Delete, resource, namespace, name);
        Ok(true)
    }
}
