//! SchemaIndex (C1): in-memory maps from Kubernetes kind to GVR and from
//! schema name to ordered OpenAPI field paths, with a read-mostly cache.
//!
//! The discovery data itself comes from a `SchemaProvider`, an external
//! collaborator (out of scope per the specification): here it is a narrow
//! trait so the completer can depend on "not ready yet" instead of a
//! concrete discovery client.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;

/// Group/Version/Resource triple identifying a Kubernetes API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gvr {
    pub group: String,
    pub version: String,
    pub resource: String,
}

/// External collaborator: resource discovery and the OpenAPI schema cache.
/// Not part of this crate's core — implementations talk to a cluster or to
/// the same backend server the shell submits queries to.
pub trait SchemaProvider: Send + Sync {
    /// List every known kind alias -> GVR mapping. Called once at startup to
    /// prime `gvr_cache`.
    fn list_gvrs(&self) -> Result<Vec<(String, Gvr)>>;

    /// Fetch the ordered, dotted field-path list for a fully qualified
    /// schema name (e.g. `io.k8s.api.apps.v1.Deployment`).
    fn field_paths(&self, schema_name: &str) -> Result<Vec<String>>;
}

/// A `SchemaProvider` that has nothing to report yet — used before the
/// backend connection is established. The completer degrades to
/// keyword-only suggestions rather than erroring.
pub struct UnavailableSchemaProvider;

impl SchemaProvider for UnavailableSchemaProvider {
    fn list_gvrs(&self) -> Result<Vec<(String, Gvr)>> {
        Ok(Vec::new())
    }
    fn field_paths(&self, _schema_name: &str) -> Result<Vec<String>> {
        anyhow::bail!("schema provider not ready")
    }
}

struct Inner {
    gvr_cache: HashMap<String, Gvr>,
    resource_specs: HashMap<String, Vec<String>>,
    tree_structure_cache: HashMap<String, Vec<String>>,
}

pub struct SchemaIndex {
    provider: Arc<dyn SchemaProvider>,
    inner: RwLock<Inner>,
}

impl SchemaIndex {
    pub fn new(provider: Arc<dyn SchemaProvider>) -> Self {
        Self {
            provider,
            inner: RwLock::new(Inner {
                gvr_cache: HashMap::new(),
                resource_specs: HashMap::new(),
                tree_structure_cache: HashMap::new(),
            }),
        }
    }

    /// Prime `gvr_cache` eagerly so kind-slot completion (§4.3 rule 1) works
    /// before any field-path lookup. Failure is not fatal: the completer
    /// simply has nothing to suggest for kinds until a later retry.
    pub fn prime(&self) {
        if let Ok(pairs) = self.provider.list_gvrs() {
            let mut w = self.inner.write();
            for (alias, gvr) in pairs {
                w.gvr_cache.insert(alias.to_ascii_lowercase(), gvr);
            }
        }
    }

    /// Seed a resource-spec key -> field-path table directly. Used by tests
    /// and by callers that already hold the OpenAPI document in memory.
    pub fn seed_resource_specs(&self, specs: HashMap<String, Vec<String>>) {
        self.inner.write().resource_specs = specs;
    }

    /// All known resource names, for kind-slot completion (§4.3 rule 1).
    pub fn resource_names(&self) -> Vec<String> {
        let r = self.inner.read();
        let mut names: Vec<String> = r.gvr_cache.values().map(|g| g.resource.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn kind_to_gvr(&self, kind: &str) -> Option<Gvr> {
        let needle = kind.to_ascii_lowercase();
        let r = self.inner.read();
        if let Some(g) = r.gvr_cache.get(&needle) {
            return Some(g.clone());
        }
        // Match on `resource` or its singular form.
        r.gvr_cache
            .values()
            .find(|g| {
                g.resource.eq_ignore_ascii_case(&needle)
                    || singularize(&g.resource).eq_ignore_ascii_case(&needle)
            })
            .cloned()
    }

    /// Resolve the fully qualified schema name for a kind, or empty string
    /// on a miss. Ambiguity is resolved by preferring exact last-segment
    /// equality, then by lexicographic order of schema name.
    pub fn schema_name_for(&self, kind: &str) -> String {
        let r = self.inner.read();
        let mut candidates: Vec<&String> = r
            .resource_specs
            .keys()
            .filter(|name| last_segment_matches(name, kind))
            .collect();
        candidates.sort();
        if let Some(first) = candidates.first() {
            return (*first).clone();
        }
        drop(r);
        // Fall back to constructing io.k8s.api.{group}.{version}.{Kind} and
        // probing the provider.
        if let Some(gvr) = self.kind_to_gvr(kind) {
            let constructed = format!("io.k8s.api.{}.{}.{}", gvr.group, gvr.version, kind);
            let r = self.inner.read();
            if r.resource_specs.contains_key(&constructed) {
                return constructed;
            }
        }
        String::new()
    }

    /// Resolve and memoize the ordered field-path list for a kind.
    pub fn field_paths(&self, kind: &str) -> Result<Vec<String>> {
        let schema_name = self.schema_name_for(kind);
        if schema_name.is_empty() {
            anyhow::bail!("kind not indexed: {kind}");
        }
        let normalized = schema_name.clone();
        if let Some(cached) = self.inner.read().tree_structure_cache.get(&normalized) {
            return Ok(cached.clone());
        }
        // Check resource_specs first (already known at seed time).
        if let Some(paths) = self.inner.read().resource_specs.get(&schema_name) {
            let paths = paths.clone();
            self.inner
                .write()
                .tree_structure_cache
                .insert(normalized, paths.clone());
            return Ok(paths);
        }
        let fetched = self.provider.field_paths(&schema_name)?;
        self.inner
            .write()
            .tree_structure_cache
            .insert(normalized, fetched.clone());
        Ok(fetched)
    }
}

fn last_segment_matches(schema_name: &str, kind: &str) -> bool {
    let Some(last) = schema_name.rsplit('.').next() else {
        return false;
    };
    if last.eq_ignore_ascii_case(kind) {
        return true;
    }
    if let Some(trimmed) = kind.strip_suffix('s') {
        return last.eq_ignore_ascii_case(trimmed);
    }
    false
}

fn singularize(resource: &str) -> String {
    resource.strip_suffix('s').unwrap_or(resource).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider;
    impl SchemaProvider for FakeProvider {
        fn list_gvrs(&self) -> Result<Vec<(String, Gvr)>> {
            Ok(vec![(
                "pods".into(),
                Gvr { group: "core".into(), version: "v1".into(), resource: "pods".into() },
            ), (
                "deployments".into(),
                Gvr { group: "apps".into(), version: "v1".into(), resource: "deployments".into() },
            )])
        }
        fn field_paths(&self, _schema_name: &str) -> Result<Vec<String>> {
            Ok(vec!["metadata.name".into(), "spec.replicas".into()])
        }
    }

    fn index_with_specs() -> SchemaIndex {
        let idx = SchemaIndex::new(Arc::new(FakeProvider));
        idx.prime();
        let mut specs = HashMap::new();
        specs.insert(
            "io.k8s.api.apps.v1.Deployment".to_string(),
            vec!["metadata.name".to_string(), "spec.replicas".to_string()],
        );
        specs.insert(
            "io.k8s.api.core.v1.Pod".to_string(),
            vec!["metadata.name".to_string(), "spec.nodeName".to_string()],
        );
        idx.seed_resource_specs(specs);
        idx
    }

    #[test]
    fn kind_to_gvr_is_case_insensitive() {
        let idx = index_with_specs();
        let g = idx.kind_to_gvr("Pod").expect("should resolve via plural/singular match");
        assert_eq!(g.resource, "pods");
    }

    #[test]
    fn schema_name_for_prefers_exact_last_segment() {
        let idx = index_with_specs();
        assert_eq!(idx.schema_name_for("Deployment"), "io.k8s.api.apps.v1.Deployment");
        assert_eq!(idx.schema_name_for("Pod"), "io.k8s.api.core.v1.Pod");
    }

    #[test]
    fn schema_name_for_handles_plural_suffix() {
        let idx = index_with_specs();
        assert_eq!(idx.schema_name_for("Pods"), "io.k8s.api.core.v1.Pod");
    }

    #[test]
    fn schema_name_for_returns_empty_on_miss() {
        let idx = index_with_specs();
        assert_eq!(idx.schema_name_for("Widget"), "");
    }

    #[test]
    fn field_paths_memoizes_after_first_lookup() {
        let idx = index_with_specs();
        let first = idx.field_paths("Deployment").unwrap();
        assert_eq!(first, vec!["metadata.name".to_string(), "spec.replicas".to_string()]);
        // second call must hit the cache, not the provider, and return the same data
        let second = idx.field_paths("Deployment").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn field_paths_fails_for_unindexed_kind() {
        let idx = index_with_specs();
        assert!(idx.field_paths("Widget").is_err());
    }

    #[test]
    fn unavailable_provider_degrades_without_panicking() {
        let idx = SchemaIndex::new(Arc::new(UnavailableSchemaProvider));
        idx.prime();
        assert!(idx.kind_to_gvr("Pod").is_none());
        assert!(idx.field_paths("Pod").is_err());
    }
}
