use std::collections::BTreeMap;

/// Known per-request context keys.
///
/// The set is closed: a key that is not listed here cannot be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContextKey {
    CallerId,
    RemoteIp,
    Project,
    RootNamespace,
    User,
    ClientId,
    FeatureCategory,
}

impl ContextKey {
    pub const ALL: [ContextKey; 7] = [
        ContextKey::CallerId,
        ContextKey::RemoteIp,
        ContextKey::Project,
        ContextKey::RootNamespace,
        ContextKey::User,
        ContextKey::ClientId,
        ContextKey::FeatureCategory,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallerId => "caller_id",
            Self::RemoteIp => "remote_ip",
            Self::Project => "project",
            Self::RootNamespace => "root_namespace",
            Self::User => "user",
            Self::ClientId => "client_id",
            Self::FeatureCategory => "feature_category",
        }
    }

    /// Key as written to the structured log, e.g. `meta.caller_id`.
    #[must_use]
    pub fn log_key(self) -> &'static str {
        match self {
            Self::CallerId => "meta.caller_id",
            Self::RemoteIp => "meta.remote_ip",
            Self::Project => "meta.project",
            Self::RootNamespace => "meta.root_namespace",
            Self::User => "meta.user",
            Self::ClientId => "meta.client_id",
            Self::FeatureCategory => "meta.feature_category",
        }
    }

    /// Accepts both the bare and the `meta.`-prefixed spelling.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let bare = name.strip_prefix("meta.").unwrap_or(name);
        Self::ALL.into_iter().find(|key| key.as_str() == bare)
    }
}

/// Per-request context carrying correlation, caller and entity metadata.
///
/// Built fresh for every request and threaded explicitly through the
/// pipeline stages; never stored. Keys are either present with a value or
/// absent: there is no null state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    correlation_id: String,
    route: String,
    meta: BTreeMap<ContextKey, String>,
}

impl RequestContext {
    /// Starts a context for a request from `remote_ip`. The client id
    /// defaults to `ip/<remote_ip>` until a user credential is attached.
    #[must_use]
    pub fn new(
        correlation_id: impl Into<String>,
        remote_ip: impl Into<String>,
        route: impl Into<String>,
    ) -> Self {
        let remote_ip = remote_ip.into();
        let mut meta = BTreeMap::new();
        meta.insert(ContextKey::ClientId, format!("ip/{remote_ip}"));
        meta.insert(ContextKey::RemoteIp, remote_ip);
        Self {
            correlation_id: correlation_id.into(),
            route: route.into(),
            meta,
        }
    }

    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Matched path template, e.g. `/api/:version/projects/:id/issues`.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn set_route(&mut self, route: impl Into<String>) {
        self.route = route.into();
    }

    pub fn set(&mut self, key: ContextKey, value: impl Into<String>) {
        self.meta.insert(key, value.into());
    }

    pub fn remove(&mut self, key: ContextKey) -> Option<String> {
        self.meta.remove(&key)
    }

    #[must_use]
    pub fn get(&self, key: ContextKey) -> Option<&str> {
        self.meta.get(&key).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: ContextKey) -> bool {
        self.meta.contains_key(&key)
    }

    /// Looks up an attribute by its bare or `meta.` name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        ContextKey::parse(name).and_then(|key| self.get(key))
    }

    /// Flattens the context into the stable log keys. Absent keys are omitted.
    #[must_use]
    pub fn log_fields(&self) -> BTreeMap<&'static str, String> {
        let mut fields: BTreeMap<&'static str, String> = self
            .meta
            .iter()
            .map(|(key, value)| (key.log_key(), value.clone()))
            .collect();
        fields.insert("correlation_id", self.correlation_id.clone());
        fields.insert("route", self.route.clone());
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_defaults_client_to_remote_ip() {
        let ctx = RequestContext::new("abc", "10.0.0.1", "/api/:version/*path");
        assert_eq!(ctx.get(ContextKey::ClientId), Some("ip/10.0.0.1"));
        assert_eq!(ctx.get(ContextKey::RemoteIp), Some("10.0.0.1"));
        assert!(!ctx.contains(ContextKey::CallerId));
        assert!(!ctx.contains(ContextKey::User));
    }

    #[test]
    fn log_fields_omit_absent_keys() {
        let mut ctx = RequestContext::new("abc", "10.0.0.1", "/api/:version/broadcast_messages");
        ctx.set(ContextKey::FeatureCategory, "onboarding");

        let fields = ctx.log_fields();
        assert_eq!(fields["correlation_id"], "abc");
        assert_eq!(fields["route"], "/api/:version/broadcast_messages");
        assert_eq!(fields["meta.feature_category"], "onboarding");
        assert!(!fields.contains_key("meta.user"));
        assert!(!fields.contains_key("meta.project"));
        assert_eq!(fields.len(), 5);
    }

    #[test]
    fn attribute_accepts_meta_prefix() {
        let mut ctx = RequestContext::new("abc", "::1", "/");
        ctx.set(ContextKey::FeatureCategory, "secure");
        assert_eq!(ctx.attribute("meta.feature_category"), Some("secure"));
        assert_eq!(ctx.attribute("feature_category"), Some("secure"));
        assert_eq!(ctx.attribute("caller_id"), None);
        assert_eq!(ctx.attribute("no_such_key"), None);
    }

    #[test]
    fn every_key_parses_back() {
        for key in ContextKey::ALL {
            assert_eq!(ContextKey::parse(key.as_str()), Some(key));
            assert_eq!(ContextKey::parse(key.log_key()), Some(key));
        }
    }
}
