//! Source keys for keyed admission state.
//!
//! A [`SourceKey`] is the identity under which rate-limiter buckets and
//! circuit-breaker state are tracked. It is derived deterministically from
//! the client address, the HTTP method, and the route template, so equivalent
//! requests always land on the same bucket and distinct (client, route)
//! pairs never share one.

use std::fmt;
use std::sync::Arc;

/// A stable admission key of the form `client:METHOD:route`.
///
/// The boundary between the client and the rest is remembered at
/// construction rather than re-parsed, since client addresses may
/// themselves contain colons (IPv6).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    key: String,
    route_at: usize,
}

impl SourceKey {
    /// Derives a key from its three components.
    pub fn new(client: &str, method: &str, route: &str) -> Self {
        SourceKey {
            key: format!("{client}:{method}:{route}"),
            route_at: client.len() + 1,
        }
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Returns the client component.
    pub fn client(&self) -> &str {
        &self.key[..self.route_at - 1]
    }

    /// Returns the `METHOD:route` component, shared by all clients of a
    /// route.
    ///
    /// Used to key per-route breaker state off the same resolver output.
    pub fn route(&self) -> &str {
        &self.key[self.route_at..]
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Trait for deriving a [`SourceKey`] from a request.
///
/// The resolver must be deterministic: the same request shape always yields
/// the same key.
pub trait KeyResolver<Req>: Send + Sync {
    /// Derives the admission key for the given request.
    fn resolve(&self, req: &Req) -> SourceKey;
}

/// A resolver backed by a closure.
#[derive(Clone)]
pub struct FnResolver<F> {
    f: Arc<F>,
}

impl<F> FnResolver<F> {
    /// Creates a new closure-backed resolver.
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F, Req> KeyResolver<Req> for FnResolver<F>
where
    F: Fn(&Req) -> SourceKey + Send + Sync,
{
    fn resolve(&self, req: &Req) -> SourceKey {
        (self.f)(req)
    }
}

impl<F> fmt::Debug for FnResolver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format_is_client_method_route() {
        let key = SourceKey::new("10.0.0.7", "POST", "/api/login");
        assert_eq!(key.as_str(), "10.0.0.7:POST:/api/login");
    }

    #[test]
    fn equal_components_give_equal_keys() {
        let a = SourceKey::new("10.0.0.7", "GET", "/users/:id");
        let b = SourceKey::new("10.0.0.7", "GET", "/users/:id");
        let c = SourceKey::new("10.0.0.8", "GET", "/users/:id");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn route_strips_the_client() {
        let key = SourceKey::new("10.0.0.7", "GET", "/users/:id");
        assert_eq!(key.client(), "10.0.0.7");
        assert_eq!(key.route(), "GET:/users/:id");
    }

    #[test]
    fn route_survives_colons_in_the_client() {
        let key = SourceKey::new("2001:db8::1", "GET", "/orders");
        assert_eq!(key.client(), "2001:db8::1");
        assert_eq!(key.route(), "GET:/orders");
    }

    #[test]
    fn ipv6_clients_of_one_route_share_its_route_key() {
        let a = SourceKey::new("2001:db8::1", "GET", "/orders");
        let b = SourceKey::new("2001:db8::2", "GET", "/orders");
        assert_ne!(a, b);
        assert_eq!(a.route(), b.route());
    }

    #[test]
    fn fn_resolver_delegates() {
        struct Req {
            client: String,
            path: String,
        }
        let resolver = FnResolver::new(|req: &Req| SourceKey::new(&req.client, "GET", &req.path));
        let key = resolver.resolve(&Req {
            client: "1.2.3.4".into(),
            path: "/health".into(),
        });
        assert_eq!(key.as_str(), "1.2.3.4:GET:/health");
    }
}
