use std::env;

/// Resolves a signing secret reference at dispatch time.
///
/// Secrets are never persisted; a reference names an entry in an external
/// secret store.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, secret_ref: &str) -> Option<String>;
}

/// Resolves secret references from the process environment. An unset or
/// empty variable counts as unresolved.
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, secret_ref: &str) -> Option<String> {
        env::var(secret_ref).ok().filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
pub struct StaticSecretResolver(pub std::collections::HashMap<String, String>);

#[cfg(test)]
impl SecretResolver for StaticSecretResolver {
    fn resolve(&self, secret_ref: &str) -> Option<String> {
        self.0.get(secret_ref).cloned()
    }
}
