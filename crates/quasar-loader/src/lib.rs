//! Hash-verified dynamic loading of provider code, grounded on
//! `wascc_host::capability::native_host::extrude`: a `libloading::Library` is opened
//! and a single, well-known constructor symbol is pulled out of it. Rust has no
//! runtime class discovery, so "exactly one class conforming to the Provider
//! Contract" becomes "exactly one of the two known constructor symbols resolves in
//! the shared object" (see `SPEC_FULL.md` §4.B).

use libloading::{Library, Symbol};
use quasar_core::bar::ProviderType;
use quasar_core::error::SecretsError;
use quasar_core::provider::{HistoricalProvider, LiveProvider, ProviderHandle};
use quasar_core::registration::{ClassSubtype, ProviderRegistration};
use quasar_core::secrets::{DerivedContext, Envelope, MasterSecret};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

const HISTORICAL_SYMBOL: &[u8] = b"__quasar_provider_create_historical";
const LIVE_SYMBOL: &[u8] = b"__quasar_provider_create_live";

// Constructors return an `Arc::into_raw` pointer (not `Box::into_raw`): the loader
// reclaims it with `Arc::from_raw` so the provider's own reference-counted clones
// (held by in-flight collector tasks) stay valid across an unload.
//
// The context argument transfers ownership: the loader heap-allocates it with
// `Box::into_raw` and the constructor must reclaim it with `Box::from_raw` (typically
// immediately, storing the owned `DerivedContext` inside the provider struct). A
// stack-borrowed context would dangle the moment `extrude` returns, since credential
// decryption happens lazily, long after loading.
type HistoricalCtor =
    unsafe extern "C" fn(*mut DerivedContext<'static>) -> *const dyn HistoricalProvider;
type LiveCtor = unsafe extern "C" fn(*mut DerivedContext<'static>) -> *const dyn LiveProvider;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("provider {0:?} is not registered")]
    NotRegistered(String),
    #[error("file path {0:?} does not lie under the allow-listed root {1:?}")]
    PathNotAllowed(String, String),
    #[error("provider file {0:?} not found on disk")]
    FileMissing(String),
    #[error(transparent)]
    Secrets(#[from] SecretsError),
    #[error("{0:?} defines zero conforming provider constructors")]
    NoConformingClass(String),
    #[error("{0:?} defines multiple conforming provider constructors; exactly one is required")]
    MultipleConformingClasses(String),
    #[error("loaded class name {loaded:?} does not match expected {expected:?}")]
    NameMismatch { loaded: String, expected: String },
    #[error(transparent)]
    Dynamic(#[from] libloading::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A cached, loaded provider plus the dynamic library keeping its code mapped.
struct LoadedProvider {
    // Held only to keep the shared object mapped for the instance's lifetime; never
    // read directly. Dropping it after the handle would unmap code still in use.
    _library: Library,
    handle: ProviderHandle,
}

/// Source of registration rows, implemented by `quasar-db` and injected here to avoid
/// a dependency cycle between the loader and the database crate.
#[async_trait::async_trait]
pub trait RegistrationLookup: Send + Sync {
    async fn lookup(&self, class_name: &str) -> Option<ProviderRegistration>;
}

/// Single-writer provider cache: `Load`/`Unload` are the only mutators, serialized by
/// the inner mutex, matching the "single-writer discipline" resource-model requirement.
pub struct ProviderCache {
    allowlist_root: String,
    master: &'static MasterSecret,
    providers: Mutex<HashMap<String, LoadedProvider>>,
}

impl ProviderCache {
    pub fn new(allowlist_root: impl Into<String>, master: &'static MasterSecret) -> Self {
        Self {
            allowlist_root: allowlist_root.into(),
            master,
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// `true` if `class_name` is already loaded (no I/O).
    pub async fn is_loaded(&self, class_name: &str) -> bool {
        self.providers.lock().await.contains_key(class_name)
    }

    pub async fn names_loaded(&self) -> Vec<String> {
        self.providers.lock().await.keys().cloned().collect()
    }

    /// Loads `class_name`, idempotently: a second call while already cached is a no-op
    /// that returns `Ok(())` without touching disk.
    pub async fn load(
        &self,
        class_name: &str,
        registry: &dyn RegistrationLookup,
    ) -> Result<(), LoadError> {
        if self.is_loaded(class_name).await {
            tracing::info!(class_name, "provider already loaded, skipping");
            return Ok(());
        }

        let reg = registry
            .lookup(class_name)
            .await
            .ok_or_else(|| LoadError::NotRegistered(class_name.to_string()))?;

        if !reg.file_path.starts_with(&self.allowlist_root) {
            return Err(LoadError::PathNotAllowed(
                reg.file_path.clone(),
                self.allowlist_root.clone(),
            ));
        }
        if !tokio::fs::try_exists(&reg.file_path).await.unwrap_or(false) {
            return Err(LoadError::FileMissing(reg.file_path.clone()));
        }

        let actual_hash = hash_file(Path::new(&reg.file_path)).await?;
        if actual_hash != reg.file_hash {
            tracing::warn!(
                class_name,
                file_path = %reg.file_path,
                "file hash does not match registered hash"
            );
            return Err(SecretsError::HashMismatch.into());
        }

        let envelope = Envelope {
            nonce: reg.nonce,
            ciphertext: reg.ciphertext.clone(),
        };
        let context = DerivedContext::new(self.master, actual_hash, envelope);

        let (library, handle) = unsafe { extrude(&reg, context)? };

        if handle.name() != class_name {
            return Err(LoadError::NameMismatch {
                loaded: handle.name().to_string(),
                expected: class_name.to_string(),
            });
        }

        tracing::info!(class_name, "provider instance created successfully");
        self.providers.lock().await.insert(
            class_name.to_string(),
            LoadedProvider {
                _library: library,
                handle,
            },
        );
        Ok(())
    }

    /// Disposes of a loaded instance, closing its sockets/sessions, and drops it from
    /// the cache. A no-op if the provider wasn't loaded.
    pub async fn unload(&self, class_name: &str) {
        let removed = self.providers.lock().await.remove(class_name);
        if let Some(loaded) = removed {
            loaded.handle.close().await;
            tracing::info!(class_name, "provider unloaded");
        }
    }

    /// Runs `f` against the loaded handle, if present.
    pub async fn with_handle<R>(
        &self,
        class_name: &str,
        f: impl FnOnce(&ProviderHandle) -> R,
    ) -> Option<R> {
        let guard = self.providers.lock().await;
        guard.get(class_name).map(|p| f(&p.handle))
    }
}

async fn hash_file(path: &Path) -> std::io::Result<[u8; 32]> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; quasar_core::SYMBOL_HASH_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// Opens the shared object and pulls out exactly one of the two known constructor
/// symbols. Two or zero matches is rejected without caching a partial instance.
///
/// # Safety
/// The loaded library must export a symbol of the expected `extern "C"` signature
/// returning a valid, heap-allocated trait object pointer; this is an unenforceable
/// contract with the provider author, identical to the teacher's `extrude`.
unsafe fn extrude(
    reg: &ProviderRegistration,
    context: DerivedContext<'static>,
) -> Result<(Library, ProviderHandle), LoadError> {
    let library = unsafe { Library::new(&reg.file_path)? };

    let historical: Option<Symbol<HistoricalCtor>> =
        unsafe { library.get(HISTORICAL_SYMBOL).ok() };
    let live: Option<Symbol<LiveCtor>> = unsafe { library.get(LIVE_SYMBOL).ok() };

    // Zero or two matches never reaches a constructor call, so the context is freed
    // here rather than handed across the FFI boundary.
    if historical.is_none() && live.is_none() {
        return Err(LoadError::NoConformingClass(reg.class_name.clone()));
    }
    if historical.is_some() && live.is_some() {
        return Err(LoadError::MultipleConformingClasses(reg.class_name.clone()));
    }

    let context_ptr = Box::into_raw(Box::new(context));
    let handle = match (historical, live, reg.class_subtype) {
        (Some(ctor), None, _) => {
            let raw = unsafe { ctor(context_ptr) };
            ProviderHandle::Historical(unsafe { Arc::from_raw(raw) })
        }
        (None, Some(ctor), _) => {
            let raw = unsafe { ctor(context_ptr) };
            ProviderHandle::Live(unsafe { Arc::from_raw(raw) })
        }
        _ => unreachable!("exactly one of historical/live is Some, checked above"),
    };

    debug_assert!(matches!(
        handle.provider_type(),
        ProviderType::Historical | ProviderType::Realtime | ProviderType::Index
    ));

    Ok((library, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quasar_core::registration::{ClassSubtype, ClassType};
    use std::io::Write;

    struct FixedLookup(Option<ProviderRegistration>);

    #[async_trait::async_trait]
    impl RegistrationLookup for FixedLookup {
        async fn lookup(&self, _class_name: &str) -> Option<ProviderRegistration> {
            self.0.clone()
        }
    }

    fn test_master() -> &'static MasterSecret {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.key");
        std::fs::write(&path, b"test-master-secret").unwrap();
        Box::leak(Box::new(MasterSecret::load(path).unwrap()))
    }

    fn registration(file_path: String, file_hash: [u8; 32]) -> ProviderRegistration {
        ProviderRegistration {
            class_name: "acme_historical".to_string(),
            class_type: ClassType::Provider,
            class_subtype: ClassSubtype::Historical,
            file_path,
            file_hash,
            nonce: [0u8; 12],
            ciphertext: Vec::new(),
            preferences: serde_json::json!({}),
            uploaded_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn load_rejects_path_outside_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("acme.so");
        std::fs::write(&outside, b"not a real shared object").unwrap();

        let cache = ProviderCache::new("/allowed/root", test_master());
        let lookup = FixedLookup(Some(registration(
            outside.to_string_lossy().to_string(),
            [0u8; 32],
        )));

        let err = cache.load("acme_historical", &lookup).await.unwrap_err();
        assert!(matches!(err, LoadError::PathNotAllowed(_, _)));
    }

    #[tokio::test]
    async fn load_rejects_file_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let file_path = dir.path().join("acme.so");
        let mut f = std::fs::File::create(&file_path).unwrap();
        f.write_all(b"actual contents on disk").unwrap();

        let cache = ProviderCache::new(root, test_master());
        let lookup = FixedLookup(Some(registration(
            file_path.to_string_lossy().to_string(),
            [0xAB; 32],
        )));

        let err = cache.load("acme_historical", &lookup).await.unwrap_err();
        assert!(matches!(err, LoadError::Secrets(SecretsError::HashMismatch)));
    }

    #[tokio::test]
    async fn load_rejects_unregistered_class_name() {
        let cache = ProviderCache::new("/allowed/root", test_master());
        let lookup = FixedLookup(None);

        let err = cache.load("ghost_provider", &lookup).await.unwrap_err();
        assert!(matches!(err, LoadError::NotRegistered(name) if name == "ghost_provider"));
    }

    #[tokio::test]
    async fn is_loaded_false_for_never_loaded_provider() {
        let cache = ProviderCache::new("/allowed/root", test_master());
        assert!(!cache.is_loaded("acme_historical").await);
        assert!(cache.names_loaded().await.is_empty());
    }
}
