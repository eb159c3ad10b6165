//! Shared doubles for pipeline integration tests.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use wvault_core::config::{PipelineConfig, SessionConfig};
use wvault_core::{SecurityLevel, VaultResult};
use wvault_keys::{Credential, KeyDerivationClient, KeySessionStore, MemoryPersistence, RawKeyMaterial};
use wvault_pipeline::{DecryptionPipeline, EncryptionPipeline};
use wvault_storage::{OpendalProvider, ProviderSet, StorageProvider};

pub const WALLET: &str = "0x5EC0DE";

/// Endpoint double returning material derived from wallet + credential.
#[derive(Default)]
pub struct StaticEndpoint {
    pub calls: AtomicUsize,
}

#[async_trait]
impl KeyDerivationClient for StaticEndpoint {
    async fn fetch_key_material(
        &self,
        wallet: &str,
        credential: Credential,
    ) -> VaultResult<RawKeyMaterial> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let levels = SecurityLevel::ALL
            .into_iter()
            .map(|level| {
                let mut material = format!("{wallet}:{}", credential.expose_secret()).into_bytes();
                material.resize(32, level.as_u8());
                material.push(level.as_u8());
                (level, material)
            })
            .collect::<BTreeMap<_, _>>();
        RawKeyMaterial::from_levels(levels)
    }
}

/// A session store with keys already derived for [`WALLET`].
pub async fn ready_session() -> KeySessionStore {
    let store = KeySessionStore::new(
        Arc::new(StaticEndpoint::default()),
        Arc::new(MemoryPersistence::new()),
        &SessionConfig::default(),
    );
    store.associate_wallet(WALLET);
    store
        .initialize_keys(Some(Credential::reusable("wallet-signature")))
        .await
        .expect("initialize keys");
    store
}

/// In-memory provider that counts calls and can corrupt or refuse objects.
pub struct MapProvider {
    name: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    pub puts: AtomicUsize,
    pub gets: AtomicUsize,
    refuse: bool,
    put_delay: Option<Duration>,
    get_delay: Option<Duration>,
}

impl MapProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: Mutex::new(HashMap::new()),
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            refuse: false,
            put_delay: None,
            get_delay: None,
        }
    }

    pub fn refusing(name: &str) -> Self {
        Self {
            refuse: true,
            ..Self::new(name)
        }
    }

    pub fn slow(name: &str, delay: Duration) -> Self {
        Self {
            put_delay: Some(delay),
            ..Self::new(name)
        }
    }

    pub fn slow_reads(name: &str, delay: Duration) -> Self {
        Self {
            get_delay: Some(delay),
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst) + self.gets.load(Ordering::SeqCst)
    }

    /// Flip one bit in the stored object.
    pub fn corrupt(&self, locator: &str) {
        let mut objects = self.objects.lock().unwrap();
        let bytes = objects.get_mut(locator).expect("object exists");
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x01;
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl StorageProvider for MapProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, bytes: Vec<u8>) -> anyhow::Result<String> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }
        if self.refuse {
            anyhow::bail!("{}: 503 service unavailable", self.name);
        }
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        let locator = format!("{:016x}", hasher.finish());
        self.objects.lock().unwrap().insert(locator.clone(), bytes);
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> anyhow::Result<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        self.objects
            .lock()
            .unwrap()
            .get(locator)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{}: {locator} not found", self.name))
    }
}

pub fn memory_set(names: &[&str]) -> ProviderSet {
    ProviderSet::new(
        names
            .iter()
            .map(|n| Arc::new(OpendalProvider::memory(*n).expect("memory provider")) as Arc<dyn StorageProvider>)
            .collect(),
    )
}

pub fn set_of(providers: &[Arc<MapProvider>]) -> ProviderSet {
    ProviderSet::new(
        providers
            .iter()
            .map(|p| p.clone() as Arc<dyn StorageProvider>)
            .collect(),
    )
}

/// Upload and download pipelines sharing one session and provider set.
pub fn pipelines(
    sessions: &KeySessionStore,
    content: ProviderSet,
    config: &PipelineConfig,
) -> (EncryptionPipeline, DecryptionPipeline) {
    (
        EncryptionPipeline::new(sessions.clone(), content.clone(), config),
        DecryptionPipeline::new(sessions.clone(), content, config),
    )
}
