use axum::extract::FromRef;

use crate::augment::DocumentAugmentor;
use crate::catalog::AssetCatalog;
use crate::host::HostResolver;
use crate::waveform::WaveformService;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedWaveformService = Arc<WaveformService>;
pub type GuardedDocumentAugmentor = Arc<DocumentAugmentor>;
pub type GuardedAssetCatalog = Arc<AssetCatalog>;
pub type GuardedHostResolver = Arc<HostResolver>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub hash: String,
    pub waveforms: GuardedWaveformService,
    pub augmentor: GuardedDocumentAugmentor,
    pub asset_catalog: GuardedAssetCatalog,
    pub host_resolver: GuardedHostResolver,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedWaveformService {
    fn from_ref(input: &ServerState) -> Self {
        input.waveforms.clone()
    }
}

impl FromRef<ServerState> for GuardedHostResolver {
    fn from_ref(input: &ServerState) -> Self {
        input.host_resolver.clone()
    }
}
