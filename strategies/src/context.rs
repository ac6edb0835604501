use std::fmt;
use std::sync::Arc;

/// Chain RPC access, interface-only.
///
/// Real implementations wrap the deployment's RPC clients; the core only
/// needs to know whether a chain is reachable before dispatching.
pub trait ProviderRegistry: Send + Sync + 'static {
    fn has_chain(&self, chain: &str) -> bool;
}

/// Signing wallet access, interface-only.
pub trait WalletRegistry: Send + Sync + 'static {
    fn has_wallet(&self, chain: &str) -> bool;
}

/// Per-chain transaction nonce allocation, interface-only.
pub trait NonceManager: Send + Sync + 'static {
    fn next_nonce(&self, chain: &str) -> u64;
}

/// Immutable collaborator bundle handed to every strategy invocation.
///
/// The factory caches a single context and reuses it between calls; it is
/// rebuilt only when a dependency changes (standby activation, restart),
/// never per opportunity.
#[derive(Clone)]
pub struct StrategyContext {
    pub providers: Arc<dyn ProviderRegistry>,
    pub wallets: Arc<dyn WalletRegistry>,
    pub nonces: Arc<dyn NonceManager>,
}

impl fmt::Debug for StrategyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyContext").finish_non_exhaustive()
    }
}

impl StrategyContext {
    pub fn new(
        providers: Arc<dyn ProviderRegistry>,
        wallets: Arc<dyn WalletRegistry>,
        nonces: Arc<dyn NonceManager>,
    ) -> Self {
        Self {
            providers,
            wallets,
            nonces,
        }
    }

    /// Context with no live collaborators, for simulation and tests.
    pub fn detached() -> Self {
        let null = Arc::new(NullCollaborators::default());
        Self {
            providers: null.clone(),
            wallets: null.clone(),
            nonces: null,
        }
    }
}

/// No-op collaborator set used by simulation runs and tests.
#[derive(Debug, Default)]
pub struct NullCollaborators {
    nonce: std::sync::atomic::AtomicU64,
}

impl ProviderRegistry for NullCollaborators {
    fn has_chain(&self, _chain: &str) -> bool {
        false
    }
}

impl WalletRegistry for NullCollaborators {
    fn has_wallet(&self, _chain: &str) -> bool {
        false
    }
}

impl NonceManager for NullCollaborators {
    fn next_nonce(&self, _chain: &str) -> u64 {
        self.nonce
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}
