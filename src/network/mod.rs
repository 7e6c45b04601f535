//! Local network identity: the settings the phone needs, the fingerprint
//! derived from them, and the on-disk fingerprint → remote id cache.

mod fingerprint;
mod settings;
mod store;

pub use self::fingerprint::{Fingerprint, NetworkMetadata, compute_fingerprint};
pub use self::settings::{
    CHAIN_NAME, LanResolver, NETWORK_NAME, NetworkSettings, build_url, dapp_url, is_local_host,
    network_display_name, routable_host, system_lan_resolver,
};
pub use self::store::{LEGACY_NETWORK_ID_FILE, NETWORK_ID_FILE_PREFIX, NetworkIdStore};
