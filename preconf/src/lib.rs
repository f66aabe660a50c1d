pub mod provider;

pub use preconf_auction as auction;
pub use preconf_config as config;
pub use preconf_types as types;
