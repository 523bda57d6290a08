// Network-layer defenses and external lookup interfaces

pub mod ssrf;
pub mod whois;

pub use ssrf::{block_if_private, is_private_ip, SsrfError, SsrfResolver};
pub use whois::{DomainInfo, DomainInfoProvider, WhoisError};
