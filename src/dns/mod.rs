pub mod cache;
pub mod resolver;

pub use cache::{DnsCache, SharedDnsCache};
pub use resolver::{
    apply_family_preference, AddressRecord, DohResolver, Family, FamilyPreference, ResolveError, ResolverBackend,
    SystemResolver, TimeoutSpec,
};
