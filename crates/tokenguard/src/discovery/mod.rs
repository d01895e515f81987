//! OpenID Connect discovery
//!
//! Resolves `{authority}/.well-known/openid-configuration`, the referenced JWK
//! Set, and the introspection endpoint into an [`AuthorityMetadata`] snapshot.

pub mod resolver;
pub mod types;

pub use resolver::{DiscoveryResolver, WELL_KNOWN_PATH, discovery_url};
pub use types::{AuthorityMetadata, DiscoveryDocument, JwksDocument, SigningKey};
